//! Per-actor stacks of state machines.

use super::change::{ChangeBoard, ChangeKind, ManagerLink, StructuralChange};
use crate::core::{ActorId, Event, QueueId, QueueSelector};
use crate::enforcement::MachineError;
use crate::env::{Actor, MachineEnv};
use crate::machine::{Behavior, StateMachine};
use crate::scheduling::{Delivery, Envelope, Message};
use std::cell::RefCell;
use std::rc::Rc;

/// Owns every state machine of one actor, one stack per queue.
///
/// The top of each stack is the active machine; machines below it wait their
/// turn. Structural changes are requested with the `request_*` methods (or
/// from handlers through [`Context`](crate::machine::Context)) and applied at
/// the start of the next [`update`](Self::update).
pub struct StateMachineManager {
    env: MachineEnv,
    queues: Vec<Vec<StateMachine>>,
    board: Rc<RefCell<ChangeBoard>>,
}

impl StateMachineManager {
    pub fn new(env: MachineEnv) -> Self {
        let count = env.config.queue_count;
        Self {
            queues: (0..count).map(|_| Vec::new()).collect(),
            board: Rc::new(RefCell::new(ChangeBoard::new(count))),
            env,
        }
    }

    pub fn env(&self) -> &MachineEnv {
        &self.env
    }

    pub fn actor(&self) -> &dyn Actor {
        self.env.actor.as_ref()
    }

    pub fn actor_id(&self) -> ActorId {
        self.env.actor_id()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Machines in `queue`, zero for queues that do not exist.
    pub fn len(&self, queue: QueueId) -> usize {
        self.machines(queue).len()
    }

    pub fn is_empty(&self, queue: QueueId) -> bool {
        self.len(queue) == 0
    }

    /// Machines in `queue`, bottom first.
    pub fn machines(&self, queue: QueueId) -> &[StateMachine] {
        self.queues.get(queue.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn active(&self, queue: QueueId) -> Option<&StateMachine> {
        self.queues.get(queue.0).and_then(|stack| stack.last())
    }

    pub fn active_mut(&mut self, queue: QueueId) -> Option<&mut StateMachine> {
        self.queues.get_mut(queue.0).and_then(|stack| stack.last_mut())
    }

    pub fn pending_change(&self, queue: QueueId) -> Option<ChangeKind> {
        self.board.borrow().pending_kind(queue)
    }

    /// A detached machine sharing this manager's collaborators.
    pub fn spawn(&self, behavior: Box<dyn Behavior>) -> StateMachine {
        StateMachine::new(behavior, self.env.clone())
    }

    // ---- deferred requests ----

    pub fn request_reset(&mut self, queue: QueueId) -> Result<(), MachineError> {
        self.request(queue, StructuralChange::Reset)
    }

    pub fn request_replace(
        &mut self,
        queue: QueueId,
        behavior: Box<dyn Behavior>,
    ) -> Result<(), MachineError> {
        let machine = self.spawn(behavior);
        self.request(queue, StructuralChange::Replace(machine))
    }

    pub fn request_queue(
        &mut self,
        queue: QueueId,
        behavior: Box<dyn Behavior>,
    ) -> Result<(), MachineError> {
        let machine = self.spawn(behavior);
        self.request(queue, StructuralChange::Queue(machine))
    }

    pub fn request_requeue(&mut self, queue: QueueId) -> Result<(), MachineError> {
        self.request(queue, StructuralChange::Requeue)
    }

    pub fn request_push(
        &mut self,
        queue: QueueId,
        behavior: Box<dyn Behavior>,
    ) -> Result<(), MachineError> {
        let machine = self.spawn(behavior);
        self.request(queue, StructuralChange::Push(machine))
    }

    pub fn request_pop(&mut self, queue: QueueId) -> Result<(), MachineError> {
        self.check_queue(queue)?;
        let len = self.len(queue);
        if len <= 1 {
            return Err(self.report(MachineError::CannotPopLastMachine { queue, len }));
        }
        self.request(queue, StructuralChange::Pop)
    }

    fn request(&mut self, queue: QueueId, change: StructuralChange) -> Result<(), MachineError> {
        self.check_queue(queue)?;
        let result = self.board.borrow_mut().request(queue, change);
        result.map_err(|error| self.report(error))
    }

    // ---- driving ----

    /// Apply pending deletions and structural changes, then update the active
    /// machine of every queue.
    ///
    /// Every queue is visited even if an earlier one reported a violation;
    /// the first violation is returned.
    pub fn update(&mut self) -> Result<(), MachineError> {
        let mut first = None;

        let deletions = self.board.borrow_mut().take_deletions();
        for queues in deletions {
            if let Err(error) = self.delete_queue(queues) {
                first.get_or_insert(error);
            }
        }

        for index in 0..self.queues.len() {
            let queue = QueueId(index);
            if let Err(error) = self.resolve_changes(queue) {
                first.get_or_insert(error);
            }
            if let Some(machine) = self.queues[index].last_mut() {
                if let Err(error) = machine.update() {
                    first.get_or_insert(error);
                }
            }
        }

        first.map_or(Ok(()), Err)
    }

    /// Hand `event` to the active machine of each selected queue. Returns
    /// whether any of them handled it.
    pub fn process(
        &mut self,
        event: Event,
        msg: Option<&Message>,
        queues: QueueSelector,
    ) -> Result<bool, MachineError> {
        self.check_selector(queues)?;
        let mut handled = false;
        let mut first = None;

        for (index, stack) in self.queues.iter_mut().enumerate() {
            if !queues.includes(QueueId(index)) {
                continue;
            }
            if let Some(machine) = stack.last_mut() {
                match machine.process(event, msg) {
                    Ok(h) => handled |= h,
                    Err(error) => {
                        first.get_or_insert(error);
                    }
                }
            }
        }

        first.map_or(Ok(handled), Err)
    }

    /// Deliver `msg` to the active machine of every queue.
    pub fn send_msg(&mut self, msg: &Message) -> Result<bool, MachineError> {
        self.process(Event::Message, Some(msg), QueueSelector::All)
    }

    /// Deliver a scheduled envelope, dropping it where its scope has expired.
    ///
    /// Whether the envelope reached a machine is reported apart from any
    /// violation its handler raised, so a handler error does not turn a
    /// delivery into a drop.
    pub fn deliver(&mut self, envelope: &Envelope) -> (Delivery, Option<MachineError>) {
        if let Err(error) = self.check_selector(envelope.queue) {
            return (Delivery::Dropped, Some(error));
        }
        let mut delivered = false;
        let mut first = None;

        for (index, stack) in self.queues.iter_mut().enumerate() {
            let queue = QueueId(index);
            if !envelope.queue.includes(queue) {
                continue;
            }
            let Some(machine) = stack.last_mut() else {
                continue;
            };
            if !machine.accepts(envelope.scope, envelope.scope_token) {
                tracing::trace!(
                    actor = %self.env.actor_id(),
                    %queue,
                    message = %envelope.message.name,
                    scope = ?envelope.scope,
                    token = envelope.scope_token,
                    "dropped stale message"
                );
                continue;
            }
            delivered = true;
            if let Err(error) = machine.process(Event::Message, Some(&envelope.message)) {
                first.get_or_insert(error);
            }
        }

        let delivery = if delivered {
            Delivery::Delivered
        } else {
            Delivery::Dropped
        };
        (delivery, first)
    }

    /// Tear down every machine in the selected queues without exit events,
    /// discarding their pending structural changes.
    pub fn delete_queue(&mut self, queues: QueueSelector) -> Result<(), MachineError> {
        self.check_selector(queues)?;
        for index in 0..self.queues.len() {
            let queue = QueueId(index);
            if !queues.includes(queue) {
                continue;
            }
            self.purge(queue);
            let removed = self.queues[index].len();
            self.queues[index].clear();
            {
                let mut board = self.board.borrow_mut();
                board.take(queue);
                board.set_depth(queue, 0);
            }
            tracing::info!(
                actor = %self.env.actor_id(),
                %queue,
                removed,
                "deleted queue"
            );
        }
        Ok(())
    }

    // ---- resolution ----

    fn resolve_changes(&mut self, queue: QueueId) -> Result<(), MachineError> {
        let limit = self.env.config.max_change_iterations;
        let mut first = None;

        for _ in 0..limit {
            let change = self.board.borrow_mut().take(queue);
            let Some(change) = change else {
                return first.map_or(Ok(()), Err);
            };
            if let Err(error) = self.apply(queue, change) {
                first.get_or_insert(error);
            }
        }

        if self.board.borrow().pending_kind(queue).is_some() {
            self.board.borrow_mut().take(queue);
            let error = self.report(MachineError::StructuralChangeOscillation { queue, limit });
            first.get_or_insert(error);
        }
        first.map_or(Ok(()), Err)
    }

    fn apply(&mut self, queue: QueueId, change: StructuralChange) -> Result<(), MachineError> {
        let kind = change.kind();
        let len = self.len(queue);
        tracing::info!(
            actor = %self.env.actor_id(),
            %queue,
            change = %kind,
            depth = len,
            "applying structural change"
        );

        match change {
            StructuralChange::Reset => {
                if len == 0 {
                    return Err(self.report(MachineError::EmptyQueue { queue }));
                }
                self.purge(queue);
                self.reset_active(queue)
            }
            StructuralChange::Replace(machine) => {
                self.purge(queue);
                self.queues[queue.0].pop();
                let at = self.len(queue);
                self.install(queue, machine, at);
                self.reset_active(queue)
            }
            StructuralChange::Queue(machine) => {
                if len <= 1 {
                    self.purge(queue);
                    self.install(queue, machine, len);
                    self.reset_active(queue)
                } else {
                    // Waits below the active machine, unreset, until it surfaces.
                    self.install(queue, machine, len - 1);
                    Ok(())
                }
            }
            StructuralChange::Requeue => {
                if len == 0 {
                    return Err(self.report(MachineError::EmptyQueue { queue }));
                }
                self.purge(queue);
                let stack = &mut self.queues[queue.0];
                if let Some(top) = stack.pop() {
                    // Same placement as a queued machine: the bottom stays put.
                    let remaining = stack.len();
                    let at = if remaining <= 1 { remaining } else { remaining - 1 };
                    stack.insert(at, top);
                }
                self.reset_active(queue)
            }
            StructuralChange::Push(machine) => {
                self.purge(queue);
                self.install(queue, machine, len);
                self.reset_active(queue)
            }
            StructuralChange::Pop => {
                if len <= 1 {
                    return Err(self.report(MachineError::CannotPopLastMachine { queue, len }));
                }
                self.purge(queue);
                self.queues[queue.0].pop();
                self.sync_depth(queue);
                self.reset_active(queue)
            }
        }
    }

    fn install(&mut self, queue: QueueId, mut machine: StateMachine, at: usize) {
        machine.attach(ManagerLink {
            queue,
            board: Rc::clone(&self.board),
        });
        self.queues[queue.0].insert(at, machine);
        self.sync_depth(queue);
    }

    fn reset_active(&mut self, queue: QueueId) -> Result<(), MachineError> {
        match self.queues[queue.0].last_mut() {
            Some(machine) => machine.reset(),
            None => Ok(()),
        }
    }

    fn sync_depth(&self, queue: QueueId) {
        let depth = self.queues[queue.0].len();
        self.board.borrow_mut().set_depth(queue, depth);
    }

    fn purge(&self, queue: QueueId) {
        self.env
            .scheduler
            .borrow_mut()
            .purge_scoped(self.env.actor_id(), queue);
    }

    fn report(&self, error: MachineError) -> MachineError {
        self.env.config.violation_policy.enforce(error)
    }

    fn check_queue(&self, queue: QueueId) -> Result<(), MachineError> {
        let count = self.queues.len();
        if queue.0 < count {
            Ok(())
        } else {
            Err(self.report(MachineError::QueueOutOfRange { queue, count }))
        }
    }

    fn check_selector(&self, queues: QueueSelector) -> Result<(), MachineError> {
        match queues {
            QueueSelector::One(queue) => self.check_queue(queue),
            QueueSelector::All => Ok(()),
        }
    }
}

impl std::fmt::Debug for StateMachineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineManager")
            .field("actor", &self.env.actor_id())
            .field("queues", &self.queues)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::{Hook, Layer, MessageName, StateId, Value};
    use crate::enforcement::ViolationPolicy;
    use crate::env::{ActorRecord, ManualClock};
    use crate::machine::Context;
    use crate::scheduling::{MessageRouter, MessageScheduler, ScopeRule};

    type Log = Rc<RefCell<Vec<String>>>;

    const Q0: QueueId = QueueId(0);
    const PUSH: MessageName = MessageName("push");
    const POP: MessageName = MessageName("pop");
    const NUDGE: MessageName = MessageName("nudge");

    /// Logs its lifecycle; pushes or pops itself on request.
    struct Named {
        name: &'static str,
        log: Log,
        restless: bool,
    }

    impl Named {
        fn boxed(name: &'static str, log: &Log) -> Box<dyn Behavior> {
            Box::new(Named {
                name,
                log: log.clone(),
                restless: false,
            })
        }
    }

    impl Behavior for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn dispatch(
            &mut self,
            ctx: &mut Context<'_>,
            event: Event,
            msg: Option<&Message>,
            layer: Layer,
        ) -> bool {
            if !matches!(layer, Layer::State(_)) {
                return false;
            }
            match event {
                Event::Probe => {
                    ctx.responds_to(Hook::Enter);
                    ctx.responds_to(Hook::Update);
                }
                Event::Enter => {
                    self.log.borrow_mut().push(format!("{}:enter", self.name));
                    if self.restless {
                        let _ = ctx.reset_machine();
                    }
                }
                Event::Update => self.log.borrow_mut().push(format!("{}:update", self.name)),
                Event::Message => {
                    let name = msg.map(|m| m.name);
                    self.log.borrow_mut().push(format!("{}:msg", self.name));
                    if name == Some(PUSH) {
                        let _ = ctx.push_machine(Named::boxed("pushed", &self.log));
                    } else if name == Some(POP) {
                        let _ = ctx.pop_machine();
                    }
                }
                Event::Exit => {}
            }
            true
        }
    }

    fn manager() -> (StateMachineManager, Rc<RefCell<MessageRouter>>, Log) {
        let clock = Rc::new(ManualClock::new());
        let config = EngineConfig {
            violation_policy: ViolationPolicy::Report,
            ..EngineConfig::default()
        };
        let router = Rc::new(RefCell::new(MessageRouter::new(clock.clone(), &config)));
        let env = MachineEnv::new(
            Rc::new(ActorRecord::new(ActorId(1))),
            router.clone(),
            clock,
            config,
        );
        (
            StateMachineManager::new(env),
            router,
            Rc::new(RefCell::new(Vec::new())),
        )
    }

    fn names(manager: &StateMachineManager) -> Vec<&str> {
        manager.machines(Q0).iter().map(StateMachine::name).collect()
    }

    fn msg(name: MessageName) -> Message {
        Message::new(name, ActorId(2), ActorId(1), Value::Unset)
    }

    #[test]
    fn push_resolves_on_update_then_updates() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("base", &log)).unwrap();
        assert_eq!(manager.pending_change(Q0), Some(ChangeKind::Push));
        assert!(manager.is_empty(Q0));

        manager.update().unwrap();

        assert_eq!(names(&manager), vec!["base"]);
        assert_eq!(*log.borrow(), vec!["base:enter", "base:update"]);
        assert!(manager.active(Q0).is_some_and(StateMachine::is_attached));
    }

    #[test]
    fn second_request_before_resolution_is_rejected() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        assert_eq!(
            manager.request_push(Q0, Named::boxed("b", &log)),
            Err(MachineError::DuplicateStructuralRequest { queue: Q0 })
        );
    }

    #[test]
    fn pop_of_last_machine_is_rejected() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("base", &log)).unwrap();
        manager.update().unwrap();

        assert_eq!(
            manager.request_pop(Q0),
            Err(MachineError::CannotPopLastMachine { queue: Q0, len: 1 })
        );
        assert_eq!(names(&manager), vec!["base"]);
    }

    #[test]
    fn handler_push_and_pop_are_deferred() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("base", &log)).unwrap();
        manager.update().unwrap();
        log.borrow_mut().clear();

        manager.send_msg(&msg(PUSH)).unwrap();
        assert_eq!(names(&manager), vec!["base"]);
        manager.update().unwrap();
        assert_eq!(names(&manager), vec!["base", "pushed"]);

        manager.send_msg(&msg(POP)).unwrap();
        manager.update().unwrap();
        assert_eq!(names(&manager), vec!["base"]);
        assert_eq!(
            *log.borrow(),
            vec![
                "base:msg",
                "pushed:enter",
                "pushed:update",
                "pushed:msg",
                "base:enter",
                "base:update",
            ]
        );
    }

    #[test]
    fn queue_waits_below_the_active_machine() {
        let (mut manager, _router, log) = manager();
        manager.request_queue(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();
        manager.request_push(Q0, Named::boxed("b", &log)).unwrap();
        manager.update().unwrap();
        log.borrow_mut().clear();

        manager.request_queue(Q0, Named::boxed("c", &log)).unwrap();
        manager.update().unwrap();

        assert_eq!(names(&manager), vec!["a", "c", "b"]);
        assert_eq!(*log.borrow(), vec!["b:update"]);
    }

    #[test]
    fn queue_on_single_entry_activates_immediately() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();
        manager.request_queue(Q0, Named::boxed("b", &log)).unwrap();
        manager.update().unwrap();

        assert_eq!(names(&manager), vec!["a", "b"]);
        assert!(log.borrow().contains(&"b:enter".to_string()));
    }

    #[test]
    fn requeue_single_entry_only_resets() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();
        log.borrow_mut().clear();

        manager.request_requeue(Q0).unwrap();
        manager.update().unwrap();

        assert_eq!(names(&manager), vec!["a"]);
        assert_eq!(*log.borrow(), vec!["a:enter", "a:update"]);
    }

    #[test]
    fn requeue_moves_top_below_the_next() {
        let (mut manager, _router, log) = manager();
        for name in ["a", "b", "c"] {
            manager.request_push(Q0, Named::boxed(name, &log)).unwrap();
            manager.update().unwrap();
        }
        log.borrow_mut().clear();

        manager.request_requeue(Q0).unwrap();
        manager.update().unwrap();

        assert_eq!(names(&manager), vec!["a", "c", "b"]);
        assert_eq!(*log.borrow(), vec!["b:enter", "b:update"]);
    }

    #[test]
    fn requeue_keeps_the_default_at_the_bottom() {
        let (mut manager, _router, log) = manager();
        for name in ["default", "b"] {
            manager.request_push(Q0, Named::boxed(name, &log)).unwrap();
            manager.update().unwrap();
        }
        log.borrow_mut().clear();

        manager.request_requeue(Q0).unwrap();
        manager.update().unwrap();

        assert_eq!(names(&manager), vec!["default", "b"]);
        assert_eq!(*log.borrow(), vec!["b:enter", "b:update"]);
    }

    #[test]
    fn replace_swaps_the_active_machine() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();
        manager.request_replace(Q0, Named::boxed("b", &log)).unwrap();
        manager.update().unwrap();
        assert_eq!(names(&manager), vec!["b"]);
    }

    #[test]
    fn reset_of_empty_queue_is_reported() {
        let (mut manager, _router, _log) = manager();
        manager.request_reset(Q0).unwrap();
        assert_eq!(
            manager.update(),
            Err(MachineError::EmptyQueue { queue: Q0 })
        );
    }

    #[test]
    fn structural_changes_must_settle() {
        let (mut manager, _router, log) = manager();
        let limit = manager.env().config.max_change_iterations;
        manager
            .request_push(
                Q0,
                Box::new(Named {
                    name: "restless",
                    log: log.clone(),
                    restless: true,
                }),
            )
            .unwrap();

        assert_eq!(
            manager.update(),
            Err(MachineError::StructuralChangeOscillation { queue: Q0, limit })
        );
        assert_eq!(manager.pending_change(Q0), None);
    }

    #[test]
    fn stale_scoped_envelopes_are_dropped() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();

        let me = ActorId(1);
        let mut envelope = Envelope::direct(0.0, Message::new(NUDGE, me, me, Value::Unset));
        envelope.scope = ScopeRule::State;
        envelope.queue = QueueSelector::One(Q0);
        envelope.scope_token = 5;
        assert_eq!(manager.deliver(&envelope), (Delivery::Dropped, None));

        envelope.scope_token = 0;
        assert_eq!(manager.deliver(&envelope), (Delivery::Delivered, None));
        assert_eq!(manager.deliver(&Envelope {
            queue: QueueSelector::One(QueueId(1)),
            ..envelope.clone()
        }), (Delivery::Dropped, None));
    }

    #[test]
    fn delete_queue_tears_down_and_purges() {
        let (mut manager, router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();
        let me = ActorId(1);
        let mut envelope = Envelope::direct(1.0, Message::new(NUDGE, me, me, Value::Unset));
        envelope.scope = ScopeRule::Substate;
        envelope.queue = QueueSelector::One(Q0);
        router.borrow_mut().schedule(envelope);

        manager.delete_queue(QueueSelector::All).unwrap();

        assert!(manager.is_empty(Q0));
        assert!(router.borrow().is_empty());
        assert_eq!(
            manager.delete_queue(QueueSelector::One(QueueId(9))),
            Err(MachineError::QueueOutOfRange {
                queue: QueueId(9),
                count: 2
            })
        );
    }

    #[test]
    fn initial_state_is_entered_on_reset() {
        let (mut manager, _router, log) = manager();
        manager.request_push(Q0, Named::boxed("a", &log)).unwrap();
        manager.update().unwrap();
        assert_eq!(manager.active(Q0).map(StateMachine::state), Some(StateId(0)));
    }
}
