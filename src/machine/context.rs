//! The handle behavior code uses while handling an event.

use super::engine::MachineCore;
use super::{Behavior, StateMachine};
use crate::core::{
    ActorId, ActorType, Event, Handle, Hook, Layer, MessageName, QueueId, QueueSelector,
    Responses, SlotError, SlotStore, StateId, SubstateId, Value, VarScope, Vec2, Vec3,
};
use crate::enforcement::{MachineError, TransitionRequest};
use crate::manager::StructuralChange;
use crate::scheduling::{
    Envelope, Message, ScopeRule, CHANGE_STATE_DELAYED, CHANGE_SUBSTATE_DELAYED,
};
use rand::Rng;

/// Handler-side view of a running [`StateMachine`].
///
/// Everything a handler may do goes through here: transition requests,
/// scoped variables, messaging and structural requests to the manager.
/// Requests that break a contract are logged, handed to the configured
/// [`ViolationPolicy`](crate::enforcement::ViolationPolicy) and returned as
/// errors; the enclosing `reset`/`update`/`process` call also reports the
/// first of them.
pub struct Context<'a> {
    core: &'a mut MachineCore,
    event: Event,
    layer: Layer,
}

impl<'a> Context<'a> {
    pub(crate) fn new(core: &'a mut MachineCore, event: Event, layer: Layer) -> Self {
        Self { core, event, layer }
    }

    fn violation<T>(&mut self, error: MachineError) -> Result<T, MachineError> {
        Err(self.core.report(error))
    }

    // ---- queries ----

    pub fn event(&self) -> Event {
        self.event
    }

    /// The layer the current event is being dispatched to.
    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn state(&self) -> StateId {
        self.core.current_state
    }

    pub fn substate(&self) -> Option<SubstateId> {
        self.core.current_substate
    }

    pub fn actor_id(&self) -> ActorId {
        self.core.env.actor_id()
    }

    pub fn queue(&self) -> QueueId {
        self.core.queue
    }

    pub fn now(&self) -> f32 {
        self.core.env.now()
    }

    pub fn time_in_state(&self) -> f32 {
        self.now() - self.core.time_on_enter_state
    }

    pub fn time_in_substate(&self) -> f32 {
        self.now() - self.core.time_on_enter_substate
    }

    /// Updates received since the last transition.
    pub fn update_iteration(&self) -> u32 {
        self.core.update_iteration
    }

    pub fn state_scope(&self) -> u32 {
        self.core.state_scope
    }

    pub fn substate_scope(&self) -> u32 {
        self.core.substate_scope
    }

    /// Prior states available to [`pop_state`](Self::pop_state).
    pub fn history_depth(&self) -> usize {
        self.core.stack.len()
    }

    pub fn delayed_state_change_queued(&self) -> bool {
        self.core.delayed_state_change_queued
    }

    pub fn delayed_substate_change_queued(&self) -> bool {
        self.core.delayed_substate_change_queued
    }

    /// Declare during [`Event::Probe`] that the current layer handles `hook`.
    /// Outside a probe this does nothing.
    pub fn responds_to(&mut self, hook: Hook) {
        if self.event == Event::Probe {
            self.core.responses |= Responses::for_hook(self.layer, hook);
        }
    }

    /// Random delay in `[min, max)`; `min` when the range is empty.
    pub fn rand_delay(&self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..max)
    }

    // ---- transitions ----

    /// Request a full state change, applied once the current dispatch returns.
    pub fn change_state(&mut self, state: impl Into<StateId>) -> Result<(), MachineError> {
        self.request(TransitionRequest::State(state.into()))
    }

    /// Request a substate change within the current state.
    pub fn change_substate(&mut self, substate: impl Into<SubstateId>) -> Result<(), MachineError> {
        self.request(TransitionRequest::Substate(substate.into()))
    }

    /// Request a return to the most recently left state.
    pub fn pop_state(&mut self) -> Result<(), MachineError> {
        self.request(TransitionRequest::Pop)
    }

    fn request(&mut self, requested: TransitionRequest) -> Result<(), MachineError> {
        if !self.core.transitions_allowed {
            return self.violation(MachineError::TransitionNotAllowed { requested });
        }
        if let Some(pending) = self.core.pending {
            return self.violation(MachineError::TransitionAlreadyPending { pending, requested });
        }
        if requested == TransitionRequest::Pop && self.core.stack.is_empty() {
            return self.violation(MachineError::StateStackUnderflow);
        }
        self.core.pending = Some(requested);
        Ok(())
    }

    /// Change state after `delay` seconds, unless the state changes first.
    pub fn change_state_delayed(
        &mut self,
        delay: f32,
        state: impl Into<StateId>,
    ) -> Result<(), MachineError> {
        let state = state.into();
        if !self.core.transitions_allowed {
            return self.violation(MachineError::TransitionNotAllowed {
                requested: TransitionRequest::State(state),
            });
        }
        self.core.delayed_state_change_queued = true;
        self.send_to_self(
            delay,
            CHANGE_STATE_DELAYED,
            ScopeRule::State,
            self.own_queue(),
            Value::Int(state.0 as i32),
            false,
        );
        Ok(())
    }

    /// Change substate after `delay` seconds, unless the substate changes first.
    pub fn change_substate_delayed(
        &mut self,
        delay: f32,
        substate: impl Into<SubstateId>,
    ) -> Result<(), MachineError> {
        let substate = substate.into();
        if !self.core.transitions_allowed {
            return self.violation(MachineError::TransitionNotAllowed {
                requested: TransitionRequest::Substate(substate),
            });
        }
        self.core.delayed_substate_change_queued = true;
        self.send_to_self(
            delay,
            CHANGE_SUBSTATE_DELAYED,
            ScopeRule::Substate,
            self.own_queue(),
            Value::Int(substate.0 as i32),
            false,
        );
        Ok(())
    }

    // ---- variables ----

    fn store(&self, scope: VarScope) -> &SlotStore {
        match scope {
            VarScope::State => &self.core.state_vars,
            VarScope::Substate => &self.core.substate_vars,
        }
    }

    fn store_mut(&mut self, scope: VarScope) -> &mut SlotStore {
        match scope {
            VarScope::State => &mut self.core.state_vars,
            VarScope::Substate => &mut self.core.substate_vars,
        }
    }

    /// Make slot `id` available in `scope` until that scope is exited.
    pub fn declare(&mut self, scope: VarScope, id: usize) {
        self.store_mut(scope).declare(id);
    }

    pub fn set(
        &mut self,
        scope: VarScope,
        id: usize,
        value: impl Into<Value>,
    ) -> Result<(), MachineError> {
        let result = self.store_mut(scope).set(id, value);
        self.checked(scope, result)
    }

    pub fn get(&mut self, scope: VarScope, id: usize) -> Result<Value, MachineError> {
        let result = self.store(scope).get(id).cloned();
        self.checked(scope, result)
    }

    pub fn get_int(&mut self, scope: VarScope, id: usize) -> Result<i32, MachineError> {
        let result = self.store(scope).get_int(id);
        self.checked(scope, result)
    }

    pub fn get_float(&mut self, scope: VarScope, id: usize) -> Result<f32, MachineError> {
        let result = self.store(scope).get_float(id);
        self.checked(scope, result)
    }

    pub fn get_bool(&mut self, scope: VarScope, id: usize) -> Result<bool, MachineError> {
        let result = self.store(scope).get_bool(id);
        self.checked(scope, result)
    }

    pub fn get_actor(&mut self, scope: VarScope, id: usize) -> Result<Option<ActorId>, MachineError> {
        let result = self.store(scope).get_actor(id);
        self.checked(scope, result)
    }

    pub fn get_handle(&mut self, scope: VarScope, id: usize) -> Result<Option<Handle>, MachineError> {
        let result = self.store(scope).get_handle(id);
        self.checked(scope, result)
    }

    pub fn get_vec2(&mut self, scope: VarScope, id: usize) -> Result<Vec2, MachineError> {
        let result = self.store(scope).get_vec2(id);
        self.checked(scope, result)
    }

    pub fn get_vec3(&mut self, scope: VarScope, id: usize) -> Result<Vec3, MachineError> {
        let result = self.store(scope).get_vec3(id);
        self.checked(scope, result)
    }

    fn checked<T>(&mut self, scope: VarScope, result: Result<T, SlotError>) -> Result<T, MachineError> {
        match result {
            Ok(value) => Ok(value),
            Err(source) => self.violation(MachineError::Variable { scope, source }),
        }
    }

    // ---- messaging ----

    fn own_queue(&self) -> QueueSelector {
        QueueSelector::One(self.core.queue)
    }

    fn one_frame(&self) -> f32 {
        self.core.env.config.one_frame
    }

    fn schedule(&mut self, envelope: Envelope) {
        self.core.env.scheduler.borrow_mut().schedule(envelope);
    }

    /// Schedule a message from this actor to itself, bound to `scope`.
    fn send_to_self(
        &mut self,
        delay: f32,
        name: MessageName,
        scope: ScopeRule,
        queue: QueueSelector,
        payload: Value,
        timer: bool,
    ) {
        let scope_token = match scope {
            ScopeRule::Substate => self.core.substate_scope,
            ScopeRule::State => self.core.state_scope,
            ScopeRule::None | ScopeRule::StateMachine => 0,
        };
        let me = self.actor_id();
        self.schedule(Envelope {
            delay,
            message: Message::new(name, me, me, payload),
            scope,
            scope_token,
            queue,
            timer,
        });
    }

    fn send_to_peer(
        &mut self,
        delay: f32,
        name: MessageName,
        receiver: ActorId,
        payload: Value,
    ) -> Result<(), MachineError> {
        let me = self.actor_id();
        if receiver == me {
            return self.violation(MachineError::MisroutedSelfMessage { name, actor: me });
        }
        self.schedule(Envelope::direct(delay, Message::new(name, me, receiver, payload)));
        Ok(())
    }

    fn check_delay(&mut self, name: MessageName, delay: f32) -> Result<(), MachineError> {
        if delay > 0.0 {
            Ok(())
        } else {
            self.violation(MachineError::InvalidDelay { name, delay })
        }
    }

    /// Send to another actor on the next tick.
    pub fn send(
        &mut self,
        name: MessageName,
        receiver: ActorId,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        let delay = self.one_frame();
        self.send_to_peer(delay, name, receiver, payload.into())
    }

    /// Send to another actor within the current delivery pass.
    pub fn send_now(
        &mut self,
        name: MessageName,
        receiver: ActorId,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.send_to_peer(0.0, name, receiver, payload.into())
    }

    pub fn send_delayed(
        &mut self,
        delay: f32,
        name: MessageName,
        receiver: ActorId,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        self.send_to_peer(delay, name, receiver, payload.into())
    }

    /// Next-tick message to this machine, dropped if the substate changes first.
    pub fn send_to_substate(&mut self, name: MessageName, payload: impl Into<Value>) {
        let delay = self.one_frame();
        let queue = self.own_queue();
        self.send_to_self(delay, name, ScopeRule::Substate, queue, payload.into(), false);
    }

    /// Next-tick message to this machine, dropped if the state changes first.
    pub fn send_to_state(&mut self, name: MessageName, payload: impl Into<Value>) {
        let delay = self.one_frame();
        let queue = self.own_queue();
        self.send_to_self(delay, name, ScopeRule::State, queue, payload.into(), false);
    }

    /// Next-tick message to this machine that survives any transition.
    pub fn send_to_machine(&mut self, name: MessageName, payload: impl Into<Value>) {
        let delay = self.one_frame();
        let queue = self.own_queue();
        self.send_to_self(delay, name, ScopeRule::StateMachine, queue, payload.into(), false);
    }

    pub fn send_to_machine_now(&mut self, name: MessageName, payload: impl Into<Value>) {
        let queue = self.own_queue();
        self.send_to_self(0.0, name, ScopeRule::StateMachine, queue, payload.into(), false);
    }

    pub fn send_delayed_to_substate(
        &mut self,
        delay: f32,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        let queue = self.own_queue();
        self.send_to_self(delay, name, ScopeRule::Substate, queue, payload.into(), false);
        Ok(())
    }

    pub fn send_delayed_to_state(
        &mut self,
        delay: f32,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        let queue = self.own_queue();
        self.send_to_self(delay, name, ScopeRule::State, queue, payload.into(), false);
        Ok(())
    }

    pub fn send_delayed_to_machine(
        &mut self,
        delay: f32,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        let queue = self.own_queue();
        self.send_to_self(delay, name, ScopeRule::StateMachine, queue, payload.into(), false);
        Ok(())
    }

    fn check_queue(&mut self, name: MessageName, queue: QueueId) -> Result<(), MachineError> {
        let count = self.core.env.config.queue_count;
        if queue.0 >= count {
            return self.violation(MachineError::QueueOutOfRange { queue, count });
        }
        if queue == self.core.queue {
            return self.violation(MachineError::MisroutedQueueMessage { name, queue });
        }
        Ok(())
    }

    fn send_to_queue_after(
        &mut self,
        delay: f32,
        queue: QueueId,
        name: MessageName,
        payload: Value,
    ) -> Result<(), MachineError> {
        self.check_queue(name, queue)?;
        self.send_to_self(delay, name, ScopeRule::StateMachine, queue.into(), payload, false);
        Ok(())
    }

    /// Next-tick message to the active machine of another queue of this actor.
    pub fn send_to_queue(
        &mut self,
        queue: QueueId,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        let delay = self.one_frame();
        self.send_to_queue_after(delay, queue, name, payload.into())
    }

    pub fn send_to_queue_now(
        &mut self,
        queue: QueueId,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.send_to_queue_after(0.0, queue, name, payload.into())
    }

    pub fn send_to_queue_delayed(
        &mut self,
        delay: f32,
        queue: QueueId,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        self.send_to_queue_after(delay, queue, name, payload.into())
    }

    /// Next-tick message to the active machine of every queue, this one included.
    pub fn send_to_all_queues(&mut self, name: MessageName, payload: impl Into<Value>) {
        let delay = self.one_frame();
        self.send_to_self(delay, name, ScopeRule::StateMachine, QueueSelector::All, payload.into(), false);
    }

    pub fn send_to_all_queues_now(&mut self, name: MessageName, payload: impl Into<Value>) {
        self.send_to_self(0.0, name, ScopeRule::StateMachine, QueueSelector::All, payload.into(), false);
    }

    pub fn send_to_all_queues_delayed(
        &mut self,
        delay: f32,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        self.send_to_self(delay, name, ScopeRule::StateMachine, QueueSelector::All, payload.into(), false);
        Ok(())
    }

    fn send_to_other_queues_after(&mut self, delay: f32, name: MessageName, payload: Value) {
        let own = self.core.queue;
        for index in 0..self.core.env.config.queue_count {
            let queue = QueueId(index);
            if queue != own {
                self.send_to_self(delay, name, ScopeRule::StateMachine, queue.into(), payload.clone(), false);
            }
        }
    }

    /// Next-tick message to the active machine of every other queue.
    pub fn send_to_other_queues(&mut self, name: MessageName, payload: impl Into<Value>) {
        let delay = self.one_frame();
        self.send_to_other_queues_after(delay, name, payload.into());
    }

    pub fn send_to_other_queues_now(&mut self, name: MessageName, payload: impl Into<Value>) {
        self.send_to_other_queues_after(0.0, name, payload.into());
    }

    pub fn send_to_other_queues_delayed(
        &mut self,
        delay: f32,
        name: MessageName,
        payload: impl Into<Value>,
    ) -> Result<(), MachineError> {
        self.check_delay(name, delay)?;
        self.send_to_other_queues_after(delay, name, payload.into());
        Ok(())
    }

    // ---- broadcast ----

    fn broadcast_after(&mut self, delay: f32, name: MessageName, filter: ActorType, payload: Value) {
        let me = self.actor_id();
        let envelope = Envelope::direct(delay, Message::new(name, me, me, payload));
        self.core
            .env
            .scheduler
            .borrow_mut()
            .broadcast_by_type(envelope, filter);
    }

    /// Next-tick message to every other actor of type `filter`.
    pub fn broadcast(&mut self, name: MessageName, filter: ActorType, payload: impl Into<Value>) {
        let delay = self.one_frame();
        self.broadcast_after(delay, name, filter, payload.into());
    }

    pub fn broadcast_now(&mut self, name: MessageName, filter: ActorType, payload: impl Into<Value>) {
        self.broadcast_after(0.0, name, filter, payload.into());
    }

    pub fn broadcast_list(&self) -> &[ActorId] {
        &self.core.broadcast_list
    }

    pub fn broadcast_list_add(&mut self, actor: ActorId) {
        if !self.core.broadcast_list.contains(&actor) {
            self.core.broadcast_list.push(actor);
        }
    }

    pub fn broadcast_list_clear(&mut self) {
        self.core.broadcast_list.clear();
    }

    fn broadcast_to_list_after(
        &mut self,
        delay: f32,
        name: MessageName,
        payload: Value,
    ) -> Result<(), MachineError> {
        if self.core.broadcast_list.is_empty() {
            return self.violation(MachineError::EmptyBroadcastList);
        }
        let me = self.actor_id();
        let receivers: Vec<ActorId> = self
            .core
            .broadcast_list
            .iter()
            .copied()
            .filter(|actor| *actor != me)
            .collect();
        for receiver in receivers {
            self.schedule(Envelope::direct(
                delay,
                Message::new(name, me, receiver, payload.clone()),
            ));
        }
        Ok(())
    }

    /// Next-tick message to every actor on the broadcast list except this one.
    pub fn broadcast_to_list(&mut self, name: MessageName, payload: impl Into<Value>) -> Result<(), MachineError> {
        let delay = self.one_frame();
        self.broadcast_to_list_after(delay, name, payload.into())
    }

    pub fn broadcast_to_list_now(&mut self, name: MessageName, payload: impl Into<Value>) -> Result<(), MachineError> {
        self.broadcast_to_list_after(0.0, name, payload.into())
    }

    // ---- timers ----

    /// Periodic message to this machine bound to a caller-chosen `scope`.
    ///
    /// The delay is clamped to at least one frame.
    pub fn set_timer(
        &mut self,
        scope: ScopeRule,
        name: MessageName,
        delay: f32,
        payload: impl Into<Value>,
    ) {
        let delay = delay.max(self.one_frame());
        let queue = self.own_queue();
        self.send_to_self(delay, name, scope, queue, payload.into(), true);
    }

    /// Periodic message that stops once the substate changes.
    pub fn set_timer_substate(&mut self, name: MessageName, delay: f32, payload: impl Into<Value>) {
        self.set_timer(ScopeRule::Substate, name, delay, payload.into());
    }

    /// Periodic message that stops once the state changes.
    pub fn set_timer_state(&mut self, name: MessageName, delay: f32, payload: impl Into<Value>) {
        self.set_timer(ScopeRule::State, name, delay, payload.into());
    }

    /// Periodic message that runs until stopped.
    pub fn set_timer_machine(&mut self, name: MessageName, delay: f32, payload: impl Into<Value>) {
        self.set_timer(ScopeRule::StateMachine, name, delay, payload.into());
    }

    pub fn stop_timer(&mut self, name: MessageName) {
        let me = self.actor_id();
        self.core.env.scheduler.borrow_mut().stop_timer(name, me);
    }

    /// Forward a copy of every message this machine receives to `watcher`.
    pub fn set_cc_receiver(&mut self, watcher: Option<ActorId>) {
        self.core.cc_receiver = watcher;
    }

    // ---- structural requests ----

    fn request_change(&mut self, change: StructuralChange) -> Result<(), MachineError> {
        let Some(link) = self.core.link.clone() else {
            return self.violation(MachineError::NotAttached);
        };
        let result = link.board.borrow_mut().request(link.queue, change);
        match result {
            Ok(()) => Ok(()),
            Err(error) => self.violation(error),
        }
    }

    fn spawn(&self, behavior: Box<dyn Behavior>) -> StateMachine {
        StateMachine::new(behavior, self.core.env.clone())
    }

    /// Reset this machine before the next update.
    pub fn reset_machine(&mut self) -> Result<(), MachineError> {
        self.request_change(StructuralChange::Reset)
    }

    /// Replace this machine with `behavior` before the next update.
    pub fn replace_machine(&mut self, behavior: Box<dyn Behavior>) -> Result<(), MachineError> {
        let machine = self.spawn(behavior);
        self.request_change(StructuralChange::Replace(machine))
    }

    /// Queue `behavior` to run after this machine is removed.
    pub fn queue_machine(&mut self, behavior: Box<dyn Behavior>) -> Result<(), MachineError> {
        let machine = self.spawn(behavior);
        self.request_change(StructuralChange::Queue(machine))
    }

    /// Move this machine below the next queued one.
    pub fn requeue_machine(&mut self) -> Result<(), MachineError> {
        self.request_change(StructuralChange::Requeue)
    }

    /// Run `behavior` on top of this machine.
    pub fn push_machine(&mut self, behavior: Box<dyn Behavior>) -> Result<(), MachineError> {
        let machine = self.spawn(behavior);
        self.request_change(StructuralChange::Push(machine))
    }

    /// Remove this machine and resume the one below it.
    pub fn pop_machine(&mut self) -> Result<(), MachineError> {
        let len = self.machines_in_queue();
        if self.core.link.is_some() && len <= 1 {
            let queue = self.core.queue;
            return self.violation(MachineError::CannotPopLastMachine { queue, len });
        }
        self.request_change(StructuralChange::Pop)
    }

    /// Tear down every machine in the selected queues before the next update.
    pub fn delete_queue(&mut self, queues: QueueSelector) -> Result<(), MachineError> {
        let Some(link) = self.core.link.clone() else {
            return self.violation(MachineError::NotAttached);
        };
        link.board.borrow_mut().request_deletion(queues);
        Ok(())
    }

    /// Machines in this machine's queue, itself included.
    pub fn machines_in_queue(&self) -> usize {
        match &self.core.link {
            Some(link) => link.board.borrow().depth(link.queue),
            None => 0,
        }
    }
}
