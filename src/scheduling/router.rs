//! In-memory message router.

use super::{Delivery, Envelope, MessageScheduler};
use crate::config::EngineConfig;
use crate::core::{ActorId, ActorType, MessageName, QueueId};
use crate::enforcement::MachineError;
use crate::env::Clock;
use crate::manager::StateMachineManager;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug)]
struct Scheduled {
    due_at: f32,
    seq: u64,
    /// Broadcast filter; `None` for a single receiver.
    fanout: Option<ActorType>,
    envelope: Envelope,
}

/// Holds scheduled envelopes until they are due.
///
/// Envelopes due at the same instant are delivered in scheduling order.
pub struct MessageRouter {
    clock: Rc<dyn Clock>,
    max_rounds: usize,
    pending: Vec<Scheduled>,
    next_seq: u64,
    /// Timers stopped while a timer delivery was in flight.
    stopped: Vec<(MessageName, ActorId)>,
}

impl MessageRouter {
    pub fn new(clock: Rc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            clock,
            max_rounds: config.max_delivery_rounds,
            pending: Vec::new(),
            next_seq: 0,
            stopped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Envelopes not yet delivered, in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = &Envelope> {
        self.pending.iter().map(|s| &s.envelope)
    }

    /// Whether `actor` has an armed timer named `name`.
    pub fn has_timer(&self, name: MessageName, actor: ActorId) -> bool {
        self.pending.iter().any(|s| {
            s.envelope.timer && s.envelope.message.name == name && s.envelope.message.receiver == actor
        })
    }

    fn push(&mut self, envelope: Envelope, fanout: Option<ActorType>) {
        let due_at = self.clock.now() + envelope.delay.max(0.0);
        self.pending.push(Scheduled {
            due_at,
            seq: self.next_seq,
            fanout,
            envelope,
        });
        self.next_seq += 1;
    }

    fn take_due(&mut self) -> Vec<Scheduled> {
        let now = self.clock.now();
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|s| s.due_at <= now);
        self.pending = rest;
        due.sort_by(|a, b| a.due_at.total_cmp(&b.due_at).then(a.seq.cmp(&b.seq)));
        due
    }

    /// Re-arm a delivered timer unless its handler stopped it.
    fn rearm(&mut self, envelope: Envelope) {
        let key = (envelope.message.name, envelope.message.receiver);
        if !self.stopped.contains(&key) {
            self.push(envelope, None);
        }
    }
}

impl MessageScheduler for MessageRouter {
    fn schedule(&mut self, envelope: Envelope) {
        self.push(envelope, None);
    }

    fn purge_scoped(&mut self, receiver: ActorId, queue: QueueId) {
        let before = self.pending.len();
        self.pending.retain(|s| {
            let e = &s.envelope;
            !(e.scope.is_scoped() && e.message.receiver == receiver && e.queue.includes(queue))
        });
        tracing::trace!(
            %receiver,
            %queue,
            purged = before - self.pending.len(),
            "purged scoped messages"
        );
    }

    fn stop_timer(&mut self, name: MessageName, actor: ActorId) {
        self.stopped.push((name, actor));
        self.pending.retain(|s| {
            let e = &s.envelope;
            !(e.timer && e.message.name == name && e.message.receiver == actor)
        });
    }

    fn broadcast_by_type(&mut self, envelope: Envelope, filter: ActorType) {
        self.push(envelope, Some(filter));
    }
}

/// Lookup of actor managers by id, provided by the driver's actor registry.
pub trait ActorDirectory {
    fn manager_mut(&mut self, id: ActorId) -> Option<&mut StateMachineManager>;

    fn actors_of_type(&self, filter: ActorType) -> Vec<ActorId>;
}

impl ActorDirectory for HashMap<ActorId, StateMachineManager> {
    fn manager_mut(&mut self, id: ActorId) -> Option<&mut StateMachineManager> {
        self.get_mut(&id)
    }

    fn actors_of_type(&self, filter: ActorType) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self
            .values()
            .filter(|m| m.actor().actor_type() == filter)
            .map(|m| m.actor_id())
            .collect();
        ids.sort();
        ids
    }
}

/// A world with a single actor.
impl ActorDirectory for StateMachineManager {
    fn manager_mut(&mut self, id: ActorId) -> Option<&mut StateMachineManager> {
        (self.actor_id() == id).then_some(self)
    }

    fn actors_of_type(&self, filter: ActorType) -> Vec<ActorId> {
        if self.actor().actor_type() == filter {
            vec![self.actor_id()]
        } else {
            Vec::new()
        }
    }
}

/// Counters from one [`pump`] call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PumpReport {
    pub delivered: usize,
    /// Envelopes whose scope had expired or whose queue was empty.
    pub dropped: usize,
    /// Envelopes addressed to actors the directory does not know.
    pub undeliverable: usize,
    /// Contract violations raised by handlers while processing deliveries.
    pub errors: Vec<MachineError>,
}

/// Deliver every envelope due at the router's current time.
///
/// Zero-delay envelopes scheduled by handlers during the pump are delivered
/// in the same pump, in further rounds. A timer is re-armed after every
/// delivery that reached a machine, even one whose handler raised a
/// violation. Only a stale-scope drop or an explicit stop ends it.
pub fn pump(
    router: &Rc<RefCell<MessageRouter>>,
    directory: &mut dyn ActorDirectory,
) -> Result<PumpReport, MachineError> {
    let max_rounds = router.borrow().max_rounds;
    let mut report = PumpReport::default();

    for _ in 0..max_rounds {
        let due = router.borrow_mut().take_due();
        if due.is_empty() {
            return Ok(report);
        }

        for scheduled in due {
            let sender = scheduled.envelope.message.sender;
            let receivers = match scheduled.fanout {
                None => vec![scheduled.envelope.message.receiver],
                Some(filter) => directory
                    .actors_of_type(filter)
                    .into_iter()
                    .filter(|id| *id != sender)
                    .collect(),
            };

            for receiver in receivers {
                let mut envelope = scheduled.envelope.clone();
                envelope.message.receiver = receiver;

                let Some(manager) = directory.manager_mut(receiver) else {
                    report.undeliverable += 1;
                    continue;
                };

                if envelope.timer {
                    router.borrow_mut().stopped.clear();
                }
                let (delivery, error) = manager.deliver(&envelope);
                if let Some(error) = error {
                    report.errors.push(error);
                }
                match delivery {
                    Delivery::Delivered => {
                        report.delivered += 1;
                        if envelope.timer {
                            router.borrow_mut().rearm(envelope);
                        }
                    }
                    Delivery::Dropped => report.dropped += 1,
                }
            }
        }
    }

    let error = MachineError::DeliveryOscillation { rounds: max_rounds };
    tracing::error!(%error, "message pump did not settle");
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{QueueSelector, Value};
    use crate::env::ManualClock;
    use crate::scheduling::{Message, ScopeRule};

    const PING: MessageName = MessageName("ping");

    fn router() -> (Rc<ManualClock>, MessageRouter) {
        let clock = Rc::new(ManualClock::new());
        let router = MessageRouter::new(clock.clone(), &EngineConfig::default());
        (clock, router)
    }

    fn envelope(delay: f32, scope: ScopeRule, queue: QueueSelector, timer: bool) -> Envelope {
        Envelope {
            delay,
            message: Message::new(PING, ActorId(1), ActorId(1), Value::Unset),
            scope,
            scope_token: 0,
            queue,
            timer,
        }
    }

    #[test]
    fn only_due_envelopes_are_taken() {
        let (clock, mut router) = router();
        router.schedule(envelope(0.0, ScopeRule::None, QueueSelector::All, false));
        router.schedule(envelope(1.0, ScopeRule::None, QueueSelector::All, false));

        assert_eq!(router.take_due().len(), 1);
        assert_eq!(router.len(), 1);

        clock.advance(1.0);
        assert_eq!(router.take_due().len(), 1);
        assert!(router.is_empty());
    }

    #[test]
    fn due_envelopes_keep_scheduling_order() {
        let (_clock, mut router) = router();
        for delay in [0.0, 0.0, 0.0] {
            router.schedule(envelope(delay, ScopeRule::None, QueueSelector::All, false));
        }
        let seqs: Vec<u64> = router.take_due().iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn purge_removes_only_scoped_envelopes_for_queue() {
        let (_clock, mut router) = router();
        let q0 = QueueSelector::One(QueueId(0));
        let q1 = QueueSelector::One(QueueId(1));
        router.schedule(envelope(1.0, ScopeRule::Substate, q0, false));
        router.schedule(envelope(1.0, ScopeRule::State, q0, true));
        router.schedule(envelope(1.0, ScopeRule::StateMachine, q0, false));
        router.schedule(envelope(1.0, ScopeRule::State, q1, false));

        router.purge_scoped(ActorId(1), QueueId(0));

        assert_eq!(router.len(), 2);
        assert!(router
            .pending()
            .all(|e| e.scope == ScopeRule::StateMachine || e.queue == q1));
    }

    #[test]
    fn stop_timer_cancels_by_name() {
        let (_clock, mut router) = router();
        router.schedule(envelope(0.5, ScopeRule::Substate, QueueSelector::All, true));
        assert!(router.has_timer(PING, ActorId(1)));

        router.stop_timer(PING, ActorId(1));
        assert!(!router.has_timer(PING, ActorId(1)));
        assert!(router.is_empty());
    }
}
