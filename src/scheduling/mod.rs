//! Message scheduling contract.
//!
//! The engine does not deliver messages itself. It hands [`Envelope`]s to a
//! [`MessageScheduler`] and relies on the scheduler to hold them until due,
//! drop envelopes whose scope has expired, re-arm timers and purge scoped
//! envelopes when a queue's behavior is torn down.
//!
//! # Scope tokens
//!
//! A self-addressed envelope records the sender's scope counter at send time.
//! If the sender's state (or substate) has since changed, the counter no
//! longer matches and the envelope is silently dropped on delivery. This is
//! how "send to my current substate only" is realized without tracking
//! individual envelopes.
//!
//! [`MessageRouter`] is an in-memory implementation suitable for single-world
//! drivers and tests.

mod router;

pub use router::{pump, ActorDirectory, MessageRouter, PumpReport};

use crate::core::{ActorId, ActorType, MessageName, QueueId, QueueSelector, Value};

/// Reserved message carrying a delayed state change.
pub const CHANGE_STATE_DELAYED: MessageName = MessageName("__change_state_delayed");

/// Reserved message carrying a delayed substate change.
pub const CHANGE_SUBSTATE_DELAYED: MessageName = MessageName("__change_substate_delayed");

/// Which of the sender's scopes an envelope is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeRule {
    /// Not bound to any scope.
    None,
    /// Dropped once the sender's substate changes.
    Substate,
    /// Dropped once the sender's state changes.
    State,
    /// Survives every transition and reset of the sending machine.
    StateMachine,
}

impl ScopeRule {
    /// Bound to a scope that ends on a transition. Such envelopes are purged
    /// when a queue's behavior is torn down.
    pub fn is_scoped(&self) -> bool {
        matches!(self, ScopeRule::Substate | ScopeRule::State)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub name: MessageName,
    pub sender: ActorId,
    pub receiver: ActorId,
    pub payload: Value,
    /// Set on copies forwarded to a carbon-copy watcher.
    pub carbon_copy: bool,
}

impl Message {
    pub fn new(name: MessageName, sender: ActorId, receiver: ActorId, payload: Value) -> Self {
        Self {
            name,
            sender,
            receiver,
            payload,
            carbon_copy: false,
        }
    }
}

/// A message together with its delivery instructions.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Seconds from scheduling until delivery; zero means the current pass.
    pub delay: f32,
    pub message: Message,
    pub scope: ScopeRule,
    /// Sender's scope counter captured at send time.
    pub scope_token: u32,
    pub queue: QueueSelector,
    /// Re-arm with the same delay after each successful delivery.
    pub timer: bool,
}

impl Envelope {
    /// An unscoped, one-shot envelope for every queue of the receiver.
    pub fn direct(delay: f32, message: Message) -> Self {
        Self {
            delay,
            message,
            scope: ScopeRule::StateMachine,
            scope_token: 0,
            queue: QueueSelector::All,
            timer: false,
        }
    }
}

/// Outcome of handing an envelope to a receiver's manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Nothing accepted the envelope: its scope had expired or the target
    /// queue was empty.
    Dropped,
}

/// The scheduler collaborator consumed by machines and managers.
pub trait MessageScheduler {
    fn schedule(&mut self, envelope: Envelope);

    /// Cancel every scope-bound envelope addressed to `receiver` in `queue`.
    fn purge_scoped(&mut self, receiver: ActorId, queue: QueueId);

    /// Cancel the timer `name` armed by `actor`.
    fn stop_timer(&mut self, name: MessageName, actor: ActorId);

    /// Deliver a copy of `envelope` to every actor of `filter` except the sender.
    fn broadcast_by_type(&mut self, envelope: Envelope, filter: ActorType);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_state_and_substate_rules_are_scoped() {
        assert!(ScopeRule::Substate.is_scoped());
        assert!(ScopeRule::State.is_scoped());
        assert!(!ScopeRule::StateMachine.is_scoped());
        assert!(!ScopeRule::None.is_scoped());
    }

    #[test]
    fn direct_envelopes_are_unscoped() {
        let msg = Message::new(MessageName("ping"), ActorId(1), ActorId(2), Value::Unset);
        let envelope = Envelope::direct(0.0, msg);
        assert_eq!(envelope.scope, ScopeRule::StateMachine);
        assert_eq!(envelope.queue, QueueSelector::All);
        assert!(!envelope.timer);
    }
}
