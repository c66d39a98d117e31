//! Contract violations and how they are handled.

use crate::core::{ActorId, MessageName, QueueId, SlotError, StateId, SubstateId, VarScope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A transition requested by handler code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionRequest {
    State(StateId),
    Substate(SubstateId),
    Pop,
}

/// Programming-contract violations detected by the engine.
///
/// These are defects in behavior definitions or driver code, never runtime
/// conditions to retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MachineError {
    #[error("transition {requested:?} requested while transitions are disallowed (inside an exit handler)")]
    TransitionNotAllowed { requested: TransitionRequest },

    #[error("transition {requested:?} requested while {pending:?} is already pending")]
    TransitionAlreadyPending {
        pending: TransitionRequest,
        requested: TransitionRequest,
    },

    #[error("cannot pop state: history stack is empty")]
    StateStackUnderflow,

    #[error("behavior '{behavior}' exceeded {limit} transitions in one pass; states are oscillating")]
    TransitionOscillation { behavior: String, limit: usize },

    #[error("{queue} exceeded {limit} structural changes in one pass; behaviors are oscillating")]
    StructuralChangeOscillation { queue: QueueId, limit: usize },

    #[error("message delivery did not settle after {rounds} rounds")]
    DeliveryOscillation { rounds: usize },

    #[error("{scope:?} variable access failed: {source}")]
    Variable {
        scope: VarScope,
        #[source]
        source: SlotError,
    },

    #[error("{queue} already has a pending structural change")]
    DuplicateStructuralRequest { queue: QueueId },

    #[error("cannot pop the last state machine in {queue} (entries: {len})")]
    CannotPopLastMachine { queue: QueueId, len: usize },

    #[error("{queue} has no state machine to operate on")]
    EmptyQueue { queue: QueueId },

    #[error("message '{name}' addressed to own {actor}; use a scoped self-send instead")]
    MisroutedSelfMessage { name: MessageName, actor: ActorId },

    #[error("message '{name}' addressed to own {queue}; use a machine-scoped self-send instead")]
    MisroutedQueueMessage { name: MessageName, queue: QueueId },

    #[error("{queue} is out of range (queues: {count})")]
    QueueOutOfRange { queue: QueueId, count: usize },

    #[error("delay {delay} must be greater than zero for '{name}'")]
    InvalidDelay { name: MessageName, delay: f32 },

    #[error("broadcast list is empty")]
    EmptyBroadcastList,

    #[error("state machine is not attached to a manager")]
    NotAttached,
}

/// What happens after a violation has been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationPolicy {
    /// Treat the violation as fatal.
    Panic,

    /// Turn the offending request into a no-op and report the error.
    Report,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ViolationPolicy::Panic
        } else {
            ViolationPolicy::Report
        }
    }
}

impl ViolationPolicy {
    /// Log `error` and apply the policy, handing the error back for reporting.
    pub fn enforce(self, error: MachineError) -> MachineError {
        tracing::error!(%error, "state machine contract violation");
        if self == ViolationPolicy::Panic {
            panic!("state machine contract violation: {error}");
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_policy_returns_error() {
        let error = ViolationPolicy::Report.enforce(MachineError::StateStackUnderflow);
        assert_eq!(error, MachineError::StateStackUnderflow);
    }

    #[test]
    #[should_panic(expected = "history stack is empty")]
    fn panic_policy_panics() {
        ViolationPolicy::Panic.enforce(MachineError::StateStackUnderflow);
    }

    #[test]
    fn messages_name_the_offender() {
        let error = MachineError::DuplicateStructuralRequest { queue: QueueId(1) };
        assert_eq!(
            error.to_string(),
            "queue#1 already has a pending structural change"
        );
    }

    #[test]
    fn policy_round_trips_through_json() {
        let json = serde_json::to_string(&ViolationPolicy::Report).unwrap();
        assert_eq!(json, "\"Report\"");
    }
}
