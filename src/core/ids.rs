//! Identifier newtypes shared across the engine.
//!
//! States and substates are dense indices chosen by behavior authors (usually
//! through the [`state_ids!`](crate::state_ids) macro). Actors, queues and message
//! names are handed to the engine by its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of an actor as known to the actor registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Category tag used to filter broadcast receivers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct ActorType(pub u32);

/// Index of a top-level state inside one behavior.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u32);

impl StateId {
    /// The state every behavior starts in unless it overrides
    /// [`Behavior::initial_state`](crate::machine::Behavior::initial_state).
    pub const INITIAL: StateId = StateId(0);
}

impl From<u32> for StateId {
    fn from(value: u32) -> Self {
        StateId(value)
    }
}

/// Index of a substate nested inside the current state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubstateId(pub u32);

impl From<u32> for SubstateId {
    fn from(value: u32) -> Self {
        SubstateId(value)
    }
}

/// One of the independent behavior stacks an actor runs in parallel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub usize);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Addresses either a single queue or every queue of an actor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum QueueSelector {
    One(QueueId),
    All,
}

impl QueueSelector {
    /// Whether this selector addresses `queue`.
    pub fn includes(&self, queue: QueueId) -> bool {
        match self {
            QueueSelector::One(q) => *q == queue,
            QueueSelector::All => true,
        }
    }
}

impl From<QueueId> for QueueSelector {
    fn from(queue: QueueId) -> Self {
        QueueSelector::One(queue)
    }
}

/// Name of a message. Message vocabularies are fixed at compile time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MessageName(pub &'static str);

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Unique identity of one state machine instance.
///
/// Two instances of the same behavior type are distinguishable in logs and
/// when inspecting a queue.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct MachineId(Uuid);

impl MachineId {
    pub fn new() -> Self {
        MachineId(Uuid::new_v4())
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
