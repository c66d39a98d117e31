//! Core data types of the behavior engine.
//!
//! This module holds the plain data the dispatch core operates on:
//! - Identifiers for actors, states, substates, queues and messages
//! - Tagged values and the scoped variable slot store
//! - The bounded history of prior states
//! - Events, dispatch layers and the response bitmask
//!
//! Nothing here talks to a scheduler, clock or manager.

mod event;
mod history;
mod ids;
mod slots;
mod value;

pub use event::{Event, Hook, Layer, Responses};
pub use history::{StateStack, DEFAULT_HISTORY_CAPACITY};
pub use ids::{
    ActorId, ActorType, MachineId, MessageName, QueueId, QueueSelector, StateId, SubstateId,
};
pub use slots::{SlotError, SlotStore, VarScope};
pub use value::{Handle, Value, ValueKind, Vec2, Vec3};
