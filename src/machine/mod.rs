//! Hierarchical state machine dispatch and transitions.
//!
//! A [`StateMachine`] pairs one [`Behavior`] with the bookkeeping needed to
//! run it: the current state and optional substate, scope counters, the
//! bounded history of prior states, the response bitmask and two scoped
//! variable stores.
//!
//! Events cascade from the substate to the state to the global layer; the
//! first layer that reports the event handled stops the cascade. Transitions
//! requested by handlers are buffered and applied only after the dispatch
//! returns. Entering a state may request another transition, so application
//! loops, bounded by the configured iteration limit.

mod behavior;
mod context;
mod engine;
mod transition;

pub use behavior::Behavior;
pub use context::Context;
pub use engine::StateMachine;
