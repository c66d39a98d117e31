//! Per-actor queues of state machines.
//!
//! An actor runs a fixed number of independent queues. Each queue is a stack
//! of [`StateMachine`](crate::machine::StateMachine)s whose top entry is the
//! active one. Pushing, popping, replacing, queueing, requeueing and
//! resetting are all deferred: a request parks on a per-queue slot and is
//! applied at the start of the next [`StateMachineManager::update`], so a
//! machine can never tear itself down while its own handler is running.
//!
//! Tearing down or replacing the active machine purges every scope-bound
//! message still scheduled for that queue.

mod change;
mod queues;

pub use change::ChangeKind;
pub(crate) use change::{ManagerLink, StructuralChange};
pub use queues::StateMachineManager;
