//! Builder API for assembling managers and declaring behavior ids.
//!
//! [`ManagerBuilder`] wires a [`StateMachineManager`](crate::manager::StateMachineManager)
//! to its collaborators with validation, and [`state_ids!`](crate::state_ids)
//! turns plain enums into state and substate ids.

pub mod error;
pub mod macros;
pub mod manager;

pub use error::BuildError;
pub use manager::ManagerBuilder;
