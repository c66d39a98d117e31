//! Contract enforcement for behavior code and drivers.
//!
//! Every misuse the engine can detect (an illegal transition request, a
//! second structural change before the first resolved, an out-of-range slot,
//! a runaway transition loop) is a [`MachineError`]. Violations are always
//! logged; the configured [`ViolationPolicy`] decides whether they are fatal
//! or become reported no-ops.
//!
//! # Example
//!
//! ```rust
//! use actorstack::enforcement::{MachineError, ViolationPolicy};
//!
//! let error = ViolationPolicy::Report.enforce(MachineError::EmptyBroadcastList);
//! assert_eq!(error, MachineError::EmptyBroadcastList);
//! ```

pub mod violations;

pub use violations::{MachineError, TransitionRequest, ViolationPolicy};
