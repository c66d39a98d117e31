//! Engine configuration.
//!
//! Limits and constants shared by every machine and manager of a world. The
//! configuration is plain serde data so it can ship as JSON next to behavior
//! tables; [`EngineConfig::validate`] reports every problem at once.

use crate::core::DEFAULT_HISTORY_CAPACITY;
use crate::enforcement::ViolationPolicy;
use serde::{Deserialize, Serialize};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Default number of queues per actor.
pub const DEFAULT_QUEUE_COUNT: usize = 2;

/// Default bound on transitions applied in one drain pass.
pub const DEFAULT_MAX_TRANSITIONS: usize = 20;

/// Default bound on structural changes applied in one resolution pass.
pub const DEFAULT_MAX_CHANGES: usize = 20;

/// Default bound on zero-delay delivery rounds in one pump.
pub const DEFAULT_MAX_DELIVERY_ROUNDS: usize = 32;

/// Default length of one frame, in seconds.
pub const ONE_FRAME: f32 = 0.001;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("queue_count must be at least 1")]
    NoQueues,

    #[error("history_capacity must be at least 1")]
    NoHistory,

    #[error("{field} must be at least 1")]
    ZeroLimit { field: &'static str },

    #[error("one_frame must be positive and finite (got {value})")]
    InvalidFrame { value: f32 },

    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ConfigError>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Independent behavior stacks per actor.
    pub queue_count: usize,
    /// Prior states remembered for `pop_state`.
    pub history_capacity: usize,
    pub max_transition_iterations: usize,
    pub max_change_iterations: usize,
    pub max_delivery_rounds: usize,
    /// Delay used for "next tick" deliveries and the minimum timer period.
    pub one_frame: f32,
    pub violation_policy: ViolationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_count: DEFAULT_QUEUE_COUNT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_transition_iterations: DEFAULT_MAX_TRANSITIONS,
            max_change_iterations: DEFAULT_MAX_CHANGES,
            max_delivery_rounds: DEFAULT_MAX_DELIVERY_ROUNDS,
            one_frame: ONE_FRAME,
            violation_policy: ViolationPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validated()
    }

    /// Consume the config, returning it if valid or every problem found.
    pub fn validated(self) -> Result<Self, ConfigError> {
        match self.validate() {
            Validation::Success(_) => Ok(self),
            Validation::Failure(errors) => {
                Err(ConfigError::Invalid(errors.iter().cloned().collect()))
            }
        }
    }

    /// Check every field, accumulating all failures.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<ConfigError>> {
        let limits = [
            ("max_transition_iterations", self.max_transition_iterations),
            ("max_change_iterations", self.max_change_iterations),
            ("max_delivery_rounds", self.max_delivery_rounds),
        ];

        let mut checks: Vec<Validation<(), NonEmptyVec<ConfigError>>> = vec![
            check(self.queue_count > 0, ConfigError::NoQueues),
            check(self.history_capacity > 0, ConfigError::NoHistory),
            check(
                self.one_frame.is_finite() && self.one_frame > 0.0,
                ConfigError::InvalidFrame {
                    value: self.one_frame,
                },
            ),
        ];
        for (field, value) in limits {
            checks.push(check(value > 0, ConfigError::ZeroLimit { field }));
        }

        Validation::all_vec(checks).map(|_| ())
    }
}

fn check(ok: bool, error: ConfigError) -> Validation<(), NonEmptyVec<ConfigError>> {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(error)
    }
}
