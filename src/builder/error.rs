//! Errors raised while assembling a manager.

use crate::config::ConfigError;
use crate::core::QueueId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Actor not specified. Call .actor(actor) before .build()")]
    MissingActor,

    #[error("Scheduler not specified. Call .scheduler(scheduler) before .build()")]
    MissingScheduler,

    #[error("Clock not specified. Call .clock(clock) before .build()")]
    MissingClock,

    #[error("Invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    InvalidConfig(Vec<ConfigError>),

    #[error("Initial behavior given for {queue}, but only {count} queues are configured")]
    QueueOutOfRange { queue: QueueId, count: usize },

    #[error("More than one initial behavior given for {queue}")]
    DuplicateInitial { queue: QueueId },
}
