//! Builder for constructing state machine managers.

use crate::builder::error::BuildError;
use crate::config::EngineConfig;
use crate::core::QueueId;
use crate::env::{Actor, Clock, MachineEnv};
use crate::machine::Behavior;
use crate::manager::StateMachineManager;
use crate::scheduling::MessageScheduler;
use std::cell::RefCell;
use std::rc::Rc;
use stillwater::validation::Validation;

/// Fluent assembly of a [`StateMachineManager`] and its collaborators.
///
/// # Example
///
/// ```rust
/// use actorstack::builder::ManagerBuilder;
/// use actorstack::config::EngineConfig;
/// use actorstack::core::ActorId;
/// use actorstack::env::{ActorRecord, ManualClock};
/// use actorstack::scheduling::MessageRouter;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let clock = Rc::new(ManualClock::new());
/// let config = EngineConfig::default();
/// let router = Rc::new(RefCell::new(MessageRouter::new(clock.clone(), &config)));
///
/// let manager = ManagerBuilder::new()
///     .actor(Rc::new(ActorRecord::new(ActorId(1))))
///     .scheduler(router)
///     .clock(clock)
///     .config(config)
///     .build()
///     .unwrap();
///
/// assert_eq!(manager.queue_count(), 2);
/// ```
pub struct ManagerBuilder {
    actor: Option<Rc<dyn Actor>>,
    scheduler: Option<Rc<RefCell<dyn MessageScheduler>>>,
    clock: Option<Rc<dyn Clock>>,
    config: EngineConfig,
    initial: Vec<(QueueId, Box<dyn Behavior>)>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            actor: None,
            scheduler: None,
            clock: None,
            config: EngineConfig::default(),
            initial: Vec::new(),
        }
    }

    /// Set the controlled actor (required).
    pub fn actor(mut self, actor: Rc<dyn Actor>) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Set the message scheduler (required).
    pub fn scheduler(mut self, scheduler: Rc<RefCell<dyn MessageScheduler>>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the time source (required).
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Push `behavior` onto `queue` on the manager's first update.
    pub fn initial(mut self, queue: QueueId, behavior: Box<dyn Behavior>) -> Self {
        self.initial.push((queue, behavior));
        self
    }

    /// Build the manager.
    /// Returns an error if a collaborator is missing or the config is invalid.
    pub fn build(self) -> Result<StateMachineManager, BuildError> {
        let actor = self.actor.ok_or(BuildError::MissingActor)?;
        let scheduler = self.scheduler.ok_or(BuildError::MissingScheduler)?;
        let clock = self.clock.ok_or(BuildError::MissingClock)?;

        if let Validation::Failure(errors) = self.config.validate() {
            return Err(BuildError::InvalidConfig(errors.iter().cloned().collect()));
        }

        let count = self.config.queue_count;
        let mut seen = Vec::new();
        for (queue, _) in &self.initial {
            if queue.0 >= count {
                return Err(BuildError::QueueOutOfRange {
                    queue: *queue,
                    count,
                });
            }
            if seen.contains(queue) {
                return Err(BuildError::DuplicateInitial { queue: *queue });
            }
            seen.push(*queue);
        }

        let env = MachineEnv::new(actor, scheduler, clock, self.config);
        let mut manager = StateMachineManager::new(env);
        for (queue, behavior) in self.initial {
            // Range and uniqueness were checked above, so the slot is free.
            if let Err(error) = manager.request_push(queue, behavior) {
                tracing::error!(%error, %queue, "failed to queue initial behavior");
            }
        }
        Ok(manager)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
