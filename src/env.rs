//! External collaborators of the engine.
//!
//! The engine never reaches for globals. Each manager is built with a
//! [`MachineEnv`] naming the actor it drives, the scheduler its messages go
//! through, the clock it reads and the shared configuration. Every machine the
//! manager owns carries a clone of that environment.

use crate::config::EngineConfig;
use crate::core::{ActorId, ActorType};
use crate::scheduling::MessageScheduler;
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// The entity a manager's behaviors control.
pub trait Actor {
    fn id(&self) -> ActorId;

    fn actor_type(&self) -> ActorType {
        ActorType::default()
    }

    /// Actors pending deletion receive no further updates or events.
    fn is_pending_deletion(&self) -> bool {
        false
    }
}

/// Minimal actor record for drivers that do not have their own actor type.
#[derive(Debug)]
pub struct ActorRecord {
    id: ActorId,
    actor_type: ActorType,
    pending_deletion: Cell<bool>,
}

impl ActorRecord {
    pub fn new(id: ActorId) -> Self {
        Self::with_type(id, ActorType::default())
    }

    pub fn with_type(id: ActorId, actor_type: ActorType) -> Self {
        Self {
            id,
            actor_type,
            pending_deletion: Cell::new(false),
        }
    }

    pub fn mark_for_deletion(&self) {
        self.pending_deletion.set(true);
    }
}

impl Actor for ActorRecord {
    fn id(&self) -> ActorId {
        self.id
    }

    fn actor_type(&self) -> ActorType {
        self.actor_type
    }

    fn is_pending_deletion(&self) -> bool {
        self.pending_deletion.get()
    }
}

/// Source of game time, in seconds.
pub trait Clock {
    fn now(&self) -> f32;
}

/// Clock advanced explicitly by the frame driver.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f32) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f32) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f32 {
        self.now.get()
    }
}

/// Wall-clock seconds elapsed since the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    started_at: DateTime<Utc>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f32 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        elapsed
            .to_std()
            .map(|d| d.as_secs_f32())
            .unwrap_or(0.0)
    }
}

/// Handles to everything a state machine needs from the outside world.
#[derive(Clone)]
pub struct MachineEnv {
    pub actor: Rc<dyn Actor>,
    pub scheduler: Rc<RefCell<dyn MessageScheduler>>,
    pub clock: Rc<dyn Clock>,
    pub config: Rc<EngineConfig>,
}

impl MachineEnv {
    pub fn new(
        actor: Rc<dyn Actor>,
        scheduler: Rc<RefCell<dyn MessageScheduler>>,
        clock: Rc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            actor,
            scheduler,
            clock,
            config: Rc::new(config),
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor.id()
    }

    pub fn now(&self) -> f32 {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        clock.advance(0.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 0.75);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock::new();
        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now() >= first);
    }

    #[test]
    fn actor_record_tracks_deletion() {
        let actor = ActorRecord::with_type(ActorId(3), ActorType(2));
        assert_eq!(actor.id(), ActorId(3));
        assert_eq!(actor.actor_type(), ActorType(2));
        assert!(!actor.is_pending_deletion());
        actor.mark_for_deletion();
        assert!(actor.is_pending_deletion());
    }
}
