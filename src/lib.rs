//! Actorstack: per-actor stacks of hierarchical state machines
//!
//! Each actor owns a few independent queues, and each queue is a stack of
//! behaviors. The top behavior of a queue is active and runs as a two-level
//! state machine (state, then optional substate) with a global layer beneath.
//! Everything that would mutate control structure mid-dispatch is deferred:
//! state transitions are applied after the handler returns, and structural
//! changes to a queue are applied on the manager's next update.
//!
//! # Core Concepts
//!
//! - **Behavior**: one `dispatch` function per behavior, routed by [`core::Layer`]
//! - **Scopes**: self-sent messages bound to the current state or substate are
//!   dropped once that scope has been left
//! - **Queues**: deferred push/pop/replace/queue/requeue/reset per queue
//! - **Collaborators**: actor, scheduler and clock are passed in, never global
//!
//! # Example
//!
//! ```rust
//! use actorstack::builder::ManagerBuilder;
//! use actorstack::config::EngineConfig;
//! use actorstack::core::{ActorId, Event, Hook, Layer, MessageName, QueueId, StateId};
//! use actorstack::env::{ActorRecord, ManualClock};
//! use actorstack::machine::{Behavior, Context};
//! use actorstack::scheduling::{pump, Message, MessageRouter};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! const PATROL: StateId = StateId(0);
//! const REST: StateId = StateId(1);
//! const TIRED: MessageName = MessageName("tired");
//!
//! struct Guard;
//!
//! impl Behavior for Guard {
//!     fn name(&self) -> &str {
//!         "guard"
//!     }
//!
//!     fn dispatch(
//!         &mut self,
//!         ctx: &mut Context<'_>,
//!         event: Event,
//!         msg: Option<&Message>,
//!         layer: Layer,
//!     ) -> bool {
//!         match (layer, event) {
//!             (Layer::State(PATROL), Event::Probe) => {
//!                 ctx.responds_to(Hook::Enter);
//!                 true
//!             }
//!             (Layer::State(PATROL), Event::Enter) => {
//!                 ctx.send_delayed_to_state(2.0, TIRED, 0).is_ok()
//!             }
//!             (Layer::State(PATROL), Event::Message) if msg.map(|m| m.name) == Some(TIRED) => {
//!                 ctx.change_state(REST).is_ok()
//!             }
//!             _ => false,
//!         }
//!     }
//! }
//!
//! let clock = Rc::new(ManualClock::new());
//! let config = EngineConfig::default();
//! let router = Rc::new(RefCell::new(MessageRouter::new(clock.clone(), &config)));
//!
//! let mut manager = ManagerBuilder::new()
//!     .actor(Rc::new(ActorRecord::new(ActorId(1))))
//!     .scheduler(router.clone())
//!     .clock(clock.clone())
//!     .config(config)
//!     .initial(QueueId(0), Box::new(Guard))
//!     .build()
//!     .unwrap();
//!
//! manager.update().unwrap();
//! clock.advance(2.0);
//! pump(&router, &mut manager).unwrap();
//!
//! let guard = manager.active(QueueId(0)).unwrap();
//! assert_eq!(guard.state(), REST);
//! assert_eq!(guard.history().to_vec(), vec![PATROL]);
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod enforcement;
pub mod env;
pub mod machine;
pub mod manager;
pub mod scheduling;

// Re-export commonly used types
pub use builder::{BuildError, ManagerBuilder};
pub use config::EngineConfig;
pub use enforcement::{MachineError, ViolationPolicy};
pub use machine::{Behavior, Context, StateMachine};
pub use manager::StateMachineManager;
