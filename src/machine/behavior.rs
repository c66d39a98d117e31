//! The behavior interface implemented once per concrete behavior.

use super::Context;
use crate::core::{Event, Layer, StateId};
use crate::scheduling::Message;

/// A hierarchical behavior driven by a [`StateMachine`](super::StateMachine).
///
/// `dispatch` is called once per layer the engine routes an event to. Return
/// `true` when the event was handled at `layer`; the cascade then stops.
///
/// During [`Event::Probe`] a layer declares which lifecycle hooks it handles
/// through [`Context::responds_to`]. Layers that do not declare a hook never
/// receive that hook's events.
///
/// # Example
///
/// ```rust
/// use actorstack::core::{Event, Hook, Layer, StateId};
/// use actorstack::machine::{Behavior, Context};
/// use actorstack::scheduling::Message;
///
/// const IDLE: StateId = StateId(0);
/// const BUSY: StateId = StateId(1);
///
/// struct Worker;
///
/// impl Behavior for Worker {
///     fn name(&self) -> &str {
///         "worker"
///     }
///
///     fn dispatch(
///         &mut self,
///         ctx: &mut Context<'_>,
///         event: Event,
///         msg: Option<&Message>,
///         layer: Layer,
///     ) -> bool {
///         match (layer, event) {
///             (Layer::State(IDLE), Event::Probe) => {
///                 ctx.responds_to(Hook::Update);
///                 true
///             }
///             (Layer::State(IDLE), Event::Update) => {
///                 let _ = ctx.change_state(BUSY);
///                 true
///             }
///             (Layer::State(BUSY), Event::Message) => msg.is_some(),
///             _ => false,
///         }
///     }
/// }
/// ```
pub trait Behavior {
    fn name(&self) -> &str;

    /// State entered on reset.
    fn initial_state(&self) -> StateId {
        StateId::INITIAL
    }

    fn dispatch(
        &mut self,
        ctx: &mut Context<'_>,
        event: Event,
        msg: Option<&Message>,
        layer: Layer,
    ) -> bool;
}
