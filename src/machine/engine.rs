//! Event dispatch core.

use super::{Behavior, Context};
use crate::core::{
    ActorId, Event, Layer, MachineId, QueueId, Responses, SlotStore, StateId, StateStack,
    SubstateId, Value,
};
use crate::enforcement::{MachineError, TransitionRequest};
use crate::env::MachineEnv;
use crate::manager::ManagerLink;
use crate::scheduling::{
    Envelope, Message, ScopeRule, CHANGE_STATE_DELAYED, CHANGE_SUBSTATE_DELAYED,
};

/// Everything a machine owns except its behavior.
///
/// Split from the behavior so that a handler can borrow the behavior mutably
/// while its [`Context`] borrows the rest.
pub(crate) struct MachineCore {
    pub(crate) id: MachineId,
    pub(crate) env: MachineEnv,
    pub(crate) queue: QueueId,
    pub(crate) link: Option<ManagerLink>,

    pub(crate) current_state: StateId,
    pub(crate) current_substate: Option<SubstateId>,
    pub(crate) pending: Option<TransitionRequest>,
    pub(crate) transitions_allowed: bool,
    pub(crate) delayed_state_change_queued: bool,
    pub(crate) delayed_substate_change_queued: bool,

    pub(crate) state_scope: u32,
    pub(crate) substate_scope: u32,
    pub(crate) stack: StateStack,
    pub(crate) responses: Responses,

    pub(crate) time_on_enter_state: f32,
    pub(crate) time_on_enter_substate: f32,
    pub(crate) update_iteration: u32,

    pub(crate) broadcast_list: Vec<ActorId>,
    pub(crate) cc_receiver: Option<ActorId>,

    pub(crate) state_vars: SlotStore,
    pub(crate) substate_vars: SlotStore,

    pub(crate) violations: Vec<MachineError>,
}

impl MachineCore {
    pub(crate) fn new(env: MachineEnv, initial: StateId) -> Self {
        let capacity = env.config.history_capacity;
        Self {
            id: MachineId::new(),
            env,
            queue: QueueId(0),
            link: None,
            current_state: initial,
            current_substate: None,
            pending: None,
            transitions_allowed: true,
            delayed_state_change_queued: false,
            delayed_substate_change_queued: false,
            state_scope: 0,
            substate_scope: 0,
            stack: StateStack::new(capacity),
            responses: Responses::empty(),
            time_on_enter_state: 0.0,
            time_on_enter_substate: 0.0,
            update_iteration: 0,
            broadcast_list: Vec::new(),
            cc_receiver: None,
            state_vars: SlotStore::new(),
            substate_vars: SlotStore::new(),
            violations: Vec::new(),
        }
    }

    /// Apply the violation policy and remember the error for the current pass.
    pub(crate) fn report(&mut self, error: MachineError) -> MachineError {
        let error = self.env.config.violation_policy.enforce(error);
        self.violations.push(error.clone());
        error
    }
}

/// One behavior instance bound to an actor and a queue.
///
/// A machine is created detached. The manager attaches it to a queue when
/// the machine is installed; only attached machines may make structural
/// requests.
pub struct StateMachine {
    pub(super) behavior: Box<dyn Behavior>,
    pub(super) core: MachineCore,
}

impl StateMachine {
    pub fn new(behavior: Box<dyn Behavior>, env: MachineEnv) -> Self {
        let initial = behavior.initial_state();
        Self {
            behavior,
            core: MachineCore::new(env, initial),
        }
    }

    pub fn id(&self) -> MachineId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        self.behavior.name()
    }

    pub fn actor_id(&self) -> ActorId {
        self.core.env.actor_id()
    }

    pub fn queue(&self) -> QueueId {
        self.core.queue
    }

    pub fn is_attached(&self) -> bool {
        self.core.link.is_some()
    }

    pub fn state(&self) -> StateId {
        self.core.current_state
    }

    pub fn substate(&self) -> Option<SubstateId> {
        self.core.current_substate
    }

    /// Counter identifying the current occupancy of the state.
    pub fn state_scope(&self) -> u32 {
        self.core.state_scope
    }

    /// Counter identifying the current occupancy of the substate.
    pub fn substate_scope(&self) -> u32 {
        self.core.substate_scope
    }

    pub fn history(&self) -> &StateStack {
        &self.core.stack
    }

    pub fn responses(&self) -> Responses {
        self.core.responses
    }

    pub fn state_vars(&self) -> &SlotStore {
        &self.core.state_vars
    }

    pub fn substate_vars(&self) -> &SlotStore {
        &self.core.substate_vars
    }

    pub fn update_iteration(&self) -> u32 {
        self.core.update_iteration
    }

    /// Whether a scheduled envelope bound to `scope` with `token` is still
    /// current for this machine.
    pub fn accepts(&self, scope: ScopeRule, token: u32) -> bool {
        match scope {
            ScopeRule::Substate => token == self.core.substate_scope,
            ScopeRule::State => token == self.core.state_scope,
            ScopeRule::None | ScopeRule::StateMachine => true,
        }
    }

    pub(crate) fn attach(&mut self, link: ManagerLink) {
        self.core.queue = link.queue;
        self.core.link = Some(link);
    }

    /// Reinitialize every counter and store, then enter the initial state.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        let now = self.core.env.now();
        let core = &mut self.core;
        core.current_state = self.behavior.initial_state();
        core.current_substate = None;
        core.pending = None;
        core.transitions_allowed = true;
        core.delayed_state_change_queued = false;
        core.delayed_substate_change_queued = false;
        core.state_scope = 0;
        core.substate_scope = 0;
        core.stack.clear();
        core.responses = Responses::empty();
        core.time_on_enter_state = now;
        core.time_on_enter_substate = now;
        core.update_iteration = 0;
        core.broadcast_list.clear();
        core.cc_receiver = None;
        core.state_vars.clear();
        core.substate_vars.clear();

        tracing::debug!(
            behavior = self.behavior.name(),
            actor = %self.core.env.actor_id(),
            queue = %self.core.queue,
            state = self.core.current_state.0,
            "resetting state machine"
        );

        self.dispatch(Event::Probe, None, Layer::Global);
        self.dispatch(Event::Probe, None, Layer::State(self.core.current_state));
        self.cascade(Event::Enter, None);
        self.drain_transitions();
        self.finish_pass()
    }

    /// Run one update tick.
    ///
    /// The update goes to exactly one layer: the substate if it handles
    /// updates, else the state, else the global layer.
    pub fn update(&mut self) -> Result<(), MachineError> {
        if !self.core.responses.intersects(Responses::ANY_UPDATE)
            || self.core.env.actor.is_pending_deletion()
        {
            return Ok(());
        }
        self.core.update_iteration += 1;

        let state = self.core.current_state;
        let responses = self.core.responses;
        let layer = match self.core.current_substate {
            Some(substate) if responses.contains(Responses::UPDATE_SUBSTATE) => {
                Some(Layer::Substate(state, substate))
            }
            _ if responses.contains(Responses::UPDATE_STATE) => Some(Layer::State(state)),
            _ if responses.contains(Responses::UPDATE_MACHINE) => Some(Layer::Global),
            _ => None,
        };
        if let Some(layer) = layer {
            self.dispatch(Event::Update, None, layer);
        }

        self.drain_transitions();
        self.finish_pass()
    }

    /// Route an event through substate, state and global handlers until one
    /// handles it. Returns whether any did.
    pub fn process(&mut self, event: Event, msg: Option<&Message>) -> Result<bool, MachineError> {
        if self.core.env.actor.is_pending_deletion() {
            return Ok(false);
        }

        if let Some(msg) = msg {
            self.forward_carbon_copy(msg);
        }

        let handled = match msg {
            Some(msg) if msg.name == CHANGE_STATE_DELAYED => {
                self.apply_delayed_change(msg, |ctx, id| ctx.change_state(StateId(id)))
            }
            Some(msg) if msg.name == CHANGE_SUBSTATE_DELAYED => {
                self.apply_delayed_change(msg, |ctx, id| ctx.change_substate(SubstateId(id)))
            }
            _ => self.cascade(event, msg),
        };

        self.drain_transitions();
        self.finish_pass().map(|_| handled)
    }

    fn apply_delayed_change(
        &mut self,
        msg: &Message,
        change: impl FnOnce(&mut Context<'_>, u32) -> Result<(), MachineError>,
    ) -> bool {
        let Value::Int(id) = msg.payload else {
            return false;
        };
        let layer = self.active_layer();
        let mut ctx = Context::new(&mut self.core, Event::Message, layer);
        // Failures are already recorded on the machine.
        let _ = change(&mut ctx, id as u32);
        true
    }

    fn forward_carbon_copy(&mut self, msg: &Message) {
        let Some(watcher) = self.core.cc_receiver else {
            return;
        };
        if msg.carbon_copy
            || msg.name == CHANGE_STATE_DELAYED
            || msg.name == CHANGE_SUBSTATE_DELAYED
        {
            return;
        }
        let copy = Message {
            sender: self.core.env.actor_id(),
            receiver: watcher,
            carbon_copy: true,
            ..msg.clone()
        };
        self.core
            .env
            .scheduler
            .borrow_mut()
            .schedule(Envelope::direct(0.0, copy));
    }

    pub(crate) fn active_layer(&self) -> Layer {
        match self.core.current_substate {
            Some(substate) => Layer::Substate(self.core.current_state, substate),
            None => Layer::State(self.core.current_state),
        }
    }

    pub(crate) fn dispatch(&mut self, event: Event, msg: Option<&Message>, layer: Layer) -> bool {
        let mut ctx = Context::new(&mut self.core, event, layer);
        self.behavior.dispatch(&mut ctx, event, msg, layer)
    }

    fn cascade(&mut self, event: Event, msg: Option<&Message>) -> bool {
        let state = self.core.current_state;
        if let Some(substate) = self.core.current_substate {
            if self.dispatch(event, msg, Layer::Substate(state, substate)) {
                return true;
            }
        }
        self.dispatch(event, msg, Layer::State(state)) || self.dispatch(event, msg, Layer::Global)
    }

    pub(crate) fn report(&mut self, error: MachineError) -> MachineError {
        self.core.report(error)
    }

    fn finish_pass(&mut self) -> Result<(), MachineError> {
        match self.core.violations.drain(..).next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.core.id)
            .field("behavior", &self.behavior.name())
            .field("queue", &self.core.queue)
            .field("state", &self.core.current_state)
            .field("substate", &self.core.current_substate)
            .field("state_scope", &self.core.state_scope)
            .field("substate_scope", &self.core.substate_scope)
            .finish()
    }
}
