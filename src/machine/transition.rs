//! Transition engine.
//!
//! Handlers only record a [`TransitionRequest`]. The request is applied here,
//! after the dispatch that made it has returned, so a handler never observes
//! its own state changing underneath it.

use super::StateMachine;
use crate::core::{Event, Layer, Responses};
use crate::enforcement::{MachineError, TransitionRequest};

impl StateMachine {
    /// Apply pending transitions until none is left.
    ///
    /// Enter handlers may request a further transition, so this loops. A
    /// behavior that keeps doing so past the configured bound is reported as
    /// oscillating and its last request is discarded.
    pub(crate) fn drain_transitions(&mut self) {
        let limit = self.core.env.config.max_transition_iterations;
        let mut applied = 0;

        while let Some(request) = self.core.pending.take() {
            if applied == limit {
                self.core.transitions_allowed = true;
                let error = MachineError::TransitionOscillation {
                    behavior: self.behavior.name().to_string(),
                    limit,
                };
                self.report(error);
                return;
            }
            applied += 1;
            self.apply_transition(request);
        }
    }

    fn apply_transition(&mut self, request: TransitionRequest) {
        let full = !matches!(request, TransitionRequest::Substate(_));
        let from_state = self.core.current_state;
        let from_substate = self.core.current_substate;

        self.core.transitions_allowed = false;
        self.core.delayed_state_change_queued = false;
        self.core.delayed_substate_change_queued = false;
        self.core.update_iteration = 0;

        if let Some(substate) = from_substate {
            if self.core.responses.contains(Responses::EXIT_SUBSTATE) {
                self.dispatch(Event::Exit, None, Layer::Substate(from_state, substate));
            }
        }
        if full && self.core.responses.contains(Responses::EXIT_STATE) {
            self.dispatch(Event::Exit, None, Layer::State(from_state));
        }

        match request {
            TransitionRequest::State(next) => {
                if let Some(evicted) = self.core.stack.push(from_state) {
                    tracing::warn!(
                        behavior = self.behavior.name(),
                        actor = %self.core.env.actor_id(),
                        evicted = evicted.0,
                        capacity = self.core.stack.capacity(),
                        "state history full, dropped oldest entry"
                    );
                }
                self.core.current_state = next;
                self.core.current_substate = None;
            }
            TransitionRequest::Substate(next) => {
                self.core.current_substate = Some(next);
            }
            TransitionRequest::Pop => match self.core.stack.pop() {
                Some(previous) => {
                    self.core.current_state = previous;
                    self.core.current_substate = None;
                }
                None => {
                    self.core.transitions_allowed = true;
                    self.report(MachineError::StateStackUnderflow);
                    return;
                }
            },
        }

        let core = &mut self.core;
        core.substate_scope = core.substate_scope.wrapping_add(1);
        core.substate_vars.clear();
        let now = core.env.now();
        core.time_on_enter_substate = now;
        if full {
            core.state_scope = core.state_scope.wrapping_add(1);
            core.state_vars.clear();
            core.time_on_enter_state = now;
        }
        core.transitions_allowed = true;

        tracing::debug!(
            behavior = self.behavior.name(),
            actor = %self.core.env.actor_id(),
            queue = %self.core.queue,
            from_state = from_state.0,
            from_substate = ?from_substate.map(|s| s.0),
            to_state = self.core.current_state.0,
            to_substate = ?self.core.current_substate.map(|s| s.0),
            state_scope = self.core.state_scope,
            substate_scope = self.core.substate_scope,
            "applied transition"
        );

        // Drop hook bits learned from the layers just left, then relearn.
        let layer = self.active_layer();
        if full {
            self.core.responses &= Responses::MACHINE;
        } else {
            self.core.responses &= Responses::STATE | Responses::MACHINE;
        }
        self.dispatch(Event::Probe, None, layer);

        let enter = if full {
            Responses::ENTER_STATE
        } else {
            Responses::ENTER_SUBSTATE
        };
        if self.core.responses.contains(enter) {
            self.dispatch(Event::Enter, None, layer);
        }
    }
}
