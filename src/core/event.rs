//! Events, dispatch layers and the response bitmask.

use super::ids::{StateId, SubstateId};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// Event categories a behavior receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Synthetic capability query; handlers answer through
    /// [`Context::responds_to`](crate::machine::Context::responds_to).
    Probe,
    Enter,
    Exit,
    Update,
    Message,
}

/// The part of a behavior an event is being dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Handlers that apply regardless of the current state.
    Global,
    State(StateId),
    Substate(StateId, SubstateId),
}

impl Layer {
    pub fn state(&self) -> Option<StateId> {
        match self {
            Layer::Global => None,
            Layer::State(s) | Layer::Substate(s, _) => Some(*s),
        }
    }

    pub fn substate(&self) -> Option<SubstateId> {
        match self {
            Layer::Substate(_, ss) => Some(*ss),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Layer::Global)
    }
}

/// Lifecycle hooks a layer can declare during a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    Enter,
    Exit,
    Update,
}

/// Bitmask of the hooks the active state, substate and global layer handle.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Responses(u16);

impl Responses {
    pub const ENTER_STATE: Responses = Responses(1 << 0);
    pub const EXIT_STATE: Responses = Responses(1 << 1);
    pub const UPDATE_STATE: Responses = Responses(1 << 2);
    pub const ENTER_SUBSTATE: Responses = Responses(1 << 3);
    pub const EXIT_SUBSTATE: Responses = Responses(1 << 4);
    pub const UPDATE_SUBSTATE: Responses = Responses(1 << 5);
    pub const UPDATE_MACHINE: Responses = Responses(1 << 6);

    pub const STATE: Responses =
        Responses(Self::ENTER_STATE.0 | Self::EXIT_STATE.0 | Self::UPDATE_STATE.0);
    pub const SUBSTATE: Responses =
        Responses(Self::ENTER_SUBSTATE.0 | Self::EXIT_SUBSTATE.0 | Self::UPDATE_SUBSTATE.0);
    pub const MACHINE: Responses = Self::UPDATE_MACHINE;
    pub const ANY_UPDATE: Responses =
        Responses(Self::UPDATE_STATE.0 | Self::UPDATE_SUBSTATE.0 | Self::UPDATE_MACHINE.0);

    pub const fn empty() -> Self {
        Responses(0)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set.
    pub const fn contains(&self, other: Responses) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set.
    pub const fn intersects(&self, other: Responses) -> bool {
        self.0 & other.0 != 0
    }

    /// The bit recording that `layer` handles `hook`.
    ///
    /// The global layer has no enter or exit of its own, so those map to nothing.
    pub fn for_hook(layer: Layer, hook: Hook) -> Responses {
        match (layer, hook) {
            (Layer::Global, Hook::Update) => Self::UPDATE_MACHINE,
            (Layer::Global, _) => Self::empty(),
            (Layer::State(_), Hook::Enter) => Self::ENTER_STATE,
            (Layer::State(_), Hook::Exit) => Self::EXIT_STATE,
            (Layer::State(_), Hook::Update) => Self::UPDATE_STATE,
            (Layer::Substate(..), Hook::Enter) => Self::ENTER_SUBSTATE,
            (Layer::Substate(..), Hook::Exit) => Self::EXIT_SUBSTATE,
            (Layer::Substate(..), Hook::Update) => Self::UPDATE_SUBSTATE,
        }
    }
}

impl BitOr for Responses {
    type Output = Responses;
    fn bitor(self, rhs: Self) -> Self {
        Responses(self.0 | rhs.0)
    }
}

impl BitOrAssign for Responses {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Responses {
    type Output = Responses;
    fn bitand(self, rhs: Self) -> Self {
        Responses(self.0 & rhs.0)
    }
}

impl BitAndAssign for Responses {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl fmt::Debug for Responses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Responses, &str); 7] = [
            (Responses::ENTER_STATE, "ENTER_STATE"),
            (Responses::EXIT_STATE, "EXIT_STATE"),
            (Responses::UPDATE_STATE, "UPDATE_STATE"),
            (Responses::ENTER_SUBSTATE, "ENTER_SUBSTATE"),
            (Responses::EXIT_SUBSTATE, "EXIT_SUBSTATE"),
            (Responses::UPDATE_SUBSTATE, "UPDATE_SUBSTATE"),
            (Responses::UPDATE_MACHINE, "UPDATE_MACHINE"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Responses({})", set.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_map_to_layer_bits() {
        let state = Layer::State(StateId(1));
        let sub = Layer::Substate(StateId(1), SubstateId(0));
        assert_eq!(Responses::for_hook(state, Hook::Enter), Responses::ENTER_STATE);
        assert_eq!(Responses::for_hook(sub, Hook::Exit), Responses::EXIT_SUBSTATE);
        assert_eq!(
            Responses::for_hook(Layer::Global, Hook::Update),
            Responses::UPDATE_MACHINE
        );
        assert!(Responses::for_hook(Layer::Global, Hook::Enter).is_empty());
    }

    #[test]
    fn masking_keeps_only_requested_groups() {
        let mut mask = Responses::ENTER_STATE | Responses::UPDATE_SUBSTATE | Responses::MACHINE;
        mask &= Responses::STATE | Responses::MACHINE;
        assert!(mask.contains(Responses::ENTER_STATE));
        assert!(mask.contains(Responses::UPDATE_MACHINE));
        assert!(!mask.intersects(Responses::SUBSTATE));
    }

    #[test]
    fn layer_accessors() {
        let sub = Layer::Substate(StateId(2), SubstateId(5));
        assert_eq!(sub.state(), Some(StateId(2)));
        assert_eq!(sub.substate(), Some(SubstateId(5)));
        assert!(Layer::Global.is_global());
        assert_eq!(Layer::Global.state(), None);
    }

    #[test]
    fn debug_lists_set_bits() {
        let mask = Responses::ENTER_STATE | Responses::UPDATE_MACHINE;
        assert_eq!(format!("{mask:?}"), "Responses(ENTER_STATE | UPDATE_MACHINE)");
    }
}
