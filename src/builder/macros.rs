//! Macros for ergonomic behavior definitions.

/// Generate an enum of state (or substate) names mapped to dense ids.
///
/// Variants are numbered from zero in declaration order, so the first
/// variant of a state enum is the default initial state.
///
/// # Example
///
/// ```
/// use actorstack::core::{StateId, SubstateId};
/// use actorstack::state_ids;
///
/// state_ids! {
///     pub enum Mode: StateId {
///         Roam,
///         Fight,
///     }
/// }
///
/// state_ids! {
///     pub enum Step: SubstateId {
///         Look,
///         Walk,
///     }
/// }
///
/// assert_eq!(StateId::from(Mode::Fight), StateId(1));
/// assert_eq!(Mode::try_from(StateId(0)), Ok(Mode::Roam));
/// assert!(SubstateId(1) == Step::Walk);
/// assert_eq!(Step::Look.name(), "Look");
/// ```
#[macro_export]
macro_rules! state_ids {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $target:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(u32)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $name {
            /// Every variant, in id order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }

        impl ::core::convert::From<$name> for $crate::core::$target {
            fn from(value: $name) -> Self {
                $crate::core::$target(value as u32)
            }
        }

        impl ::core::cmp::PartialEq<$name> for $crate::core::$target {
            fn eq(&self, other: &$name) -> bool {
                self.0 == *other as u32
            }
        }

        impl ::core::convert::TryFrom<$crate::core::$target> for $name {
            type Error = $crate::core::$target;

            fn try_from(id: $crate::core::$target) -> Result<Self, Self::Error> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|variant| *variant as u32 == id.0)
                    .ok_or(id)
            }
        }
    };
}
