//! Index-addressed variable storage scoped to a state or substate.
//!
//! A [`SlotStore`] grows on declaration and only ever shrinks through
//! [`SlotStore::clear`], which the transition engine calls when the owning
//! scope is exited. Clearing drops every slot, releasing any handles they hold.

use super::ids::ActorId;
use super::value::{Handle, Value, ValueKind, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifetime a variable is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarScope {
    /// Survives substate changes, cleared on every full state change.
    State,
    /// Cleared on every transition.
    Substate,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot {id} is out of range (declared slots: {len})")]
    OutOfRange { id: usize, len: usize },

    #[error("slot {id} holds {found:?}, expected {expected:?}")]
    TypeMismatch {
        id: usize,
        expected: ValueKind,
        found: ValueKind,
    },
}

#[derive(Debug, Default, Clone)]
pub struct SlotStore {
    slots: Vec<Value>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare slot `id`, growing the store to at least `id + 1` unset slots.
    /// Redeclaring an existing slot keeps its value.
    pub fn declare(&mut self, id: usize) {
        if self.slots.len() <= id {
            self.slots.resize(id + 1, Value::Unset);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn get(&self, id: usize) -> Result<&Value, SlotError> {
        self.slots.get(id).ok_or(SlotError::OutOfRange {
            id,
            len: self.slots.len(),
        })
    }

    pub fn set(&mut self, id: usize, value: impl Into<Value>) -> Result<(), SlotError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(id)
            .ok_or(SlotError::OutOfRange { id, len })?;
        *slot = value.into();
        Ok(())
    }

    pub fn get_int(&self, id: usize) -> Result<i32, SlotError> {
        self.typed(id, ValueKind::Int, Value::as_int)
    }

    pub fn get_float(&self, id: usize) -> Result<f32, SlotError> {
        self.typed(id, ValueKind::Float, Value::as_float)
    }

    pub fn get_bool(&self, id: usize) -> Result<bool, SlotError> {
        self.typed(id, ValueKind::Bool, Value::as_bool)
    }

    /// Unset actor slots read as `None`.
    pub fn get_actor(&self, id: usize) -> Result<Option<ActorId>, SlotError> {
        self.typed(id, ValueKind::Actor, |v| v.as_actor().map(Some))
    }

    /// Unset handle slots read as `None`.
    pub fn get_handle(&self, id: usize) -> Result<Option<Handle>, SlotError> {
        self.typed(id, ValueKind::Handle, |v| v.as_handle().cloned().map(Some))
    }

    pub fn get_vec2(&self, id: usize) -> Result<Vec2, SlotError> {
        self.typed(id, ValueKind::Vec2, Value::as_vec2)
    }

    pub fn get_vec3(&self, id: usize) -> Result<Vec3, SlotError> {
        self.typed(id, ValueKind::Vec3, Value::as_vec3)
    }

    fn typed<T: Default>(
        &self,
        id: usize,
        expected: ValueKind,
        read: impl Fn(&Value) -> Option<T>,
    ) -> Result<T, SlotError> {
        let value = self.get(id)?;
        if value.is_unset() {
            return Ok(T::default());
        }
        read(value).ok_or(SlotError::TypeMismatch {
            id,
            expected,
            found: value.kind(),
        })
    }
}
