//! Bounded stack of previously active states.
//!
//! Every full state change pushes the outgoing state; `pop_state` returns to
//! the most recent entry. Once the stack is at capacity the oldest entry is
//! evicted, so a long chain of changes only remembers its tail.

use super::ids::StateId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of prior states remembered per machine.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Ordered, bounded history of prior states (oldest first).
///
/// # Example
///
/// ```rust
/// use actorstack::core::{StateId, StateStack};
///
/// let mut stack = StateStack::new(2);
/// stack.push(StateId(0));
/// stack.push(StateId(1));
/// let evicted = stack.push(StateId(2));
///
/// assert_eq!(evicted, Some(StateId(0)));
/// assert_eq!(stack.pop(), Some(StateId(2)));
/// assert_eq!(stack.pop(), Some(StateId(1)));
/// assert_eq!(stack.pop(), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStack {
    entries: VecDeque<StateId>,
    capacity: usize,
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl StateStack {
    /// Create an empty stack. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Push `state`, returning the evicted oldest entry if capacity was exceeded.
    pub fn push(&mut self, state: StateId) -> Option<StateId> {
        self.entries.push_back(state);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn pop(&mut self) -> Option<StateId> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<StateId> {
        self.entries.back().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries from oldest to most recent.
    pub fn iter(&self) -> impl Iterator<Item = StateId> + '_ {
        self.entries.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<StateId> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stack_is_empty() {
        let stack = StateStack::default();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(stack.peek(), None);
    }

    #[test]
    fn pop_returns_most_recent_first() {
        let mut stack = StateStack::default();
        stack.push(StateId(1));
        stack.push(StateId(2));
        assert_eq!(stack.peek(), Some(StateId(2)));
        assert_eq!(stack.pop(), Some(StateId(2)));
        assert_eq!(stack.pop(), Some(StateId(1)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn eleventh_push_evicts_oldest() {
        let mut stack = StateStack::default();
        for i in 0..10 {
            assert_eq!(stack.push(StateId(i)), None);
        }
        assert_eq!(stack.push(StateId(10)), Some(StateId(0)));
        assert_eq!(stack.len(), 10);
        assert_eq!(stack.to_vec().first(), Some(&StateId(1)));
        assert_eq!(stack.to_vec().last(), Some(&StateId(10)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut stack = StateStack::new(0);
        assert_eq!(stack.capacity(), 1);
        stack.push(StateId(1));
        assert_eq!(stack.push(StateId(2)), Some(StateId(1)));
    }

    #[test]
    fn stack_serializes_correctly() {
        let mut stack = StateStack::new(3);
        stack.push(StateId(4));
        let json = serde_json::to_string(&stack).unwrap();
        let back: StateStack = serde_json::from_str(&json).unwrap();
        assert_eq!(stack, back);
    }
}
