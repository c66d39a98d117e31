//! Deferred structural changes.
//!
//! Machines never touch the queue that owns them. A structural request made
//! from a handler is parked on the [`ChangeBoard`] shared by the manager and
//! every machine it owns, and is applied on the manager's next resolution
//! pass, after every dispatch has returned.

use crate::core::{QueueId, QueueSelector};
use crate::enforcement::MachineError;
use crate::machine::StateMachine;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Kind of a pending structural change, for introspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Reset,
    Replace,
    Queue,
    Requeue,
    Push,
    Pop,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Reset => "reset",
            ChangeKind::Replace => "replace",
            ChangeKind::Queue => "queue",
            ChangeKind::Requeue => "requeue",
            ChangeKind::Push => "push",
            ChangeKind::Pop => "pop",
        };
        f.write_str(name)
    }
}

/// A structural change waiting for the next resolution pass, owning the
/// machine it installs, if any.
pub(crate) enum StructuralChange {
    Reset,
    Replace(StateMachine),
    Queue(StateMachine),
    Requeue,
    Push(StateMachine),
    Pop,
}

impl StructuralChange {
    pub(crate) fn kind(&self) -> ChangeKind {
        match self {
            StructuralChange::Reset => ChangeKind::Reset,
            StructuralChange::Replace(_) => ChangeKind::Replace,
            StructuralChange::Queue(_) => ChangeKind::Queue,
            StructuralChange::Requeue => ChangeKind::Requeue,
            StructuralChange::Push(_) => ChangeKind::Push,
            StructuralChange::Pop => ChangeKind::Pop,
        }
    }
}

/// One pending-change slot per queue plus the queue depths machines may read.
pub(crate) struct ChangeBoard {
    pending: Vec<Option<StructuralChange>>,
    depths: Vec<usize>,
    deletions: Vec<QueueSelector>,
}

impl ChangeBoard {
    pub(crate) fn new(queue_count: usize) -> Self {
        Self {
            pending: (0..queue_count).map(|_| None).collect(),
            depths: vec![0; queue_count],
            deletions: Vec::new(),
        }
    }

    /// Park `change` for `queue`. At most one change per queue may wait.
    pub(crate) fn request(
        &mut self,
        queue: QueueId,
        change: StructuralChange,
    ) -> Result<(), MachineError> {
        let count = self.pending.len();
        let slot = self
            .pending
            .get_mut(queue.0)
            .ok_or(MachineError::QueueOutOfRange { queue, count })?;
        if slot.is_some() {
            return Err(MachineError::DuplicateStructuralRequest { queue });
        }
        *slot = Some(change);
        Ok(())
    }

    pub(crate) fn take(&mut self, queue: QueueId) -> Option<StructuralChange> {
        self.pending.get_mut(queue.0).and_then(Option::take)
    }

    pub(crate) fn pending_kind(&self, queue: QueueId) -> Option<ChangeKind> {
        self.pending
            .get(queue.0)
            .and_then(|slot| slot.as_ref().map(StructuralChange::kind))
    }

    pub(crate) fn depth(&self, queue: QueueId) -> usize {
        self.depths.get(queue.0).copied().unwrap_or(0)
    }

    pub(crate) fn set_depth(&mut self, queue: QueueId, depth: usize) {
        if let Some(slot) = self.depths.get_mut(queue.0) {
            *slot = depth;
        }
    }

    pub(crate) fn request_deletion(&mut self, queues: QueueSelector) {
        self.deletions.push(queues);
    }

    pub(crate) fn take_deletions(&mut self) -> Vec<QueueSelector> {
        std::mem::take(&mut self.deletions)
    }
}

/// A machine's handle back to the queue that owns it.
#[derive(Clone)]
pub(crate) struct ManagerLink {
    pub(crate) queue: QueueId,
    pub(crate) board: Rc<RefCell<ChangeBoard>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_change_per_queue() {
        let mut board = ChangeBoard::new(2);
        board.request(QueueId(0), StructuralChange::Reset).unwrap();
        board.request(QueueId(1), StructuralChange::Pop).unwrap();

        assert_eq!(
            board.request(QueueId(0), StructuralChange::Requeue),
            Err(MachineError::DuplicateStructuralRequest { queue: QueueId(0) })
        );
        assert_eq!(board.pending_kind(QueueId(0)), Some(ChangeKind::Reset));

        assert!(matches!(board.take(QueueId(0)), Some(StructuralChange::Reset)));
        assert_eq!(board.pending_kind(QueueId(0)), None);
        board.request(QueueId(0), StructuralChange::Requeue).unwrap();
    }

    #[test]
    fn out_of_range_queue_is_rejected() {
        let mut board = ChangeBoard::new(1);
        assert_eq!(
            board.request(QueueId(3), StructuralChange::Reset),
            Err(MachineError::QueueOutOfRange {
                queue: QueueId(3),
                count: 1
            })
        );
        assert_eq!(board.depth(QueueId(3)), 0);
    }

    #[test]
    fn deletions_drain_once() {
        let mut board = ChangeBoard::new(2);
        board.request_deletion(QueueSelector::All);
        assert_eq!(board.take_deletions(), vec![QueueSelector::All]);
        assert!(board.take_deletions().is_empty());
    }
}
