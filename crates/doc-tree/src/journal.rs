use std::cell::RefCell;
use std::rc::Rc;

use crate::node::Node;
use crate::Cell;

/// Undo/redo journal shared across a document.
///
/// Cloning a `Journal` clones the handle. Mutating node operations that
/// receive a journal record inverse-capable actions into the open
/// transaction; [`undo`](Journal::undo) and [`redo`](Journal::redo) replay
/// one transaction at a time. Replayed mutations fire listener events like
/// first-hand mutations but are never re-recorded.
#[derive(Clone, Default)]
pub struct Journal {
    inner: Rc<RefCell<JournalInner>>,
}

#[derive(Default)]
struct JournalInner {
    undo: Vec<Transaction>,
    redo: Vec<Transaction>,
    open: Option<Transaction>,
    replaying: bool,
}

#[derive(Default)]
struct Transaction {
    actions: Vec<JournalAction>,
}

pub(crate) enum JournalAction {
    Property {
        node: Node,
        key: String,
        previous: Option<Cell>,
        next: Option<Cell>,
    },
    InsertChild {
        parent: Node,
        child: Node,
        index: usize,
    },
    RemoveChild {
        parent: Node,
        child: Node,
        index: usize,
    },
    MoveChild {
        parent: Node,
        from: usize,
        to: usize,
    },
}

/// Clears the replay flag on every exit path, including listener panics.
struct ReplayGuard {
    inner: Rc<RefCell<JournalInner>>,
}

impl Drop for ReplayGuard {
    fn drop(&mut self) {
        self.inner.borrow_mut().replaying = false;
    }
}

impl Journal {
    pub fn new() -> Journal {
        Journal::default()
    }

    /// Seals the open transaction so subsequent actions start a new one.
    pub fn begin_transaction(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(txn) = inner.open.take() {
            if !txn.actions.is_empty() {
                inner.undo.push(txn);
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        let inner = self.inner.borrow();
        inner.open.as_ref().is_some_and(|t| !t.actions.is_empty()) || !inner.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.inner.borrow().redo.is_empty()
    }

    /// Reverts the most recent transaction (sealing the open one first).
    /// Returns `false` when there is nothing to undo or a replay is already
    /// in flight.
    pub fn undo(&self) -> bool {
        self.begin_transaction();
        let txn = {
            let mut inner = self.inner.borrow_mut();
            if inner.replaying {
                return false;
            }
            let Some(txn) = inner.undo.pop() else {
                return false;
            };
            inner.replaying = true;
            txn
        };
        let _guard = ReplayGuard {
            inner: Rc::clone(&self.inner),
        };
        for action in txn.actions.iter().rev() {
            action.revert();
        }
        self.inner.borrow_mut().redo.push(txn);
        true
    }

    /// Re-applies the most recently undone transaction.
    pub fn redo(&self) -> bool {
        let txn = {
            let mut inner = self.inner.borrow_mut();
            if inner.replaying {
                return false;
            }
            let Some(txn) = inner.redo.pop() else {
                return false;
            };
            inner.replaying = true;
            txn
        };
        let _guard = ReplayGuard {
            inner: Rc::clone(&self.inner),
        };
        for action in &txn.actions {
            action.apply();
        }
        self.inner.borrow_mut().undo.push(txn);
        true
    }

    /// Drops all recorded history.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.open = None;
        inner.undo.clear();
        inner.redo.clear();
    }

    pub(crate) fn record(&self, action: JournalAction) {
        let mut inner = self.inner.borrow_mut();
        if inner.replaying {
            return;
        }
        inner.redo.clear();
        inner
            .open
            .get_or_insert_with(Transaction::default)
            .actions
            .push(action);
    }
}

impl JournalAction {
    fn revert(&self) {
        match self {
            JournalAction::Property {
                node,
                key,
                previous,
                ..
            } => match previous {
                Some(value) => node.set_property(key, value.clone(), None),
                None => node.remove_property(key, None),
            },
            JournalAction::InsertChild { parent, index, .. } => {
                parent.remove_child_at(*index, None);
            }
            JournalAction::RemoveChild {
                parent,
                child,
                index,
            } => {
                parent.insert_child(*index, child.clone(), None);
            }
            JournalAction::MoveChild { parent, from, to } => {
                parent.move_child(*to, *from, None);
            }
        }
    }

    fn apply(&self) {
        match self {
            JournalAction::Property {
                node, key, next, ..
            } => match next {
                Some(value) => node.set_property(key, value.clone(), None),
                None => node.remove_property(key, None),
            },
            JournalAction::InsertChild {
                parent,
                child,
                index,
            } => {
                parent.insert_child(*index, child.clone(), None);
            }
            JournalAction::RemoveChild { parent, index, .. } => {
                parent.remove_child_at(*index, None);
            }
            JournalAction::MoveChild { parent, from, to } => {
                parent.move_child(*from, *to, None);
            }
        }
    }
}
