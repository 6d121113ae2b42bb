use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::node::{Node, NodeInner};

/// Mutation notification delivered to [`Node::subscribe`] callbacks.
///
/// Attach/detach produces two events: `ChildAdded`/`ChildRemoved` on the
/// parent and `ParentChanged` on the child. `Redirected` is delivered once,
/// to registrations being migrated away by [`Node::redirect`].
#[derive(Clone, Debug)]
pub enum TreeEvent {
    PropertyChanged {
        node: Node,
        key: String,
    },
    ChildAdded {
        parent: Node,
        child: Node,
        index: usize,
    },
    ChildRemoved {
        parent: Node,
        child: Node,
        index: usize,
    },
    ChildOrderChanged {
        parent: Node,
        old_index: usize,
        new_index: usize,
    },
    ParentChanged {
        node: Node,
    },
    Redirected {
        node: Node,
    },
}

/// Identifies one listener registration on one node, for exclusion in
/// [`Node::set_property_excluding`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(pub(crate) u64);

pub(crate) struct ListenerEntry {
    pub(crate) id: u64,
    pub(crate) callback: Rc<RefCell<dyn FnMut(&TreeEvent)>>,
}

impl Clone for ListenerEntry {
    fn clone(&self) -> Self {
        ListenerEntry {
            id: self.id,
            callback: Rc::clone(&self.callback),
        }
    }
}

#[derive(Default)]
pub(crate) struct ListenerSet {
    pub(crate) next_id: u64,
    pub(crate) entries: Vec<ListenerEntry>,
}

/// RAII handle for one listener registration; dropping it unregisters.
pub struct Subscription {
    pub(crate) node: Weak<NodeInner>,
    pub(crate) id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.node.upgrade() {
            inner
                .listeners
                .borrow_mut()
                .entries
                .retain(|entry| entry.id != self.id.0);
        }
    }
}
