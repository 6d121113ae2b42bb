use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::events::{ListenerEntry, ListenerId, ListenerSet, Subscription, TreeEvent};
use crate::journal::{Journal, JournalAction};
use crate::Cell;

/// Shared handle to one node of the document tree.
///
/// Cloning a `Node` clones the handle, never the node; equality is handle
/// identity. A handle keeps its node alive, so every `Node` that exists is
/// live — "no node" is expressed as `Option<Node>` at API boundaries.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Rc<NodeInner>,
}

pub(crate) struct NodeInner {
    tag: String,
    data: RefCell<NodeData>,
    pub(crate) listeners: RefCell<ListenerSet>,
}

struct NodeData {
    props: Vec<(String, Cell)>,
    children: Vec<Node>,
    parent: Weak<NodeInner>,
}

impl Node {
    /// Creates a detached node carrying `tag`. An empty tag is a programming
    /// error.
    pub fn new(tag: &str) -> Node {
        debug_assert!(!tag.is_empty(), "node tag must not be empty");
        Node {
            inner: Rc::new(NodeInner {
                tag: tag.to_owned(),
                data: RefCell::new(NodeData {
                    props: Vec::new(),
                    children: Vec::new(),
                    parent: Weak::new(),
                }),
                listeners: RefCell::new(ListenerSet::default()),
            }),
        }
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .data
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Node { inner })
    }

    /// `true` when `parent` is this node's direct parent.
    pub fn is_child_of(&self, parent: &Node) -> bool {
        self.parent().is_some_and(|p| p == *parent)
    }

    /// `true` when `ancestor` appears anywhere on the parent chain.
    pub fn is_descendant_of(&self, ancestor: &Node) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if node == *ancestor {
                return true;
            }
            current = node.parent();
        }
        false
    }

    // ---- properties -------------------------------------------------------

    pub fn has_property(&self, key: &str) -> bool {
        self.inner
            .data
            .borrow()
            .props
            .iter()
            .any(|(k, _)| k == key)
    }

    pub fn property(&self, key: &str) -> Option<Cell> {
        self.inner
            .data
            .borrow()
            .props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn property_count(&self) -> usize {
        self.inner.data.borrow().props.len()
    }

    /// Snapshot of the properties in declaration order.
    pub fn property_keys(&self) -> Vec<String> {
        let data = self.inner.data.borrow();
        data.props.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn properties(&self) -> Vec<(String, Cell)> {
        self.inner.data.borrow().props.clone()
    }

    pub fn set_property(&self, key: &str, value: Cell, journal: Option<&Journal>) {
        self.set_property_impl(key, value, journal, None);
    }

    /// Like [`set_property`](Node::set_property), but the identified listener
    /// registration is skipped when the change is dispatched. Used by caches
    /// that write back a corrected value from inside their own reaction.
    pub fn set_property_excluding(
        &self,
        exclude: ListenerId,
        key: &str,
        value: Cell,
        journal: Option<&Journal>,
    ) {
        self.set_property_impl(key, value, journal, Some(exclude));
    }

    fn set_property_impl(
        &self,
        key: &str,
        value: Cell,
        journal: Option<&Journal>,
        exclude: Option<ListenerId>,
    ) {
        debug_assert!(!key.is_empty(), "property key must not be empty");
        let previous = {
            let mut data = self.inner.data.borrow_mut();
            match data.props.iter_mut().find(|(k, _)| k == key) {
                Some((_, stored)) => {
                    if *stored == value {
                        return;
                    }
                    Some(std::mem::replace(stored, value.clone()))
                }
                None => {
                    data.props.push((key.to_owned(), value.clone()));
                    None
                }
            }
        };
        if let Some(journal) = journal {
            journal.record(JournalAction::Property {
                node: self.clone(),
                key: key.to_owned(),
                previous,
                next: Some(value),
            });
        }
        self.notify(
            &TreeEvent::PropertyChanged {
                node: self.clone(),
                key: key.to_owned(),
            },
            exclude,
        );
    }

    pub fn remove_property(&self, key: &str, journal: Option<&Journal>) {
        let previous = {
            let mut data = self.inner.data.borrow_mut();
            match data.props.iter().position(|(k, _)| k == key) {
                Some(index) => data.props.remove(index).1,
                None => return,
            }
        };
        if let Some(journal) = journal {
            journal.record(JournalAction::Property {
                node: self.clone(),
                key: key.to_owned(),
                previous: Some(previous),
                next: None,
            });
        }
        self.notify(
            &TreeEvent::PropertyChanged {
                node: self.clone(),
                key: key.to_owned(),
            },
            None,
        );
    }

    // ---- children ---------------------------------------------------------

    pub fn child_count(&self) -> usize {
        self.inner.data.borrow().children.len()
    }

    pub fn child(&self, index: usize) -> Option<Node> {
        self.inner.data.borrow().children.get(index).cloned()
    }

    /// Snapshot of the children in tree order.
    pub fn children(&self) -> Vec<Node> {
        self.inner.data.borrow().children.clone()
    }

    pub fn index_of(&self, child: &Node) -> Option<usize> {
        self.inner
            .data
            .borrow()
            .children
            .iter()
            .position(|c| c == child)
    }

    /// First child carrying `tag`, in tree order.
    pub fn child_with_tag(&self, tag: &str) -> Option<Node> {
        self.inner
            .data
            .borrow()
            .children
            .iter()
            .find(|c| c.tag() == tag)
            .cloned()
    }

    /// First child carrying `tag`, appending a fresh one when none exists.
    pub fn get_or_create_child_with_tag(&self, tag: &str, journal: Option<&Journal>) -> Node {
        if let Some(child) = self.child_with_tag(tag) {
            return child;
        }
        let child = Node::new(tag);
        self.append_child(child.clone(), journal);
        child
    }

    pub fn append_child(&self, child: Node, journal: Option<&Journal>) {
        let index = self.child_count();
        self.insert_child(index, child, journal);
    }

    /// Inserts `child` at `index` (clamped to the child count). The child
    /// must be detached and must not be an ancestor of this node; both are
    /// programming errors and the call is ignored in release builds.
    pub fn insert_child(&self, index: usize, child: Node, journal: Option<&Journal>) {
        debug_assert!(child.parent().is_none(), "child already has a parent");
        debug_assert!(
            child != *self && !self.is_descendant_of(&child),
            "inserting a child would create a cycle"
        );
        if child.parent().is_some() || child == *self || self.is_descendant_of(&child) {
            return;
        }
        let index = {
            let mut data = self.inner.data.borrow_mut();
            let index = index.min(data.children.len());
            data.children.insert(index, child.clone());
            index
        };
        child.inner.data.borrow_mut().parent = Rc::downgrade(&self.inner);
        if let Some(journal) = journal {
            journal.record(JournalAction::InsertChild {
                parent: self.clone(),
                child: child.clone(),
                index,
            });
        }
        self.notify(
            &TreeEvent::ChildAdded {
                parent: self.clone(),
                child: child.clone(),
                index,
            },
            None,
        );
        child.notify(&TreeEvent::ParentChanged { node: child.clone() }, None);
    }

    /// Detaches `child` and returns `true` when it was a child of this node.
    pub fn remove_child(&self, child: &Node, journal: Option<&Journal>) -> bool {
        match self.index_of(child) {
            Some(index) => self.remove_child_at(index, journal).is_some(),
            None => false,
        }
    }

    pub fn remove_child_at(&self, index: usize, journal: Option<&Journal>) -> Option<Node> {
        let child = {
            let mut data = self.inner.data.borrow_mut();
            if index >= data.children.len() {
                return None;
            }
            data.children.remove(index)
        };
        child.inner.data.borrow_mut().parent = Weak::new();
        if let Some(journal) = journal {
            journal.record(JournalAction::RemoveChild {
                parent: self.clone(),
                child: child.clone(),
                index,
            });
        }
        self.notify(
            &TreeEvent::ChildRemoved {
                parent: self.clone(),
                child: child.clone(),
                index,
            },
            None,
        );
        child.notify(&TreeEvent::ParentChanged { node: child.clone() }, None);
        Some(child)
    }

    pub fn move_child(&self, from: usize, to: usize, journal: Option<&Journal>) {
        {
            let mut data = self.inner.data.borrow_mut();
            if from == to || from >= data.children.len() || to >= data.children.len() {
                return;
            }
            let child = data.children.remove(from);
            data.children.insert(to, child);
        }
        if let Some(journal) = journal {
            journal.record(JournalAction::MoveChild {
                parent: self.clone(),
                from,
                to,
            });
        }
        self.notify(
            &TreeEvent::ChildOrderChanged {
                parent: self.clone(),
                old_index: from,
                new_index: to,
            },
            None,
        );
    }

    /// Sorts the children in place. The reorder is expressed as a sequence of
    /// journaled single-child moves so observers receive one order-changed
    /// event per displaced child.
    pub fn sort_children<F>(&self, mut cmp: F, journal: Option<&Journal>, stable: bool)
    where
        F: FnMut(&Node, &Node) -> Ordering,
    {
        let mut target = self.children();
        if stable {
            target.sort_by(&mut cmp);
        } else {
            target.sort_unstable_by(&mut cmp);
        }
        for (position, node) in target.iter().enumerate() {
            let current = self.index_of(node);
            if let Some(index) = current {
                if index != position {
                    self.move_child(index, position, journal);
                }
            }
        }
    }

    // ---- whole-subtree operations -----------------------------------------

    /// Recursively clones this subtree into fresh detached nodes. Listener
    /// registrations do not travel with the clone.
    pub fn deep_clone(&self) -> Node {
        let clone = Node::new(self.tag());
        let src = self.inner.data.borrow();
        {
            let mut dst = clone.inner.data.borrow_mut();
            dst.props = src.props.clone();
        }
        for child in &src.children {
            let child_clone = child.deep_clone();
            child_clone.inner.data.borrow_mut().parent = Rc::downgrade(&clone.inner);
            clone.inner.data.borrow_mut().children.push(child_clone);
        }
        clone
    }

    /// Replaces this node's properties and children with deep copies of
    /// `source`'s. Every step is journaled and observable individually.
    pub fn copy_from(&self, source: &Node, journal: Option<&Journal>) {
        if self == source {
            return;
        }
        let source_props = source.properties();
        let stale: Vec<String> = self
            .property_keys()
            .into_iter()
            .filter(|k| !source_props.iter().any(|(sk, _)| sk == k))
            .collect();
        for key in stale {
            self.remove_property(&key, journal);
        }
        for (key, value) in source_props {
            self.set_property(&key, value, journal);
        }
        for _ in 0..self.child_count() {
            let last = self.child_count().saturating_sub(1);
            if self.remove_child_at(last, journal).is_none() {
                break;
            }
        }
        for child in source.children() {
            self.append_child(child.deep_clone(), journal);
        }
    }

    // ---- listeners --------------------------------------------------------

    /// Registers a callback for events on this node (no ancestor
    /// propagation). The registration lives as long as the returned
    /// [`Subscription`].
    ///
    /// Dispatch is synchronous over a snapshot of the registrations, so a
    /// listener may freely mutate the tree or the listener set; a
    /// registration whose callback is already on the stack is skipped
    /// instead of re-entered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&TreeEvent) + 'static,
    {
        let mut set = self.inner.listeners.borrow_mut();
        let id = set.next_id;
        set.next_id += 1;
        set.entries.push(ListenerEntry {
            id,
            callback: Rc::new(RefCell::new(callback)),
        });
        Subscription {
            node: Rc::downgrade(&self.inner),
            id: ListenerId(id),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().entries.len()
    }

    /// Explicit redirection transition: every listener registered on this
    /// node receives `Redirected { node: target }` and is then dropped.
    /// Consumers recover by fully re-binding against `target`, which
    /// re-registers them there.
    pub fn redirect(&self, target: &Node) {
        let entries: Vec<ListenerEntry> =
            self.inner.listeners.borrow_mut().entries.drain(..).collect();
        let event = TreeEvent::Redirected {
            node: target.clone(),
        };
        for entry in entries {
            if let Ok(mut callback) = entry.callback.try_borrow_mut() {
                callback(&event);
            }
        }
    }

    pub(crate) fn notify(&self, event: &TreeEvent, exclude: Option<ListenerId>) {
        let entries: Vec<ListenerEntry> = self.inner.listeners.borrow().entries.clone();
        for entry in entries {
            if exclude.is_some_and(|id| id.0 == entry.id) {
                continue;
            }
            if let Ok(mut callback) = entry.callback.try_borrow_mut() {
                callback(event);
            }
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.borrow();
        f.debug_struct("Node")
            .field("tag", &self.inner.tag)
            .field("props", &data.props.len())
            .field("children", &data.children.len())
            .finish()
    }
}
