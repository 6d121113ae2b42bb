use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use doc_tree::{Journal, Node, Subscription, TreeEvent};

use crate::guard::Flag;
use crate::typed_node::{NodeWrapper, TypedNode};

/// Ordered collection of wrapped children, kept in lock-step with the
/// parent node's children of one tag.
///
/// The owned sequence always mirrors the count and order of the parent's
/// children carrying the bound child tag, whether a mutation came through
/// this list, through raw tree edits elsewhere, or through undo/redo.
/// Elements are exclusively owned; dropping the list drops the wrappers but
/// never the underlying nodes.
pub struct ObservedChildList<T: NodeWrapper + Default> {
    state: Rc<RefCell<ListState<T>>>,
}

struct ListState<T> {
    binding: TypedNode,
    child_tag: Option<String>,
    items: Vec<T>,
    subscription: Option<Subscription>,
    guard: Flag,
}

impl<T: NodeWrapper + Default + 'static> Default for ObservedChildList<T> {
    fn default() -> Self {
        ObservedChildList::new()
    }
}

impl<T: NodeWrapper + Default + 'static> ObservedChildList<T> {
    /// Constructs an unbound list; call [`wrap`](ObservedChildList::wrap)
    /// to bind it.
    pub fn new() -> ObservedChildList<T> {
        ObservedChildList {
            state: Rc::new(RefCell::new(ListState {
                binding: TypedNode::new(),
                child_tag: None,
                items: Vec::new(),
                subscription: None,
                guard: Flag::new(),
            })),
        }
    }

    /// Binds to `(parent, child_tag)`, resolving the parent via the wrap
    /// protocol with creation and child search enabled.
    pub fn wrap(
        &mut self,
        target: Option<&Node>,
        parent_tag: &str,
        child_tag: &str,
        journal: Option<&Journal>,
    ) -> bool {
        self.wrap_with(target, parent_tag, child_tag, journal, true, true)
    }

    /// Full wrap: resolves the parent via [`TypedNode::bind`], rebuilds the
    /// owned sequence from the parent's matching children in tree order,
    /// then registers the structural listener (after the rebuild, so the
    /// initial pass never observes its own work).
    pub fn wrap_with(
        &mut self,
        target: Option<&Node>,
        parent_tag: &str,
        child_tag: &str,
        journal: Option<&Journal>,
        allow_create: bool,
        allow_child_search: bool,
    ) -> bool {
        debug_assert!(!child_tag.is_empty(), "child tag must not be empty");
        let bound = {
            let mut state = self.state.borrow_mut();
            state.subscription = None;
            state.items.clear();
            state.child_tag = Some(child_tag.to_owned());
            state
                .binding
                .bind(target, parent_tag, journal, allow_create, allow_child_search)
        };
        if bound {
            Self::rebuild(&self.state);
            Self::listen(&self.state);
        }
        bound
    }

    pub fn is_valid(&self) -> bool {
        let state = self.state.borrow();
        state.binding.is_valid() && state.child_tag.is_some()
    }

    pub fn parent_node(&self) -> Option<Node> {
        self.state.borrow().binding.node().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.state.borrow(), |state| state.items.get(index)).ok()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.state.borrow_mut(), |state| state.items.get_mut(index)).ok()
    }

    pub fn first(&self) -> Option<Ref<'_, T>> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Ref<'_, T>> {
        let len = self.len();
        if len == 0 {
            None
        } else {
            self.get(len - 1)
        }
    }

    /// Underlying node of the element at `index`.
    pub fn node_at(&self, index: usize) -> Option<Node> {
        self.state
            .borrow()
            .items
            .get(index)
            .and_then(|item| item.typed_node().node().cloned())
    }

    /// Underlying nodes of all elements, in sequence order.
    pub fn nodes(&self) -> Vec<Node> {
        self.state
            .borrow()
            .items
            .iter()
            .filter_map(|item| item.typed_node().node().cloned())
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for item in &self.state.borrow().items {
            f(item);
        }
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for item in &mut self.state.borrow_mut().items {
            f(item);
        }
    }

    /// Takes ownership of `item`, binding it to a freshly appended child
    /// node when it is not yet bound. Calling `add` on an unbound list is a
    /// programming error.
    pub fn add(&mut self, mut item: T) {
        let (parent, tag, journal, guard) = {
            let state = self.state.borrow();
            let parent = state.binding.node().cloned();
            let tag = state.child_tag.clone();
            (
                parent,
                tag,
                state.binding.journal().cloned(),
                state.guard.clone(),
            )
        };
        let (Some(parent), Some(tag)) = (parent, tag) else {
            debug_assert!(false, "add on an unbound list");
            return;
        };
        // The appended child is integrated by this call directly; the
        // structural listener must not double-add it.
        let _guard = guard.scoped_set();
        if !item.is_valid() {
            let child = Node::new(&tag);
            parent.append_child(child.clone(), journal.as_ref());
            item.wrap_with(Some(&child), &tag, journal.as_ref(), false, false);
        } else if let Some(node) = item.typed_node().node() {
            debug_assert!(
                node.tag() == tag,
                "added item is bound to a node of a different tag"
            );
            // The item's node must be detached or already under this parent;
            // anything else would desynchronize the sequence.
            let attached_elsewhere = node.parent().is_some_and(|p| p != parent);
            debug_assert!(!attached_elsewhere, "added item belongs to another parent");
            if attached_elsewhere {
                return;
            }
            if node.parent().is_none() {
                parent.append_child(node.clone(), journal.as_ref());
            }
        }
        self.state.borrow_mut().items.push(item);
    }

    /// Removes the element at `index`, detaching its node from the parent
    /// (journaled) and dropping the wrapper. Index 0 is an ordinary hit;
    /// only an out-of-range index is a programming error.
    pub fn remove_at(&mut self, index: usize) -> bool {
        let (parent, node, journal, guard) = {
            let state = self.state.borrow();
            let Some(item) = state.items.get(index) else {
                debug_assert!(false, "remove of an element not in the list");
                return false;
            };
            (
                state.binding.node().cloned(),
                item.typed_node().node().cloned(),
                state.binding.journal().cloned(),
                state.guard.clone(),
            )
        };
        let Some(parent) = parent else {
            return false;
        };
        let _guard = guard.scoped_set();
        if let Some(node) = node {
            if let Some(engine_index) = parent.index_of(&node) {
                parent.remove_child_at(engine_index, journal.as_ref());
            }
        }
        self.state.borrow_mut().items.remove(index);
        true
    }

    /// Removes the element wrapping `node`. Returns `false` (a programming
    /// error) when no element wraps it.
    pub fn remove_node(&mut self, node: &Node) -> bool {
        let index = self
            .state
            .borrow()
            .items
            .iter()
            .position(|item| item.typed_node().node() == Some(node));
        match index {
            Some(index) => self.remove_at(index),
            None => {
                debug_assert!(false, "remove of a node not in the list");
                false
            }
        }
    }

    /// Detaches every matching child from the parent (journaled). The owned
    /// sequence empties through the structural reactions.
    pub fn clear(&mut self) {
        let (parent, tag, journal) = {
            let state = self.state.borrow();
            (
                state.binding.node().cloned(),
                state.child_tag.clone(),
                state.binding.journal().cloned(),
            )
        };
        if let (Some(parent), Some(tag)) = (parent, tag) {
            for child in parent.children() {
                if child.tag() == tag {
                    parent.remove_child(&child, journal.as_ref());
                }
            }
        }
        self.state.borrow_mut().items.clear();
    }

    /// Delegates ordering to the engine's in-place child sort (journaled).
    /// The owned sequence follows through the order-changed reactions, not
    /// by sorting the sequence directly.
    pub fn sort<F>(&mut self, cmp: F, stable: bool)
    where
        F: FnMut(&Node, &Node) -> std::cmp::Ordering,
    {
        let (parent, journal) = {
            let state = self.state.borrow();
            (
                state.binding.node().cloned(),
                state.binding.journal().cloned(),
            )
        };
        if let Some(parent) = parent {
            parent.sort_children(cmp, journal.as_ref(), stable);
        }
    }

    // ---- listener side ----------------------------------------------------

    fn rebuild(state: &Rc<RefCell<ListState<T>>>) {
        let (parent, tag, journal) = {
            let st = state.borrow();
            (
                st.binding.node().cloned(),
                st.child_tag.clone(),
                st.binding.journal().cloned(),
            )
        };
        let (Some(parent), Some(tag)) = (parent, tag) else {
            return;
        };
        let mut items = Vec::new();
        for child in parent.children() {
            if child.tag() == tag {
                items.push(Self::new_item(&child, &tag, journal.as_ref()));
            }
        }
        state.borrow_mut().items = items;
    }

    fn new_item(child: &Node, tag: &str, journal: Option<&Journal>) -> T {
        let mut item = T::default();
        item.wrap_with(Some(child), tag, journal, false, false);
        item
    }

    fn listen(state: &Rc<RefCell<ListState<T>>>) {
        let Some(parent) = state.borrow().binding.node().cloned() else {
            return;
        };
        let weak = Rc::downgrade(state);
        let subscription = parent.subscribe(move |event| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            Self::on_tree_event(&state, event);
        });
        state.borrow_mut().subscription = Some(subscription);
    }

    fn on_tree_event(state: &Rc<RefCell<ListState<T>>>, event: &TreeEvent) {
        match event {
            TreeEvent::ChildAdded {
                parent,
                child,
                index,
            } => Self::on_child_added(state, parent, child, *index),
            TreeEvent::ChildRemoved { parent, child, .. } => {
                Self::on_child_removed(state, parent, child);
            }
            TreeEvent::ChildOrderChanged { parent, .. } => {
                if state.borrow().binding.node() == Some(parent) {
                    Self::resync_order(state);
                }
            }
            TreeEvent::Redirected { node } => Self::on_redirected(state, node),
            _ => {}
        }
    }

    fn on_child_added(state: &Rc<RefCell<ListState<T>>>, parent: &Node, child: &Node, index: usize) {
        let (tag, journal) = {
            let st = state.borrow();
            if st.guard.is_set() || st.binding.node() != Some(parent) {
                return;
            }
            let Some(tag) = st.child_tag.clone() else {
                return;
            };
            if child.tag() != tag {
                return;
            }
            (tag, st.binding.journal().cloned())
        };
        // Position among same-tag siblings, not among all children.
        let position = parent
            .children()
            .iter()
            .take(index)
            .filter(|sibling| sibling.tag() == tag)
            .count();
        let item = Self::new_item(child, &tag, journal.as_ref());
        let mut st = state.borrow_mut();
        let position = position.min(st.items.len());
        st.items.insert(position, item);
    }

    fn on_child_removed(state: &Rc<RefCell<ListState<T>>>, parent: &Node, child: &Node) {
        let mut st = state.borrow_mut();
        if st.guard.is_set() || st.binding.node() != Some(parent) {
            return;
        }
        if let Some(position) = st
            .items
            .iter()
            .position(|item| item.typed_node().node() == Some(child))
        {
            st.items.remove(position);
        }
    }

    /// Reorders the owned sequence to the parent's current tree order,
    /// matching elements by node identity.
    fn resync_order(state: &Rc<RefCell<ListState<T>>>) {
        let (parent, tag) = {
            let st = state.borrow();
            (st.binding.node().cloned(), st.child_tag.clone())
        };
        let (Some(parent), Some(tag)) = (parent, tag) else {
            return;
        };
        let mut st = state.borrow_mut();
        let mut stale = std::mem::take(&mut st.items);
        let mut items = Vec::with_capacity(stale.len());
        for child in parent.children() {
            if child.tag() != tag {
                continue;
            }
            if let Some(position) = stale
                .iter()
                .position(|item| item.typed_node().node() == Some(&child))
            {
                items.push(stale.remove(position));
            }
        }
        items.extend(stale);
        st.items = items;
    }

    /// Redirection of the parent handle is never expected in normal use;
    /// the safe recovery is a full rebind against the new handle.
    fn on_redirected(state: &Rc<RefCell<ListState<T>>>, target: &Node) {
        debug_assert!(false, "child list parent was redirected");
        {
            let mut st = state.borrow_mut();
            st.subscription = None;
            let Some(tag) = st.binding.tag().map(str::to_owned) else {
                return;
            };
            let journal = st.binding.journal().cloned();
            st.binding
                .bind(Some(target), &tag, journal.as_ref(), false, false);
        }
        Self::rebuild(state);
        Self::listen(state);
    }
}
