use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use doc_tree::{Journal, Node, Subscription, TreeEvent};

use crate::guard::Flag;
use crate::typed_node::NodeWrapper;

/// Owning-pointer-like slot for at most one wrapped child of a given tag.
///
/// The owned wrapper is present iff the slot's occupant node is currently a
/// child of the bound parent. Externally-driven detachment (a raw tree
/// edit, an undo of an add) clears the slot through the occupant's
/// parent-changed notification; re-attachment rebuilds it. Dropping the
/// slot detaches nothing.
pub struct OwningSlot<T: NodeWrapper + Default> {
    state: Rc<RefCell<SlotState<T>>>,
}

struct SlotState<T> {
    parent: Option<Node>,
    occupant: Option<Node>,
    tag: Option<String>,
    journal: Option<Journal>,
    item: Option<T>,
    subscription: Option<Subscription>,
    guard: Flag,
}

impl<T: NodeWrapper + Default + 'static> Default for OwningSlot<T> {
    fn default() -> Self {
        OwningSlot::new()
    }
}

impl<T: NodeWrapper + Default + 'static> OwningSlot<T> {
    /// Constructs an empty, unbound slot; call
    /// [`refer_to`](OwningSlot::refer_to) to bind it.
    pub fn new() -> OwningSlot<T> {
        OwningSlot {
            state: Rc::new(RefCell::new(SlotState {
                parent: None,
                occupant: None,
                tag: None,
                journal: None,
                item: None,
                subscription: None,
                guard: Flag::new(),
            })),
        }
    }

    /// Binds the slot, resolving parent and occupant from `target`:
    /// `target` itself carries `tag` (parent is its parent), or a child of
    /// `target` carries `tag`, or the slot is empty under `target`. The
    /// owned wrapper is then rebuilt from the resolved occupant.
    pub fn refer_to(&mut self, target: &Node, tag: &str, journal: Option<&Journal>) {
        debug_assert!(!tag.is_empty(), "slot tag must not be empty");
        Self::refer_to_state(&self.state, target, tag, journal);
    }

    /// Replaces the occupant.
    ///
    /// `None` detaches the current occupant from the parent (journaled) and
    /// drops the owned wrapper. `Some(item)` binds `item` in place when it
    /// is not yet wrapped (which may create and attach a fresh child),
    /// adopts its node as the occupant — detaching any previous distinct
    /// occupant and appending the new node when it is not yet a child — and
    /// takes exclusive ownership of `item`.
    ///
    /// Calling `reset(Some(..))` before `refer_to` is a programming error.
    pub fn reset(&mut self, item: Option<T>) {
        let guard = self.state.borrow().guard.clone();
        let _guard = guard.scoped_set();
        match item {
            None => {
                let (parent, occupant, journal) = {
                    let st = self.state.borrow();
                    (st.parent.clone(), st.occupant.clone(), st.journal.clone())
                };
                if let (Some(parent), Some(occupant)) = (parent, occupant) {
                    if occupant.is_child_of(&parent) {
                        parent.remove_child(&occupant, journal.as_ref());
                    }
                }
                self.state.borrow_mut().item = None;
            }
            Some(mut item) => {
                let (parent, tag, journal, previous) = {
                    let st = self.state.borrow();
                    (
                        st.parent.clone(),
                        st.tag.clone(),
                        st.journal.clone(),
                        st.occupant.clone(),
                    )
                };
                let (Some(parent), Some(tag)) = (parent, tag) else {
                    debug_assert!(false, "reset requires a preceding refer_to");
                    return;
                };
                if !item.is_valid() {
                    item.wrap(Some(&parent), &tag, journal.as_ref());
                }
                let Some(node) = item.typed_node().node().cloned() else {
                    return;
                };
                if let Some(previous) = previous {
                    if previous != node && previous.is_child_of(&parent) {
                        parent.remove_child(&previous, journal.as_ref());
                    }
                }
                if !node.is_child_of(&parent) && node.parent().is_none() {
                    parent.append_child(node.clone(), journal.as_ref());
                }
                {
                    let mut st = self.state.borrow_mut();
                    st.occupant = Some(node);
                    st.item = Some(item);
                }
                Self::listen(&self.state);
            }
        }
    }

    /// Creates and adopts a fresh occupant bound to the slot.
    pub fn activate(&mut self) {
        self.reset(Some(T::default()));
    }

    /// Detaches and drops the current occupant.
    pub fn deactivate(&mut self) {
        self.reset(None);
    }

    pub fn is_occupied(&self) -> bool {
        self.state.borrow().item.is_some()
    }

    pub fn get(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.state.borrow(), |state| state.item.as_ref()).ok()
    }

    pub fn get_mut(&mut self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.state.borrow_mut(), |state| state.item.as_mut()).ok()
    }

    /// Underlying node of the owned occupant, when one is present.
    pub fn node(&self) -> Option<Node> {
        let state = self.state.borrow();
        state.item.as_ref()?;
        state.occupant.clone()
    }

    pub fn parent_node(&self) -> Option<Node> {
        self.state.borrow().parent.clone()
    }

    // ---- listener side ----------------------------------------------------

    fn refer_to_state(state: &Rc<RefCell<SlotState<T>>>, target: &Node, tag: &str, journal: Option<&Journal>) {
        let guard = state.borrow().guard.clone();
        let _guard = guard.scoped_set();
        {
            let mut st = state.borrow_mut();
            st.subscription = None;
            st.tag = Some(tag.to_owned());
            st.journal = journal.cloned();
            if target.tag() == tag {
                st.parent = target.parent();
                st.occupant = Some(target.clone());
            } else if let Some(child) = target.child_with_tag(tag) {
                st.parent = Some(target.clone());
                st.occupant = Some(child);
            } else {
                st.parent = Some(target.clone());
                st.occupant = None;
            }
        }
        Self::sync_item(state);
        Self::listen(state);
    }

    /// Re-runs the occupant resynchronization step of `refer_to`: the
    /// stored occupant wins while it is still a child of the parent,
    /// otherwise the parent is searched by tag again. The owned wrapper is
    /// rebuilt from the resolution, or dropped on a miss.
    ///
    /// On a miss the occupant handle (and its listener registration) is
    /// kept, so a later re-attach of the same node — e.g. a redo — is
    /// observed.
    fn sync_item(state: &Rc<RefCell<SlotState<T>>>) {
        let (parent, tag, journal, stored) = {
            let st = state.borrow();
            (
                st.parent.clone(),
                st.tag.clone(),
                st.journal.clone(),
                st.occupant.clone(),
            )
        };
        let (Some(parent), Some(tag)) = (parent, tag) else {
            state.borrow_mut().item = None;
            return;
        };
        let resolved = match stored {
            Some(stored) if stored.is_child_of(&parent) => Some(stored),
            _ => parent.child_with_tag(&tag),
        };
        match resolved {
            Some(occupant) => {
                let mut item = T::default();
                item.wrap_with(Some(&occupant), &tag, journal.as_ref(), false, false);
                let mut st = state.borrow_mut();
                st.occupant = Some(occupant);
                st.item = Some(item);
            }
            None => {
                state.borrow_mut().item = None;
            }
        }
    }

    fn listen(state: &Rc<RefCell<SlotState<T>>>) {
        let occupant = state.borrow().occupant.clone();
        let Some(occupant) = occupant else {
            state.borrow_mut().subscription = None;
            return;
        };
        let weak = Rc::downgrade(state);
        let subscription = occupant.subscribe(move |event| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            Self::on_tree_event(&state, event);
        });
        state.borrow_mut().subscription = Some(subscription);
    }

    fn on_tree_event(state: &Rc<RefCell<SlotState<T>>>, event: &TreeEvent) {
        match event {
            TreeEvent::ParentChanged { node } => {
                {
                    let st = state.borrow();
                    if st.guard.is_set() || st.occupant.as_ref() != Some(node) {
                        return;
                    }
                }
                Self::sync_item(state);
                Self::listen(state);
            }
            TreeEvent::Redirected { .. } => {
                if state.borrow().guard.is_set() {
                    return;
                }
                // Never expected in normal use; recover with a full rebind
                // against the stored parent.
                debug_assert!(false, "slot occupant was redirected");
                let (parent, tag, journal) = {
                    let st = state.borrow();
                    (st.parent.clone(), st.tag.clone(), st.journal.clone())
                };
                if let (Some(parent), Some(tag)) = (parent, tag) {
                    Self::refer_to_state(state, &parent, &tag, journal.as_ref());
                }
            }
            _ => {}
        }
    }
}
