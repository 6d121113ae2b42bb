use std::cell::RefCell;
use std::rc::Rc;

use doc_tree::{Cell, Journal, Node, Subscription, TreeEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::guard::Flag;

/// Encode/decode capability between a typed value and a property cell.
///
/// The blanket impl covers every serde-able scalar or struct, so an
/// application type is a property type for free. `decode` returning `None`
/// means the stored cell does not represent a `T`; the cache then falls
/// back to the declared default value.
pub trait PropertyValue: Clone + PartialEq + 'static {
    fn encode(&self) -> Cell;
    fn decode(cell: &Cell) -> Option<Self>;
}

impl<T> PropertyValue for T
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    fn encode(&self) -> Cell {
        serde_json::to_value(self).unwrap_or(Cell::Null)
    }

    fn decode(cell: &Cell) -> Option<Self> {
        serde_json::from_value(cell.clone()).ok()
    }
}

/// One property key on one node, mirrored into a strongly-typed cache.
///
/// `get` is O(1) and never touches the tree; the cache is resynchronized on
/// every property change of the bound key, whichever side caused it
/// (including undo/redo). A constrain function, when installed, corrects
/// out-of-range values in place — external violations are written back to
/// the tree excluding this wrapper's own listener registration.
///
/// With sync-default disabled (the initial state), a value equal to the
/// default is represented canonically by the property being absent; with it
/// enabled the default is stored like any other value.
pub struct TypedProperty<T: PropertyValue> {
    state: Rc<RefCell<PropertyState<T>>>,
}

struct PropertyState<T> {
    node: Option<Node>,
    key: String,
    journal: Option<Journal>,
    default: T,
    cached: T,
    sync_default: bool,
    constrainer: Option<Box<dyn FnMut(&mut T, bool)>>,
    on_change: Option<Box<dyn FnMut()>>,
    subscription: Option<Subscription>,
    reacting: Flag,
}

impl<T: PropertyValue + Default> Default for TypedProperty<T> {
    fn default() -> Self {
        TypedProperty::new(T::default())
    }
}

impl<T: PropertyValue> TypedProperty<T> {
    /// Constructs an unbound property; call
    /// [`refer_to`](TypedProperty::refer_to) to bind it.
    pub fn new(default: T) -> TypedProperty<T> {
        TypedProperty {
            state: Rc::new(RefCell::new(PropertyState {
                node: None,
                key: String::new(),
                journal: None,
                default: default.clone(),
                cached: default,
                sync_default: false,
                constrainer: None,
                on_change: None,
                subscription: None,
                reacting: Flag::new(),
            })),
        }
    }

    /// Rebinds to `(node, key)`, keeping the current default value. Any
    /// previous listener registration is detached, the cache is immediately
    /// resynchronized from the tree and the change callback fires if the
    /// resynchronized value differs from the pre-rebind cache.
    pub fn refer_to(&mut self, node: &Node, key: &str, journal: Option<&Journal>) {
        let default = self.state.borrow().default.clone();
        self.refer_to_with_default(node, key, journal, default);
    }

    pub fn refer_to_with_default(
        &mut self,
        node: &Node,
        key: &str,
        journal: Option<&Journal>,
        default: T,
    ) {
        debug_assert!(!key.is_empty(), "property key must not be empty");
        {
            let mut state = self.state.borrow_mut();
            state.subscription = None;
            state.key = key.to_owned();
            state.journal = journal.cloned();
            state.default = default;
        }
        Self::bind_node(&self.state, node);
    }

    /// Cached value; never reads the tree.
    pub fn get(&self) -> T {
        self.state.borrow().cached.clone()
    }

    /// Writes `value` through to the tree (journaled). With sync-default
    /// disabled a value equal to the default removes the property instead.
    /// The cache updates through the resulting change notification, so
    /// `get` immediately after `set` observes the constrained result.
    ///
    /// Calling `set` on an unbound property is a programming error; the
    /// release fallback only updates the cache.
    pub fn set(&mut self, value: T) {
        enum Plan {
            Remove,
            Write(Cell),
        }
        let (node, key, journal, plan) = {
            let mut state = self.state.borrow_mut();
            let Some(node) = state.node.clone() else {
                debug_assert!(false, "set on an unbound property");
                state.cached = value;
                return;
            };
            let plan = if !state.sync_default && value == state.default {
                Plan::Remove
            } else {
                let mut value = value;
                if let Some(constrainer) = state.constrainer.as_mut() {
                    constrainer(&mut value, false);
                }
                Plan::Write(value.encode())
            };
            (node, state.key.clone(), state.journal.clone(), plan)
        };
        match plan {
            Plan::Remove => node.remove_property(&key, journal.as_ref()),
            Plan::Write(cell) => node.set_property(&key, cell, journal.as_ref()),
        }
    }

    pub fn reset_to_default(&mut self) {
        let default = self.state.borrow().default.clone();
        self.set(default);
    }

    /// Installs a new default (constrained first). With sync-default
    /// disabled, a stored value equal to the new default is removed so "at
    /// default" stays represented canonically by absence; an already absent
    /// property resynchronizes the cache to the new default.
    pub fn set_default(&mut self, default: T) {
        let (node, key, journal, remove) = {
            let mut state = self.state.borrow_mut();
            let mut default = default;
            if let Some(constrainer) = state.constrainer.as_mut() {
                constrainer(&mut default, true);
            }
            state.default = default;
            let Some(node) = state.node.clone() else {
                return;
            };
            let remove = !state.sync_default && state.cached == state.default;
            (node, state.key.clone(), state.journal.clone(), remove)
        };
        if node.has_property(&key) {
            if remove {
                node.remove_property(&key, journal.as_ref());
            }
        } else {
            // Absent means "at default", so the cache tracks the new default.
            Self::resync(&self.state);
        }
    }

    /// Installs `constrainer` and immediately re-validates both the default
    /// and the current value against it, so a value already out of range is
    /// corrected on return.
    pub fn set_constrainer<F>(&mut self, constrainer: F)
    where
        F: FnMut(&mut T, bool) + 'static,
    {
        let (default, cached) = {
            let mut state = self.state.borrow_mut();
            state.constrainer = Some(Box::new(constrainer));
            (state.default.clone(), state.cached.clone())
        };
        self.set_default(default);
        if self.state.borrow().node.is_some() {
            self.set(cached);
        }
    }

    /// Whether a value equal to the default is kept as an actual property
    /// (`true`) or represented by the property being absent (`false`, the
    /// initial state).
    pub fn set_sync_default(&mut self, should_sync: bool) {
        let cached = {
            let mut state = self.state.borrow_mut();
            if state.sync_default == should_sync {
                return;
            }
            state.sync_default = should_sync;
            state.cached.clone()
        };
        if self.state.borrow().node.is_some() {
            self.set(cached);
        }
    }

    pub fn is_sync_default(&self) -> bool {
        self.state.borrow().sync_default
    }

    pub fn is_valid(&self) -> bool {
        let state = self.state.borrow();
        state.node.is_some() && !state.key.is_empty()
    }

    pub fn is_using_default(&self) -> bool {
        let state = self.state.borrow();
        state.cached == state.default
    }

    pub fn default_value(&self) -> T {
        self.state.borrow().default.clone()
    }

    pub fn node(&self) -> Option<Node> {
        self.state.borrow().node.clone()
    }

    pub fn key(&self) -> String {
        self.state.borrow().key.clone()
    }

    /// Change callback, fired after the cache has been fully
    /// resynchronized — consumers always observe the post-mutation value.
    pub fn set_on_change<F>(&mut self, callback: F)
    where
        F: FnMut() + 'static,
    {
        self.state.borrow_mut().on_change = Some(Box::new(callback));
    }

    pub fn clear_on_change(&mut self) {
        self.state.borrow_mut().on_change = None;
    }

    // ---- listener side ----------------------------------------------------

    fn bind_node(state: &Rc<RefCell<PropertyState<T>>>, node: &Node) {
        state.borrow_mut().node = Some(node.clone());
        Self::resync(state);
        let weak = Rc::downgrade(state);
        let subscription = node.subscribe(move |event| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            match event {
                TreeEvent::PropertyChanged { node, key } => {
                    Self::on_property_changed(&state, node, key);
                }
                TreeEvent::Redirected { node } => {
                    Self::on_redirected(&state, node);
                }
                _ => {}
            }
        });
        state.borrow_mut().subscription = Some(subscription);
    }

    fn on_property_changed(state: &Rc<RefCell<PropertyState<T>>>, node: &Node, key: &str) {
        {
            let st = state.borrow();
            if st.reacting.is_set() {
                return;
            }
            if st.key != key || st.node.as_ref() != Some(node) {
                return;
            }
        }
        Self::resync(state);
    }

    /// Redirection is not an expected transition for a bound property; the
    /// recovery is a best-effort full rebind against the new handle.
    fn on_redirected(state: &Rc<RefCell<PropertyState<T>>>, target: &Node) {
        {
            let st = state.borrow();
            if st.reacting.is_set() {
                return;
            }
        }
        state.borrow_mut().subscription = None;
        Self::bind_node(state, target);
    }

    /// Re-derives the cache from the tree, applies the constrainer, writes
    /// a corrected value back in place (excluding this listener) and fires
    /// the change callback iff the cache changed.
    fn resync(state: &Rc<RefCell<PropertyState<T>>>) {
        let reacting = state.borrow().reacting.clone();
        let _guard = reacting.scoped_set();
        let (node, key, journal, exclude, write_back, changed) = {
            let mut st = state.borrow_mut();
            let Some(node) = st.node.clone() else {
                return;
            };
            let raw = node.property(&st.key);
            let present = raw.is_some();
            let mut value = match &raw {
                Some(cell) => T::decode(cell).unwrap_or_else(|| st.default.clone()),
                None => st.default.clone(),
            };
            if let Some(constrainer) = st.constrainer.as_mut() {
                constrainer(&mut value, false);
            }
            let previous = std::mem::replace(&mut st.cached, value.clone());
            // Two correction writes, both excluding this listener: a
            // constraint violation fixed in place, and a missing property
            // re-installed when defaults are synchronized.
            let write_back = if present && st.constrainer.is_some() {
                Some(value.encode())
            } else if !present && st.sync_default {
                Some(value.encode())
            } else {
                None
            };
            (
                node,
                st.key.clone(),
                st.journal.clone(),
                st.subscription.as_ref().map(Subscription::id),
                write_back,
                previous != value,
            )
        };
        if let Some(cell) = write_back {
            match exclude {
                Some(id) => node.set_property_excluding(id, &key, cell, journal.as_ref()),
                None => node.set_property(&key, cell, journal.as_ref()),
            }
        }
        if changed {
            Self::emit_change(state);
        }
    }

    fn emit_change(state: &Rc<RefCell<PropertyState<T>>>) {
        let callback = state.borrow_mut().on_change.take();
        if let Some(mut callback) = callback {
            callback();
            let mut st = state.borrow_mut();
            if st.on_change.is_none() {
                st.on_change = Some(callback);
            }
        }
    }
}

impl<T: PropertyValue> PartialEq<T> for TypedProperty<T> {
    fn eq(&self, other: &T) -> bool {
        self.state.borrow().cached == *other
    }
}
