//! Typed synchronization layer over [`doc_tree`].
//!
//! The generic tree stays the single source of truth; this crate lets
//! application code treat a node, a property or a collection of same-tag
//! sibling nodes as a strongly-typed object, reconciled bidirectionally:
//! mutations through the typed surface and raw tree edits from elsewhere in
//! the document (including undo/redo replays) both land in one consistent
//! state, without double-application and without dangling wrappers.
//!
//! Building blocks:
//! - [`TypedNode`] / [`NodeWrapper`] — the wrap/rebind protocol binding a
//!   wrapper struct to one node of an expected tag;
//! - [`TypedProperty`] — one property key mirrored into a typed cache with
//!   default-value and constraint semantics;
//! - [`ObservedChildList`] — an ordered collection of wrapped children kept
//!   in lock-step with the parent's children of one tag;
//! - [`OwningSlot`] — an owning pointer synchronized with whether a
//!   matching child currently exists under the parent.
//!
//! Everything is single-threaded and callback-driven; structural misses
//! surface as `is_valid() == false`, never as errors.

mod child_list;
pub mod guard;
mod owning_slot;
mod typed_node;
mod typed_property;

pub use child_list::ObservedChildList;
pub use owning_slot::OwningSlot;
pub use typed_node::{NodeWrapper, TypedNode};
pub use typed_property::{PropertyValue, TypedProperty};
