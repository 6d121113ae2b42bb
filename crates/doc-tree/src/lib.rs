//! Reference-counted hierarchical document tree.
//!
//! A [`Node`] is a shared handle to one entry of the tree: a type tag, an
//! ordered list of named property cells, an ordered list of children and a
//! weak parent back-reference. Every mutation can be observed through
//! node-local listeners ([`Node::subscribe`]) and can participate in
//! undo/redo by threading a [`Journal`] through the mutating call.
//!
//! The crate is single-threaded and callback-driven: all operations execute
//! synchronously on the caller's stack and listener dispatch happens inline,
//! after the structural change is complete.

pub mod codec;
mod events;
mod journal;
mod node;

pub use events::{ListenerId, Subscription, TreeEvent};
pub use journal::Journal;
pub use node::Node;

/// Dynamically-typed property cell. A closed variant type at the storage
/// boundary; typed consumers convert at the edge and never let it leak
/// further.
pub type Cell = serde_json::Value;
