//! Single-flight re-entrancy guards.
//!
//! Every component that mutates the tree from inside its own listener
//! reaction suppresses the echo of that mutation with a scoped flag: set on
//! entry, previous value restored on every exit path.

use std::cell::Cell;
use std::rc::Rc;

/// Shared boolean flag checked by listener reactions.
#[derive(Clone, Default)]
pub struct Flag {
    inner: Rc<Cell<bool>>,
}

impl Flag {
    pub fn new() -> Flag {
        Flag::default()
    }

    pub fn is_set(&self) -> bool {
        self.inner.get()
    }

    /// Sets the flag for the lifetime of the returned guard.
    #[must_use]
    pub fn scoped_set(&self) -> ScopedFlag {
        let previous = self.inner.replace(true);
        ScopedFlag {
            flag: self.clone(),
            previous,
        }
    }
}

/// Restores the flag's previous value on drop.
pub struct ScopedFlag {
    flag: Flag,
    previous: bool,
}

impl Drop for ScopedFlag {
    fn drop(&mut self) {
        self.flag.inner.set(self.previous);
    }
}
