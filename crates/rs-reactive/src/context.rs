//! Thread-local dependency tracking consulted by [`crate::Cell::get`] and
//! driven by [`crate::Derived`] / [`crate::Effect`] while they recompute.
//!
//! A language with dynamic scoping would pass this as an ambient context
//! parameter; in Rust a thread-local stack of "what's currently computing"
//! plays the same role (see DESIGN.md for the grounding).

use std::cell::RefCell;
use std::sync::Arc;

/// Something that wants to know when a dependency it read has changed.
pub trait DepTarget: Send + Sync {
    fn mark_dirty(&self);
}

thread_local! {
    static CURRENT: RefCell<Vec<Arc<dyn DepTarget>>> = RefCell::new(Vec::new());
}

struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| {
            c.borrow_mut().pop();
        });
    }
}

/// Runs `f` with `target` pushed as the active computation. Any `Cell::get`
/// performed during `f` (directly, or transitively through a `Derived`)
/// registers `target` as a dependency of the cell it reads.
///
/// The push is popped even if `f` panics, so a panicking compute function
/// cannot leave a stale entry on the stack for the next tracked call on this
/// thread.
pub fn track<R>(target: Arc<dyn DepTarget>, f: impl FnOnce() -> R) -> R {
    CURRENT.with(|c| c.borrow_mut().push(target));
    let _guard = PopGuard;
    f()
}

/// The computation currently being tracked on this thread, if any.
pub fn current() -> Option<Arc<dyn DepTarget>> {
    CURRENT.with(|c| c.borrow().last().cloned())
}
