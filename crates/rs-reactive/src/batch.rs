//! Notification coalescing. While a batch scope is open, a [`crate::Cell`]
//! that changes enqueues a flush instead of firing its subscribers inline;
//! the outermost scope runs each distinct changed cell's flush exactly once,
//! in the order it was first touched.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

/// A pending notification queued by a `Cell` during an open batch.
pub(crate) trait BatchFlush: Send + Sync {
    fn flush(&self);
}

thread_local! {
    static DEPTH: RefCell<u32> = RefCell::new(0);
    static QUEUE: RefCell<Vec<Arc<dyn BatchFlush>>> = RefCell::new(Vec::new());
    static QUEUED_IDS: RefCell<HashSet<u64>> = RefCell::new(HashSet::new());
}

/// True if the current thread is inside a `batch`/`BatchScope`.
pub fn is_batching() -> bool {
    DEPTH.with(|d| *d.borrow() > 0)
}

/// Queues `flush` under `id`. A second `enqueue` for the same `id` within the
/// same batch is a no-op — the cell's own stored value already reflects the
/// latest `set`, so only the first queue position matters.
pub(crate) fn enqueue(id: u64, flush: Arc<dyn BatchFlush>) {
    QUEUED_IDS.with(|ids| {
        if ids.borrow_mut().insert(id) {
            QUEUE.with(|q| q.borrow_mut().push(flush));
        }
    });
}

fn run_flush() {
    let entries = QUEUE.with(|q| std::mem::take(&mut *q.borrow_mut()));
    QUEUED_IDS.with(|ids| ids.borrow_mut().clear());
    for entry in entries {
        entry.flush();
    }
}

/// RAII form of a batch scope. Nested scopes are transparent: only the
/// outermost one flushes, on drop, so it flushes on early return or panic
/// unwinding too.
pub struct BatchScope {
    _not_send_sync_marker: std::marker::PhantomData<*const ()>,
}

impl BatchScope {
    pub fn begin() -> Self {
        DEPTH.with(|d| *d.borrow_mut() += 1);
        Self {
            _not_send_sync_marker: std::marker::PhantomData,
        }
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let outermost = DEPTH.with(|d| {
            let mut d = d.borrow_mut();
            *d = d.saturating_sub(1);
            *d == 0
        });
        if outermost {
            run_flush();
        }
    }
}

/// Runs `f` with change notifications coalesced; equivalent to wrapping `f`
/// in a [`BatchScope`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::begin();
    f()
}
