//! `Derived<T>`: a lazily recomputed value over one or more `Cell`s (or other
//! `Derived`s). Grounded on `lattice`'s `Reactive`/`Runtime` dependency
//! tracking (dirty-marking via a registered subscriber id) composed with the
//! `Cell` this crate already provides for storage, equality suppression, and
//! subscriber fan-out — so a `Derived` is "a dirty flag plus a `Cell` that
//! only the flag's owner is allowed to write".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::cell::{Cell, Unsubscribe};
use crate::context::{self, DepTarget};

struct DirtyFlag(AtomicBool);

impl DepTarget for DirtyFlag {
    fn mark_dirty(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A value recomputed on demand from its dependencies. Unlike `Effect`,
/// `Derived` never runs eagerly: a dependency change only marks it dirty,
/// and the recompute happens the next time `get` (or `subscribe`'s backing
/// cell) is read.
pub struct Derived<T> {
    output: Cell<T>,
    dirty: Arc<DirtyFlag>,
    compute: Arc<Mutex<dyn FnMut() -> T + Send>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            dirty: Arc::clone(&self.dirty),
            compute: Arc::clone(&self.compute),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Derived<T> {
    /// Creates the derived value and runs `compute` once, immediately,
    /// under dependency tracking.
    pub fn new(mut compute: impl FnMut() -> T + Send + 'static) -> Self {
        let dirty = Arc::new(DirtyFlag(AtomicBool::new(false)));
        let target: Arc<dyn DepTarget> = Arc::clone(&dirty) as Arc<dyn DepTarget>;
        let initial = context::track(target, || compute());
        Self {
            output: Cell::new(initial),
            dirty,
            compute: Arc::new(Mutex::new(compute)),
        }
    }

    fn recompute(&self) {
        let target: Arc<dyn DepTarget> = Arc::clone(&self.dirty) as Arc<dyn DepTarget>;
        let mut compute = self.compute.lock().unwrap();
        let value = context::track(target, || (compute)());
        drop(compute);
        // Cell::set's own equality check suppresses the notification if the
        // recomputed value is unchanged, satisfying the "no-op recompute
        // doesn't notify" requirement without any extra bookkeeping here.
        self.output.set(value);
        self.dirty.0.store(false, Ordering::SeqCst);
    }

    /// Returns the current value, recomputing first if a dependency changed
    /// since the last computation. Reading this from inside another
    /// `Derived`/`Effect`'s compute registers that computation as a
    /// dependent of this derived's output.
    pub fn get(&self) -> T {
        if self.dirty.0.load(Ordering::SeqCst) {
            self.recompute();
        }
        self.output.get()
    }

    /// Subscribes to changes in the recomputed value. Note this observes the
    /// *output* cell directly — it does not itself force a recompute; call
    /// `get` (e.g. from an `Effect`) to drive recomputation.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe<T> {
        self.output.subscribe(callback)
    }
}
