//! `Cell<T>`: a single reactive value with a subscriber list.
//!
//! Grounded on `frankentui`'s `Observable<T>` (value + version + weak
//! subscriber list, equality-suppressed `set`, `Subscription` RAII guard) and
//! adapted from its single-threaded `Rc<RefCell<_>>` shape to `Arc<Mutex<_>>`
//! so cells can be shared and mutated across threads, as the Hub/Client
//! components require.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::batch::{self, BatchFlush};
use crate::context::{self, DepTarget};

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

type EqFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;
type SubCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    callback: SubCallback<T>,
}

struct Inner<T> {
    value: T,
    eq: EqFn<T>,
    subscribers: Vec<Subscriber<T>>,
    /// Dependents registered via `Cell::get` while under `context::track`.
    dependents: Vec<Weak<dyn DepTarget>>,
    /// Value at batch entry, used to suppress a no-op flush when a cell is
    /// set and then set back to its original value within the same batch.
    batch_baseline: Option<T>,
    next_local_id: u64,
}

/// A reactive value cell. Cloning a `Cell` produces a new handle to the same
/// shared state: both handles observe the same value and share subscribers.
pub struct Cell<T> {
    id: u64,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by [`Cell::subscribe`]. Dropping it removes the callback.
pub struct Unsubscribe<T> {
    id: u64,
    inner: Weak<Mutex<Inner<T>>>,
}

impl<T> Drop for Unsubscribe<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap();
            inner.subscribers.retain(|s| s.id != self.id);
        }
    }
}

impl<T: Clone + Send + 'static> Cell<T> {
    /// Creates a cell whose equality policy is `PartialEq` — a `set` with a
    /// value equal to the current one is a no-op.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_eq(value, Arc::new(|a: &T, b: &T| a == b))
    }

    /// Creates a cell that always notifies on `set`, regardless of value
    /// equality — useful for `T` with no meaningful `PartialEq`, or where
    /// every write is semantically an event.
    pub fn new_always_notify(value: T) -> Self {
        Self::with_eq(value, Arc::new(|_: &T, _: &T| false))
    }

    /// Creates a cell with a caller-supplied equality policy.
    pub fn with_eq(value: T, eq: EqFn<T>) -> Self {
        let id = NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            inner: Arc::new(Mutex::new(Inner {
                value,
                eq,
                subscribers: Vec::new(),
                dependents: Vec::new(),
                batch_baseline: None,
                next_local_id: 1,
            })),
        }
    }

    /// Stable identity for this cell's shared state, used by `Batch` to
    /// dedupe repeated writes to the same cell.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reads the current value. If called while a `Derived`/`Effect` is
    /// recomputing on this thread, registers that computation as a
    /// dependent so it re-runs the next time this cell changes.
    pub fn get(&self) -> T {
        if let Some(target) = context::current() {
            let mut inner = self.inner.lock().unwrap();
            let already = inner
                .dependents
                .iter()
                .any(|w| w.upgrade().is_some_and(|t| Arc::ptr_eq(&t, &target)));
            if !already {
                inner.dependents.push(Arc::downgrade(&target));
            }
        }
        self.inner.lock().unwrap().value.clone()
    }

    /// Writes a new value. No-ops under the cell's equality policy. Marks
    /// dependents dirty synchronously (outside the cell's lock); fires
    /// subscribers immediately unless a `Batch` is open, in which case the
    /// flush is deferred to the batch's exit.
    pub fn set(&self, value: T) {
        let dependents = {
            let mut inner = self.inner.lock().unwrap();
            if (inner.eq)(&inner.value, &value) {
                return;
            }
            if batch::is_batching() && inner.batch_baseline.is_none() {
                inner.batch_baseline = Some(inner.value.clone());
            }
            inner.value = value;
            let live: Vec<_> = inner
                .dependents
                .iter()
                .filter(|w| w.strong_count() > 0)
                .cloned()
                .collect();
            inner.dependents = live.clone();
            live
        };

        for dependent in &dependents {
            if let Some(target) = dependent.upgrade() {
                target.mark_dirty();
            }
        }

        if batch::is_batching() {
            batch::enqueue(
                self.id,
                Arc::new(CellFlusher {
                    inner: Arc::clone(&self.inner),
                }),
            );
        } else {
            self.notify_subscribers();
        }
    }

    /// Reads, applies `f`, and writes back the result.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.get();
        self.set(f(&current));
    }

    /// Registers `callback` to run after every value change that survives
    /// the equality policy. Returns a guard that unsubscribes on drop.
    ///
    /// A subscription added from inside a running callback takes effect only
    /// for the *next* change — the set of callbacks to fire is snapshotted
    /// before any of them run.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe<T> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_local_id;
        inner.next_local_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        Unsubscribe {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn notify_subscribers(&self) {
        let (callbacks, value) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.subscribers.iter().map(|s| Arc::clone(&s.callback)).collect::<Vec<_>>(),
                inner.value.clone(),
            )
        };
        for cb in callbacks {
            // A panicking subscriber must not prevent its siblings from running.
            let _ = panic::catch_unwind(AssertUnwindSafe(|| cb(&value)));
        }
    }
}

impl<T: Clone + Send + 'static> Cell<Arc<T>> {
    /// Creates a cell over an `Arc<T>` whose equality policy is reference
    /// identity rather than deep equality — appropriate when `T` is
    /// expensive to compare or has no `PartialEq`, and "changed" means "a
    /// new value was produced", not "the contents differ".
    pub fn new_by_identity(value: Arc<T>) -> Self {
        Self::with_eq(value, Arc::new(|a: &Arc<T>, b: &Arc<T>| Arc::ptr_eq(a, b)))
    }
}

struct CellFlusher<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone + Send + 'static> BatchFlush for CellFlusher<T> {
    fn flush(&self) {
        let (callbacks, value) = {
            let mut inner = self.inner.lock().unwrap();
            let baseline = inner.batch_baseline.take();
            let net_changed = match baseline {
                Some(base) => !(inner.eq)(&base, &inner.value),
                None => true,
            };
            if !net_changed {
                return;
            }
            (
                inner.subscribers.iter().map(|s| Arc::clone(&s.callback)).collect::<Vec<_>>(),
                inner.value.clone(),
            )
        };
        for cb in callbacks {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| cb(&value)));
        }
    }
}
