//! `Effect`: a side-effecting body that re-runs eagerly whenever a tracked
//! dependency changes, with an optional cleanup run before each re-run and
//! on disposal. Where `Derived` is lazy (recomputes on next read), `Effect`
//! fires synchronously from inside the `Cell::set` call that dirtied it —
//! the same "fire immediately unless batching" rule `Cell` itself follows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::context::{self, DepTarget};

type Cleanup = Box<dyn FnOnce() + Send>;
type Body = Box<dyn FnMut() -> Option<Cleanup> + Send>;

struct EffectInner {
    body: Body,
    cleanup: Option<Cleanup>,
}

struct EffectState {
    self_ref: Weak<EffectState>,
    inner: Mutex<EffectInner>,
    paused: AtomicBool,
    dirty: AtomicBool,
}

impl DepTarget for EffectState {
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        if !self.paused.load(Ordering::SeqCst) {
            self.rerun();
        }
    }
}

impl EffectState {
    fn rerun(&self) {
        let Some(strong) = self.self_ref.upgrade() else {
            return;
        };
        let target: Arc<dyn DepTarget> = strong as Arc<dyn DepTarget>;

        // Swap the body/cleanup out from under the lock before running
        // either, so a dependency write performed synchronously by the body
        // itself (re-entering `mark_dirty` on this same effect) doesn't
        // deadlock on a mutex this call is still holding.
        let (mut body, prev_cleanup) = {
            let mut inner = self.inner.lock().unwrap();
            (
                std::mem::replace(&mut inner.body, Box::new(|| None)),
                inner.cleanup.take(),
            )
        };
        if let Some(cleanup) = prev_cleanup {
            cleanup();
        }
        let new_cleanup = context::track(target, || body());
        {
            let mut inner = self.inner.lock().unwrap();
            inner.body = body;
            inner.cleanup = new_cleanup;
        }
        self.dirty.store(false, Ordering::SeqCst);
    }
}

/// An eagerly re-run side effect. Dropping the `Effect` does not run the
/// final cleanup implicitly — call [`Effect::dispose`] to do that
/// deterministically.
pub struct Effect {
    state: Arc<EffectState>,
}

impl Effect {
    /// Creates the effect and runs `body` once immediately, under dependency
    /// tracking. `body` may return a cleanup closure, run just before the
    /// next re-run and on `dispose`.
    pub fn new(body: impl FnMut() -> Option<Cleanup> + Send + 'static) -> Self {
        let state = Arc::new_cyclic(|weak| EffectState {
            self_ref: weak.clone(),
            inner: Mutex::new(EffectInner {
                body: Box::new(body),
                cleanup: None,
            }),
            paused: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        });
        state.rerun();
        Self { state }
    }

    /// Suspends eager re-running. Dependency changes while paused are
    /// remembered but do not re-run the body.
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes eager re-running. If a dependency changed while paused, the
    /// body re-runs immediately.
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
        if self.state.dirty.load(Ordering::SeqCst) {
            self.state.rerun();
        }
    }

    /// Runs the last cleanup (if any) and drops the body, so no further
    /// dependency change can re-run it.
    pub fn dispose(self) {
        self.state.paused.store(true, Ordering::SeqCst);
        let mut inner = self.state.inner.lock().unwrap();
        if let Some(cleanup) = inner.cleanup.take() {
            cleanup();
        }
        inner.body = Box::new(|| None);
    }
}
