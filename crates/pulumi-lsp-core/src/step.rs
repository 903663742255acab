//! Generic concurrency primitives.
//!
//! A [`Step`] is a single-shot computation that either produces a value or
//! is cancelled, with monadic chaining. Steps are the only synchronization
//! surface the analysis pipeline uses: each stage is a step chained onto its
//! predecessor, rooted in a per-document [`CancelScope`].
//!
//! Cancellation is cooperative and hierarchical: cancelling a scope cancels
//! every scope created under it, and a producer returning `None` cancels its
//! own scope so chained steps observe the failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A cancellation scope. Cheap to clone; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    inner: Arc<ScopeInner>,
}

#[derive(Debug, Default)]
struct ScopeInner {
    cancelled: AtomicBool,
    parent: Option<Arc<ScopeInner>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that is cancelled when `self` is cancelled, but can also be
    /// cancelled on its own.
    pub fn child(&self) -> CancelScope {
        CancelScope {
            inner: Arc::new(ScopeInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut scope = Some(&self.inner);
        while let Some(inner) = scope {
            if inner.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            scope = inner.parent.as_ref();
        }
        false
    }
}

/// The result of a non-blocking poll of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult<T> {
    Ready(T),
    Pending,
    Cancelled,
}

/// A computation that may produce a value.
#[derive(Debug)]
pub struct Step<T> {
    state: Arc<StepState<T>>,
    scope: CancelScope,
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            scope: self.scope.clone(),
        }
    }
}

#[derive(Debug)]
struct StepState<T> {
    slot: Mutex<Option<T>>,
    done: Condvar,
}

// Cancellation can fire while a waiter sleeps on the condvar, so blocking
// waits poll the scope on a short interval instead of waiting indefinitely.
const WAIT_SLICE: Duration = Duration::from_millis(10);

impl<T: Clone + Send + 'static> Step<T> {
    /// Start a computation under a child of `scope`. The producer runs on its
    /// own thread; returning `None` cancels the step's scope, which chained
    /// steps observe as cancellation.
    pub fn spawn<F>(scope: &CancelScope, f: F) -> Step<T>
    where
        F: FnOnce(&CancelScope) -> Option<T> + Send + 'static,
    {
        let scope = scope.child();
        let state = Arc::new(StepState {
            slot: Mutex::new(None),
            done: Condvar::new(),
        });
        let step = Step {
            state: state.clone(),
            scope: scope.clone(),
        };
        std::thread::spawn(move || {
            let result = if scope.is_cancelled() { None } else { f(&scope) };
            match result {
                Some(value) => {
                    *state.slot.lock().unwrap() = Some(value);
                    state.done.notify_all();
                }
                None => scope.cancel(),
            }
        });
        step
    }

    /// A non-blocking attempt to retrieve the value.
    pub fn try_get(&self) -> StepResult<T> {
        if let Some(value) = self.state.slot.lock().unwrap().as_ref() {
            return StepResult::Ready(value.clone());
        }
        if self.scope.is_cancelled() {
            StepResult::Cancelled
        } else {
            StepResult::Pending
        }
    }

    /// Block until the value is available or the step is cancelled.
    pub fn get(&self) -> Option<T> {
        let mut slot = self.state.slot.lock().unwrap();
        loop {
            if let Some(value) = slot.as_ref() {
                return Some(value.clone());
            }
            if self.scope.is_cancelled() {
                return None;
            }
            let (guard, _timeout) = self.state.done.wait_timeout(slot, WAIT_SLICE).unwrap();
            slot = guard;
        }
    }

    /// Chain a computation onto this step's success.
    pub fn then<U, F>(&self, f: F) -> Step<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Option<U> + Send + 'static,
    {
        let prev = self.clone();
        Step::spawn(&self.scope, move |_| prev.get().and_then(f))
    }

    /// Run a side effect after this step succeeds.
    pub fn after<F>(&self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let _ = self.then(move |value| {
            f(value);
            Some(())
        });
    }

    /// The scope this step runs under.
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }
}
