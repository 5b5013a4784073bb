//! Context façade and the thread-local stack of in-progress computations.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::computation::{Computation, ObserverCall};
use crate::error::Error;
use crate::observer::{DynObserver, Observer, ParamObserver};
use crate::selector::{Selector, SelectorBuilder};
use crate::tracer::{NoopTracer, Tracer};

// Thread-local stack of computations currently being built. Shared by
// every context on the thread: an observer invoked mid-computation
// registers into each open frame regardless of which context created
// the enclosing selector, and replay re-reads the observer's own
// context, so cross-context reads stay re-validatable.
thread_local! {
    static ACTIVE: RefCell<Vec<Computation>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn has_active_computation() -> bool {
    ACTIVE.with(|stack| !stack.borrow().is_empty())
}

/// Register an observer call into every open frame, outermost first.
/// Registering on every frame (not only the top) is what propagates
/// dependencies to enclosing selectors transitively.
pub(crate) fn register_dependency(call: &ObserverCall) {
    ACTIVE.with(|stack| {
        for frame in stack.borrow().iter() {
            frame.record(call.clone());
        }
    });
}

/// Merge a finished (or cache-hit) computation's dependencies into every
/// frame still open on the stack.
pub(crate) fn merge_into_active(computation: &Computation) {
    ACTIVE.with(|stack| {
        for frame in stack.borrow().iter() {
            frame.absorb(computation);
        }
    });
}

/// RAII frame for the computation stack; popping on drop keeps the stack
/// balanced on every exit path, including panics in user computes.
pub(crate) struct FrameGuard;

impl FrameGuard {
    pub(crate) fn enter(frame: Computation) -> Self {
        ACTIVE.with(|stack| stack.borrow_mut().push(frame));
        FrameGuard
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// Observer ids must be unique across contexts, not just within one:
// computations on the shared stack index dependencies by observer key,
// and observers from different contexts may land in the same index.
static OBSERVER_IDS: AtomicU64 = AtomicU64::new(0);

pub(crate) struct ContextInner<S> {
    pub(crate) state: RwLock<S>,
    pub(crate) tracer: Arc<dyn Tracer>,
}

impl<S> ContextInner<S> {
    /// Fresh positive observer id.
    pub(crate) fn next_observer_id(&self) -> u64 {
        OBSERVER_IDS.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// The unit of isolation: owns the current state value and the tracer.
/// Observers and selectors are created through it; state is replaced
/// wholesale with [`set_state`](Context::set_state).
///
/// Cheap to clone — all data is behind `Arc`.
pub struct Context<S> {
    pub(crate) inner: Arc<ContextInner<S>>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Default + Send + Sync + 'static> Default for Context<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: Send + Sync + 'static> Context<S> {
    /// Create a context seeded with `initial` state.
    pub fn new(initial: S) -> Self {
        Self::with_tracer(initial, NoopTracer)
    }

    /// Create a context with a custom [`Tracer`].
    pub fn with_tracer(initial: S, tracer: impl Tracer) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                state: RwLock::new(initial),
                tracer: Arc::new(tracer),
            }),
        }
    }

    /// Swap the state value. Cached computations are untouched; the next
    /// selector lookup decides validity by replaying its recorded
    /// observers against the new state.
    pub fn set_state(&self, next: S) {
        *self.inner.state.write() = next;
        self.inner.tracer.on_state_swapped();
    }

    /// Create a non-memoized state reader with `PartialEq` change
    /// detection.
    pub fn observer<V, F>(&self, reader: F) -> Observer<S, V>
    where
        V: PartialEq + Clone + Send + Sync + 'static,
        F: Fn(&S) -> V + Send + Sync + 'static,
    {
        self.observer_by(reader, |a: &V, b: &V| a == b)
    }

    /// Create an observer with a custom equality predicate.
    pub fn observer_by<V, F, E>(&self, reader: F, is_equal: E) -> Observer<S, V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&S) -> V + Send + Sync + 'static,
        E: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        Observer::new(self.inner.clone(), Arc::new(reader), Arc::new(is_equal))
    }

    /// Create an observer parameterized by a single argument. Each
    /// distinct argument yields a distinct dependency key.
    pub fn param_observer<A, V, F>(&self, reader: F) -> ParamObserver<S, A, V>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        V: PartialEq + Clone + Send + Sync + 'static,
        F: Fn(&S, &A) -> V + Send + Sync + 'static,
    {
        self.param_observer_by(reader, |a: &V, b: &V| a == b)
    }

    /// Create a parameterized observer with a custom equality predicate.
    pub fn param_observer_by<A, V, F, E>(&self, reader: F, is_equal: E) -> ParamObserver<S, A, V>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(&S, &A) -> V + Send + Sync + 'static,
        E: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        ParamObserver::new(self.inner.clone(), Arc::new(reader), Arc::new(is_equal))
    }

    /// Create a dynamic observer over JSON values.
    ///
    /// `params` is the reader's declared parameter count: state plus an
    /// optional argument. More than two is rejected with
    /// [`Error::ReaderArity`].
    pub fn dyn_observer<F>(&self, params: usize, reader: F) -> Result<DynObserver<S>, Error>
    where
        F: Fn(&S, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        DynObserver::new(self.inner.clone(), params, Arc::new(reader))
    }

    /// Create a memoized selector with the default cache and serializer.
    pub fn selector<A, V, F>(&self, compute: F) -> Selector<A, V>
    where
        A: crate::key::SelectorArgs,
        V: Send + Sync + 'static,
        F: Fn(A) -> Result<V, Error> + Send + Sync + 'static,
    {
        self.selector_with(compute).build()
    }

    /// Start building a selector with a replaced cache or serializer.
    pub fn selector_with<A, V, F>(&self, compute: F) -> SelectorBuilder<A, V>
    where
        A: crate::key::SelectorArgs,
        V: Send + Sync + 'static,
        F: Fn(A) -> Result<V, Error> + Send + Sync + 'static,
    {
        SelectorBuilder::new(Arc::new(compute), self.inner.tracer.clone())
    }
}
