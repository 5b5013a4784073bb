//! Observers: non-memoized state readers with stable identities.
//!
//! An observer reads the current state of the context that created it
//! and, when invoked while a selector computation is in progress,
//! registers itself with every open computation frame. Three shapes are
//! provided: [`Observer`] (plain reader), [`ParamObserver`] (reader
//! parameterized by a single argument), and [`DynObserver`] (dynamic
//! JSON surface carrying the runtime arity checks).

use std::any::Any;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::computation::{EqualFn, ErasedValue, ObserverCall, ReplayFn};
use crate::context::{self, ContextInner};
use crate::error::Error;
use crate::key::{lower_arg, observer_key};

fn erase_equality<V: Send + Sync + 'static>(is_equal: Arc<dyn Fn(&V, &V) -> bool + Send + Sync>) -> EqualFn {
    Arc::new(move |a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
            (Some(a), Some(b)) => is_equal(a, b),
            _ => false,
        }
    })
}

struct ObserverInner<S, V> {
    id: u64,
    cx: Arc<ContextInner<S>>,
    reader: Arc<dyn Fn(&S) -> V + Send + Sync>,
    replay: ReplayFn,
    erased_equal: EqualFn,
}

/// A callable state reader. Not memoized: every invocation re-runs the
/// reader against current state.
pub struct Observer<S, V> {
    inner: Arc<ObserverInner<S, V>>,
}

impl<S, V> Clone for Observer<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, V> Observer<S, V>
where
    S: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        cx: Arc<ContextInner<S>>,
        reader: Arc<dyn Fn(&S) -> V + Send + Sync>,
        is_equal: Arc<dyn Fn(&V, &V) -> bool + Send + Sync>,
    ) -> Self {
        let id = cx.next_observer_id();
        cx.tracer.on_observer_created(id);
        let replay = {
            let cx = cx.clone();
            let reader = reader.clone();
            Arc::new(move || {
                let state = cx.state.read();
                Arc::new(reader(&state)) as ErasedValue
            })
        };
        Self {
            inner: Arc::new(ObserverInner {
                id,
                cx,
                reader,
                replay,
                erased_equal: erase_equality(is_equal),
            }),
        }
    }

    /// The observer's unique identifier.
    pub fn id(&self) -> String {
        self.inner.id.to_string()
    }

    /// The dependency key this observer registers under.
    pub fn key(&self) -> String {
        observer_key(self.inner.id, None)
    }

    /// Read the current state. Registers a dependency with every
    /// in-progress selector computation on this thread.
    pub fn get(&self) -> V {
        let inner = &self.inner;
        let value = {
            let state = inner.cx.state.read();
            (inner.reader)(&state)
        };
        let key = self.key();
        if context::has_active_computation() {
            let call = ObserverCall::new(
                Arc::from(key.as_str()),
                Arc::new(value.clone()) as ErasedValue,
                inner.replay.clone(),
                inner.erased_equal.clone(),
            );
            context::register_dependency(&call);
        }
        inner.cx.tracer.on_observer_read(&key);
        value
    }
}

struct ParamObserverInner<S, A, V> {
    id: u64,
    cx: Arc<ContextInner<S>>,
    reader: Arc<dyn Fn(&S, &A) -> V + Send + Sync>,
    erased_equal: EqualFn,
}

/// An observer parameterized by a single argument. Each distinct
/// argument registers under its own dependency key.
pub struct ParamObserver<S, A, V> {
    inner: Arc<ParamObserverInner<S, A, V>>,
}

impl<S, A, V> Clone for ParamObserver<S, A, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, A, V> ParamObserver<S, A, V>
where
    S: Send + Sync + 'static,
    A: Serialize + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        cx: Arc<ContextInner<S>>,
        reader: Arc<dyn Fn(&S, &A) -> V + Send + Sync>,
        is_equal: Arc<dyn Fn(&V, &V) -> bool + Send + Sync>,
    ) -> Self {
        let id = cx.next_observer_id();
        cx.tracer.on_observer_created(id);
        Self {
            inner: Arc::new(ParamObserverInner {
                id,
                cx,
                reader,
                erased_equal: erase_equality(is_equal),
            }),
        }
    }

    /// The observer's unique identifier.
    pub fn id(&self) -> String {
        self.inner.id.to_string()
    }

    /// The dependency key an invocation with `arg` registers under.
    pub fn key(&self, arg: &A) -> String {
        observer_key(self.inner.id, Some(&lower_arg(arg)))
    }

    /// Read the current state with `arg`. The replay recorded for change
    /// detection re-invokes the reader with the same argument.
    pub fn get(&self, arg: &A) -> V {
        let inner = &self.inner;
        let value = {
            let state = inner.cx.state.read();
            (inner.reader)(&state, arg)
        };
        let key = self.key(arg);
        if context::has_active_computation() {
            let replay: ReplayFn = {
                let cx = inner.cx.clone();
                let reader = inner.reader.clone();
                let arg = arg.clone();
                Arc::new(move || {
                    let state = cx.state.read();
                    Arc::new(reader(&state, &arg)) as ErasedValue
                })
            };
            let call = ObserverCall::new(
                Arc::from(key.as_str()),
                Arc::new(value.clone()) as ErasedValue,
                replay,
                inner.erased_equal.clone(),
            );
            context::register_dependency(&call);
        }
        inner.cx.tracer.on_observer_read(&key);
        value
    }
}

struct DynObserverInner<S> {
    id: u64,
    cx: Arc<ContextInner<S>>,
    reader: Arc<dyn Fn(&S, Option<&Value>) -> Value + Send + Sync>,
    erased_equal: EqualFn,
}

/// A dynamic observer over JSON values.
///
/// This is the surface for untyped state (notably the process default
/// context); reader arity is declared rather than encoded in types, so
/// the contract checks happen at runtime here.
pub struct DynObserver<S> {
    inner: Arc<DynObserverInner<S>>,
}

impl<S> Clone for DynObserver<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> std::fmt::Debug for DynObserver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynObserver")
            .field("id", &self.inner.id)
            .finish()
    }
}

impl<S: Send + Sync + 'static> DynObserver<S> {
    pub(crate) fn new(
        cx: Arc<ContextInner<S>>,
        params: usize,
        reader: Arc<dyn Fn(&S, Option<&Value>) -> Value + Send + Sync>,
    ) -> Result<Self, Error> {
        if params > 2 {
            return Err(Error::ReaderArity);
        }
        let id = cx.next_observer_id();
        cx.tracer.on_observer_created(id);
        Ok(Self {
            inner: Arc::new(DynObserverInner {
                id,
                cx,
                reader,
                erased_equal: erase_equality::<Value>(Arc::new(|a, b| a == b)),
            }),
        })
    }

    /// The observer's unique identifier.
    pub fn id(&self) -> String {
        self.inner.id.to_string()
    }

    /// The dependency key an invocation with `arg` registers under.
    pub fn key(&self, arg: Option<&Value>) -> String {
        observer_key(self.inner.id, arg)
    }

    /// Read the current state with zero or one argument. More than one
    /// argument is rejected with [`Error::InvocationArity`].
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        if args.len() > 1 {
            return Err(Error::InvocationArity);
        }
        let inner = &self.inner;
        let arg = args.first();
        let value = {
            let state = inner.cx.state.read();
            (inner.reader)(&state, arg)
        };
        let key = self.key(arg);
        if context::has_active_computation() {
            let replay: ReplayFn = {
                let cx = inner.cx.clone();
                let reader = inner.reader.clone();
                let arg = arg.cloned();
                Arc::new(move || {
                    let state = cx.state.read();
                    Arc::new(reader(&state, arg.as_ref())) as ErasedValue
                })
            };
            let call = ObserverCall::new(
                Arc::from(key.as_str()),
                Arc::new(value.clone()) as ErasedValue,
                replay,
                inner.erased_equal.clone(),
            );
            context::register_dependency(&call);
        }
        inner.cx.tracer.on_observer_read(&key);
        Ok(value)
    }
}
