//! Selectors: memoized derived computations with implicit dependency
//! discovery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{Cache, TableCache};
use crate::computation::{Computation, ErasedValue};
use crate::context::{self, FrameGuard};
use crate::error::Error;
use crate::key::{default_serialize, CacheKey, SelectorArgs};
use crate::tracer::{LookupOutcome, Tracer};

type ComputeFn<A, V> = Arc<dyn Fn(A) -> Result<V, Error> + Send + Sync>;
type SerializeFn = Arc<dyn Fn(&[Value]) -> CacheKey + Send + Sync>;

struct SelectorInner<A, V> {
    compute: ComputeFn<A, V>,
    cache: Box<dyn Cache>,
    serialize: SerializeFn,
    recomputations: AtomicU64,
    tracer: Arc<dyn Tracer>,
}

/// A memoized derived computation.
///
/// Results are cached per argument tuple. A cached result is returned as
/// long as replaying the observers recorded during its computation yields
/// equal values; otherwise the compute function runs again. Cheap to
/// clone — all state is behind `Arc`, and clones share one cache.
pub struct Selector<A, V> {
    inner: Arc<SelectorInner<A, V>>,
}

impl<A, V> Clone for Selector<A, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, V> Selector<A, V>
where
    A: SelectorArgs,
    V: Send + Sync + 'static,
{
    /// Evaluate the selector for `args`.
    ///
    /// Returns the cached result when the stored computation is still
    /// valid. On a miss the compute function runs with this invocation's
    /// computation pushed on the thread's stack, so observer reads and
    /// nested selector calls register as dependencies. Either way the
    /// computation's dependencies are merged into every enclosing
    /// selector computation still on the stack.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::User`] failures from the compute function.
    /// Nothing is cached on failure: the next call with the same
    /// arguments recomputes.
    pub fn call(&self, args: A) -> Result<Arc<V>, Error> {
        let inner = &self.inner;
        let cache_key = (inner.serialize)(&args.to_values());

        let existing = inner.cache.get(&cache_key);
        if let Some(computation) = &existing {
            if let Some(result) = computation.result() {
                if !computation.changed() {
                    // A result of the wrong erased type means a foreign
                    // record was stored under our key; fall through and
                    // recompute over it.
                    if let Ok(value) = result.downcast::<V>() {
                        inner.tracer.on_selector_lookup(&cache_key, LookupOutcome::Hit);
                        context::merge_into_active(computation);
                        return Ok(value);
                    }
                }
            }
        }

        let outcome = if existing.is_some() {
            LookupOutcome::Stale
        } else {
            LookupOutcome::Miss
        };
        inner.tracer.on_selector_lookup(&cache_key, outcome);

        let computation = match existing {
            Some(computation) => {
                computation.begin_recompute();
                computation
            }
            None => Computation::empty(),
        };

        // Counts every path that runs the compute function, including
        // failing ones.
        inner.recomputations.fetch_add(1, Ordering::Relaxed);

        let computed = {
            let _frame = FrameGuard::enter(computation.clone());
            (inner.compute)(args)
        };
        let value = Arc::new(computed?);

        let erased: ErasedValue = value.clone();
        computation.set_result(erased);
        inner.cache.set(cache_key, computation.clone());
        context::merge_into_active(&computation);
        Ok(value)
    }

    /// Ordered observer keys recorded (directly or transitively) by the
    /// most recent computation for `args`; empty when none exists.
    pub fn dependencies(&self, args: A) -> Vec<String> {
        let inner = &self.inner;
        let cache_key = (inner.serialize)(&args.to_values());
        inner
            .cache
            .get(&cache_key)
            .map(|computation| computation.dependency_keys())
            .unwrap_or_default()
    }

    /// How many times the compute function has run.
    pub fn recomputations(&self) -> u64 {
        self.inner.recomputations.load(Ordering::Relaxed)
    }

    /// Drop every cached computation; the next call is a guaranteed miss.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.tracer.on_cache_cleared();
    }

    /// Prepare a mock for the slot keyed by `args`.
    pub fn mock(&self, args: A) -> MockSlot<A, V> {
        let cache_key = (self.inner.serialize)(&args.to_values());
        MockSlot {
            selector: self.clone(),
            cache_key,
        }
    }
}

/// Pending mock installation for one cache slot, returned by
/// [`Selector::mock`].
pub struct MockSlot<A, V> {
    selector: Selector<A, V>,
    cache_key: CacheKey,
}

impl<A, V> MockSlot<A, V>
where
    A: SelectorArgs,
    V: Send + Sync + 'static,
{
    /// Install a computation whose result is `value` and whose dependency
    /// set is empty. Calls hitting this slot return `value` without
    /// running the compute function or moving the recomputation counter,
    /// until the cache is cleared or the slot overwritten.
    pub fn result(self, value: V) {
        let inner = &self.selector.inner;
        inner.tracer.on_mock_installed(&self.cache_key);
        let erased: ErasedValue = Arc::new(value);
        inner.cache.set(self.cache_key, Computation::resolved(erased));
    }
}

/// Builder for selectors with a replaced cache or serializer, started
/// with [`Context::selector_with`](crate::Context::selector_with).
pub struct SelectorBuilder<A, V> {
    compute: ComputeFn<A, V>,
    cache: Option<Box<dyn Cache>>,
    serialize: Option<SerializeFn>,
    tracer: Arc<dyn Tracer>,
}

impl<A, V> SelectorBuilder<A, V>
where
    A: SelectorArgs,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(compute: ComputeFn<A, V>, tracer: Arc<dyn Tracer>) -> Self {
        Self {
            compute,
            cache: None,
            serialize: None,
            tracer,
        }
    }

    /// Replace the default [`TableCache`].
    pub fn cache(mut self, cache: impl Cache) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Replace the default serializer wholesale. The replacement must
    /// produce keys usable by the selector's cache.
    pub fn serialize_with<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&[Value]) -> CacheKey + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(serialize));
        self
    }

    /// Finish building the selector.
    pub fn build(self) -> Selector<A, V> {
        Selector {
            inner: Arc::new(SelectorInner {
                compute: self.compute,
                cache: self.cache.unwrap_or_else(|| Box::new(TableCache::new())),
                serialize: self.serialize.unwrap_or_else(|| Arc::new(default_serialize)),
                recomputations: AtomicU64::new(0),
                tracer: self.tracer,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn selectors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Selector<(), i64>>();
        assert_send_sync::<Selector<(i64, String), String>>();
    }

    #[test]
    fn hit_then_miss_on_observed_change() {
        let cx = Context::new(10i64);
        let base = cx.observer(|s: &i64| *s);
        let doubled = cx.selector({
            let base = base.clone();
            move |()| Ok(base.get() * 2)
        });

        assert_eq!(*doubled.call(()).unwrap(), 20);
        assert_eq!(*doubled.call(()).unwrap(), 20);
        assert_eq!(doubled.recomputations(), 1);

        cx.set_state(15);
        assert_eq!(*doubled.call(()).unwrap(), 30);
        assert_eq!(doubled.recomputations(), 2);
    }

    #[test]
    fn distinct_args_cache_separately() {
        let cx = Context::new(1i64);
        let base = cx.observer(|s: &i64| *s);
        let offset = cx.selector({
            let base = base.clone();
            move |by: i64| Ok(base.get() + by)
        });

        assert_eq!(*offset.call(1).unwrap(), 2);
        assert_eq!(*offset.call(2).unwrap(), 3);
        assert_eq!(*offset.call(1).unwrap(), 2);
        assert_eq!(offset.recomputations(), 2);
    }
}
