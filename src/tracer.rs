//! Tracer trait for observing engine activity.
//!
//! All methods have default empty implementations, so a tracer only
//! overrides the events it cares about. The default [`NoopTracer`] keeps
//! tracing zero-cost when disabled. Implementations can collect events
//! for testing or forward them to a logging backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key::CacheKey;

/// How a selector lookup resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupOutcome {
    /// A valid cached result was returned without recomputation.
    Hit,
    /// No computation existed for the cache key.
    Miss,
    /// A computation existed but an observed dependency changed.
    Stale,
}

/// Hooks called by contexts, observers and selectors.
///
/// Implementations must be `Send + Sync`; the engine may be driven from
/// multiple threads.
pub trait Tracer: Send + Sync + 'static {
    /// A new observer was registered with the context.
    #[inline]
    fn on_observer_created(&self, _id: u64) {}

    /// An observer read state. `key` is the dependency key the read
    /// registers under when a selector computation is in progress.
    #[inline]
    fn on_observer_read(&self, _key: &str) {}

    /// A selector resolved a lookup for `key`.
    #[inline]
    fn on_selector_lookup(&self, _key: &CacheKey, _outcome: LookupOutcome) {}

    /// The context state value was swapped.
    #[inline]
    fn on_state_swapped(&self) {}

    /// A selector cache was cleared.
    #[inline]
    fn on_cache_cleared(&self) {}

    /// A mock computation was installed under `key`.
    #[inline]
    fn on_mock_installed(&self, _key: &CacheKey) {}
}

/// Tracer that discards all events.
///
/// This is the default for [`Context::new`](crate::Context::new).
pub struct NoopTracer;

impl Tracer for NoopTracer {}

// Shared tracers work as tracers, so a test can keep a handle to the
// instance it hands the context.
impl<T: Tracer + ?Sized> Tracer for Arc<T> {
    fn on_observer_created(&self, id: u64) {
        (**self).on_observer_created(id);
    }

    fn on_observer_read(&self, key: &str) {
        (**self).on_observer_read(key);
    }

    fn on_selector_lookup(&self, key: &CacheKey, outcome: LookupOutcome) {
        (**self).on_selector_lookup(key, outcome);
    }

    fn on_state_swapped(&self) {
        (**self).on_state_swapped();
    }

    fn on_cache_cleared(&self) {
        (**self).on_cache_cleared();
    }

    fn on_mock_installed(&self, key: &CacheKey) {
        (**self).on_mock_installed(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTracer {
        lookups: AtomicUsize,
        reads: AtomicUsize,
    }

    impl Tracer for CountingTracer {
        fn on_observer_read(&self, _key: &str) {
            self.reads.fetch_add(1, Ordering::Relaxed);
        }

        fn on_selector_lookup(&self, _key: &CacheKey, _outcome: LookupOutcome) {
            self.lookups.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let tracer = NoopTracer;
        tracer.on_observer_created(1);
        tracer.on_selector_lookup(&CacheKey::Empty, LookupOutcome::Miss);
        tracer.on_state_swapped();
    }

    #[test]
    fn counting_tracer_sees_events() {
        let tracer = CountingTracer {
            lookups: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        };
        tracer.on_observer_read("1");
        tracer.on_selector_lookup(&CacheKey::Empty, LookupOutcome::Hit);
        tracer.on_selector_lookup(&CacheKey::Empty, LookupOutcome::Stale);
        assert_eq!(tracer.reads.load(Ordering::Relaxed), 1);
        assert_eq!(tracer.lookups.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn tracers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopTracer>();
        assert_send_sync::<Arc<CountingTracer>>();
    }
}
