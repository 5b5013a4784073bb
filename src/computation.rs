//! Computation records: cached selector results paired with the observer
//! calls needed to decide whether the result is still valid.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;
pub(crate) type ReplayFn = Arc<dyn Fn() -> ErasedValue + Send + Sync>;
pub(crate) type EqualFn = Arc<dyn Fn(&dyn Any, &dyn Any) -> bool + Send + Sync>;
type DepIndex = IndexMap<Arc<str>, ObserverCall, ahash::RandomState>;

/// One recorded observer invocation inside a selector computation.
///
/// Carries the type-erased observed result, a replay closure that
/// re-invokes the reader in the same shape as the original invocation
/// (argument baked in, state read from the originating context), and the
/// erased equality predicate. Replay never touches the computation stack,
/// so change detection cannot register dependencies recursively.
#[derive(Clone)]
pub(crate) struct ObserverCall {
    key: Arc<str>,
    result: ErasedValue,
    replay: ReplayFn,
    is_equal: EqualFn,
}

impl ObserverCall {
    pub(crate) fn new(key: Arc<str>, result: ErasedValue, replay: ReplayFn, is_equal: EqualFn) -> Self {
        Self {
            key,
            result,
            replay,
            is_equal,
        }
    }

    pub(crate) fn key(&self) -> &Arc<str> {
        &self.key
    }

    /// Re-invoke the reader and compare against the recorded result.
    fn changed(&self) -> bool {
        let current = (self.replay)();
        !(self.is_equal)(current.as_ref(), self.result.as_ref())
    }
}

struct Inner {
    result: Option<ErasedValue>,
    calls: DepIndex,
}

/// The cached product of one selector invocation.
///
/// Cheap to clone — all state is behind `Arc`. A record with no result
/// reads as a cache miss; the result is cleared while a recomputation is
/// in flight so a failed compute can never expose a stale value.
#[derive(Clone)]
pub struct Computation {
    inner: Arc<Mutex<Inner>>,
}

impl Computation {
    pub(crate) fn empty() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                result: None,
                calls: DepIndex::default(),
            })),
        }
    }

    /// A record with a result and no dependencies, as installed by mocks.
    pub(crate) fn resolved(result: ErasedValue) -> Self {
        let computation = Self::empty();
        computation.inner.lock().result = Some(result);
        computation
    }

    /// Insert or overwrite a dependency by its observer key. Overwriting
    /// keeps the key's original position, so iteration order remains the
    /// execution order of first observation.
    pub(crate) fn record(&self, call: ObserverCall) {
        let mut inner = self.inner.lock();
        inner.calls.insert(call.key().clone(), call);
    }

    /// Assign another record's dependency entries over this one.
    ///
    /// Locks are taken sequentially (child snapshot first), so absorbing
    /// a record into itself is harmless.
    pub(crate) fn absorb(&self, child: &Computation) {
        let entries: Vec<ObserverCall> = child.inner.lock().calls.values().cloned().collect();
        let mut inner = self.inner.lock();
        for call in entries {
            inner.calls.insert(call.key().clone(), call);
        }
    }

    /// Replay every recorded observer call against current state,
    /// short-circuiting on the first inequality.
    ///
    /// The calls are snapshotted first; no lock is held while user
    /// readers run.
    pub(crate) fn changed(&self) -> bool {
        let calls: Vec<ObserverCall> = self.inner.lock().calls.values().cloned().collect();
        calls.iter().any(ObserverCall::changed)
    }

    /// Ordered observer keys recorded by the most recent computation.
    pub fn dependency_keys(&self) -> Vec<String> {
        self.inner.lock().calls.keys().map(|key| key.to_string()).collect()
    }

    pub(crate) fn result(&self) -> Option<ErasedValue> {
        self.inner.lock().result.clone()
    }

    pub(crate) fn set_result(&self, result: ErasedValue) {
        self.inner.lock().result = Some(result);
    }

    /// Clear the result so the record reads as a miss until a new result
    /// lands. Recorded dependencies are retained; the dependency set of a
    /// record only grows as branches are explored.
    pub(crate) fn begin_recompute(&self) {
        self.inner.lock().result = None;
    }
}

impl std::fmt::Debug for Computation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Computation")
            .field("has_result", &inner.result.is_some())
            .field("dependencies", &inner.calls.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn call_for(key: &str, recorded: i64, source: &Arc<AtomicI64>) -> ObserverCall {
        let source = source.clone();
        ObserverCall::new(
            Arc::from(key),
            Arc::new(recorded),
            Arc::new(move || Arc::new(source.load(Ordering::SeqCst)) as ErasedValue),
            Arc::new(|a: &dyn Any, b: &dyn Any| match (a.downcast_ref::<i64>(), b.downcast_ref::<i64>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }),
        )
    }

    #[test]
    fn record_overwrites_by_key_without_duplicates() {
        let source = Arc::new(AtomicI64::new(1));
        let computation = Computation::empty();
        computation.record(call_for("1", 1, &source));
        computation.record(call_for("2", 1, &source));
        computation.record(call_for("1", 2, &source));
        assert_eq!(computation.dependency_keys(), vec!["1", "2"]);
    }

    #[test]
    fn absorb_merges_child_entries() {
        let source = Arc::new(AtomicI64::new(1));
        let parent = Computation::empty();
        let child = Computation::empty();
        parent.record(call_for("1", 1, &source));
        child.record(call_for("2", 1, &source));
        child.record(call_for("3", 1, &source));
        parent.absorb(&child);
        assert_eq!(parent.dependency_keys(), vec!["1", "2", "3"]);
    }

    #[test]
    fn absorb_self_is_harmless() {
        let source = Arc::new(AtomicI64::new(1));
        let computation = Computation::empty();
        computation.record(call_for("1", 1, &source));
        computation.absorb(&computation.clone());
        assert_eq!(computation.dependency_keys(), vec!["1"]);
    }

    #[test]
    fn changed_detects_a_drifted_source() {
        let source = Arc::new(AtomicI64::new(1));
        let computation = Computation::empty();
        computation.record(call_for("1", 1, &source));
        assert!(!computation.changed());
        source.store(2, Ordering::SeqCst);
        assert!(computation.changed());
    }

    #[test]
    fn changed_short_circuits() {
        let probes = Arc::new(AtomicI64::new(0));
        let computation = Computation::empty();
        for key in ["1", "2", "3"] {
            let probes = probes.clone();
            computation.record(ObserverCall::new(
                Arc::from(key),
                Arc::new(0i64),
                Arc::new(move || {
                    probes.fetch_add(1, Ordering::SeqCst);
                    Arc::new(1i64) as ErasedValue
                }),
                Arc::new(|a: &dyn Any, b: &dyn Any| match (a.downcast_ref::<i64>(), b.downcast_ref::<i64>()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }),
            ));
        }
        assert!(computation.changed());
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mismatched_result_types_read_as_changed() {
        let computation = Computation::empty();
        computation.record(ObserverCall::new(
            Arc::from("1"),
            Arc::new("text".to_string()),
            Arc::new(|| Arc::new(1i64) as ErasedValue),
            Arc::new(|a: &dyn Any, b: &dyn Any| match (a.downcast_ref::<i64>(), b.downcast_ref::<i64>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }),
        ));
        assert!(computation.changed());
    }

    #[test]
    fn begin_recompute_clears_only_the_result() {
        let source = Arc::new(AtomicI64::new(1));
        let computation = Computation::empty();
        computation.record(call_for("1", 1, &source));
        computation.set_result(Arc::new(10i64));
        computation.begin_recompute();
        assert!(computation.result().is_none());
        assert_eq!(computation.dependency_keys(), vec!["1"]);
    }
}
