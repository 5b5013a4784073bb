//! Tracer integration: a recording tracer observes the engine's
//! lookup, read, and lifecycle events.

use std::sync::Arc;

use memoflow::tracer::{LookupOutcome, Tracer};
use memoflow::{CacheKey, Context};
use parking_lot::Mutex;

/// Accumulates events for later inspection.
#[derive(Default)]
struct RecordingTracer {
    events: Mutex<Vec<String>>,
}

impl RecordingTracer {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl Tracer for RecordingTracer {
    fn on_observer_created(&self, id: u64) {
        self.push(format!("created:{id}"));
    }

    fn on_observer_read(&self, key: &str) {
        self.push(format!("read:{key}"));
    }

    fn on_selector_lookup(&self, key: &CacheKey, outcome: LookupOutcome) {
        self.push(format!("lookup:{key}:{outcome:?}"));
    }

    fn on_state_swapped(&self) {
        self.push("state".into());
    }

    fn on_cache_cleared(&self) {
        self.push("cleared".into());
    }

    fn on_mock_installed(&self, key: &CacheKey) {
        self.push(format!("mock:{key}"));
    }
}

#[test]
fn the_tracer_sees_the_selector_lifecycle() {
    let tracer = Arc::new(RecordingTracer::default());
    let cx = Context::with_tracer(1i64, tracer.clone());

    let base = cx.observer(|s: &i64| *s);
    let doubled = cx.selector({
        let base = base.clone();
        move |()| Ok(base.get() * 2)
    });

    assert_eq!(*doubled.call(()).unwrap(), 2);
    assert_eq!(*doubled.call(()).unwrap(), 2);

    cx.set_state(3);
    assert_eq!(*doubled.call(()).unwrap(), 6);

    doubled.clear_cache();
    doubled.mock(()).result(0);

    let events = tracer.events();
    assert_eq!(
        events,
        vec![
            "created:1",
            "lookup:():Miss",
            "read:1",
            "lookup:():Hit",
            "state",
            "lookup:():Stale",
            "read:1",
            "cleared",
            "mock:()",
        ]
    );
}
