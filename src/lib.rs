//! Memoflow: a pull-based memoization engine for derived computations
//! over shared state.
//!
//! Two primitives compose: **observers** (cheap, non-memoized state
//! readers with stable identities) and **selectors** (memoized derived
//! computations). Dependencies between them are discovered automatically
//! by watching the call graph while a selector computes. A selector
//! returns its cached result until the observed values it recorded
//! change, decided by replaying the recorded observers against current
//! state — there is no subscription machinery and no write-side
//! bookkeeping.
//!
//! # Key Features
//!
//! - **Implicit dependency tracking**: observer reads inside a selector
//!   register themselves, transitively through nested selectors
//! - **Replay-based invalidation**: state swaps never touch caches;
//!   validity is decided lazily on the next lookup
//! - **Per-argument memoization**: each argument tuple gets its own
//!   cache slot, with collision-free key serialization
//! - **Replaceable cache and serializer**: per selector, via a builder
//! - **Test surface**: dependency introspection, recomputation counters,
//!   and per-slot mocking
//!
//! # Example
//!
//! ```ignore
//! use memoflow::Context;
//!
//! #[derive(Clone)]
//! struct Prices { base: f64, tax: f64 }
//!
//! let cx = Context::new(Prices { base: 100.0, tax: 0.2 });
//! let base = cx.observer(|s: &Prices| s.base);
//! let tax = cx.observer(|s: &Prices| s.tax);
//!
//! let total = cx.selector({
//!     let (base, tax) = (base.clone(), tax.clone());
//!     move |()| Ok(base.get() * (1.0 + tax.get()))
//! });
//!
//! assert_eq!(*total.call(())?, 120.0);
//! assert_eq!(total.recomputations(), 1);
//!
//! cx.set_state(Prices { base: 100.0, tax: 0.25 });
//! assert_eq!(*total.call(())?, 125.0);
//! # Ok::<(), memoflow::Error>(())
//! ```

mod cache;
mod computation;
mod context;
mod error;
mod key;
mod observer;
mod selector;
pub mod tracer;

use std::sync::LazyLock;

use serde_json::Value;

pub use cache::{Cache, TableCache};
pub use computation::Computation;
pub use context::Context;
pub use error::Error;
pub use key::{default_serialize, CacheKey, SelectorArgs};
pub use observer::{DynObserver, Observer, ParamObserver};
pub use selector::{MockSlot, Selector, SelectorBuilder};
pub use tracer::{LookupOutcome, NoopTracer, Tracer};

// Process-wide default context. Its state is a JSON value, the dynamic
// rendering of an untyped shared state; pair it with `dyn_observer` for
// fully dynamic use.
static DEFAULT_CONTEXT: LazyLock<Context<Value>> = LazyLock::new(|| Context::new(Value::Null));

/// Handle to the process-wide default context.
pub fn default_context() -> Context<Value> {
    DEFAULT_CONTEXT.clone()
}

/// Swap the default context's state. See [`Context::set_state`].
pub fn set_state(next: Value) {
    DEFAULT_CONTEXT.set_state(next);
}

/// Create an observer on the default context. See [`Context::observer`].
pub fn observer<V, F>(reader: F) -> Observer<Value, V>
where
    V: PartialEq + Clone + Send + Sync + 'static,
    F: Fn(&Value) -> V + Send + Sync + 'static,
{
    DEFAULT_CONTEXT.observer(reader)
}

/// Create a parameterized observer on the default context. See
/// [`Context::param_observer`].
pub fn param_observer<A, V, F>(reader: F) -> ParamObserver<Value, A, V>
where
    A: serde::Serialize + Clone + Send + Sync + 'static,
    V: PartialEq + Clone + Send + Sync + 'static,
    F: Fn(&Value, &A) -> V + Send + Sync + 'static,
{
    DEFAULT_CONTEXT.param_observer(reader)
}

/// Create a dynamic observer on the default context. See
/// [`Context::dyn_observer`].
pub fn dyn_observer<F>(params: usize, reader: F) -> Result<DynObserver<Value>, Error>
where
    F: Fn(&Value, Option<&Value>) -> Value + Send + Sync + 'static,
{
    DEFAULT_CONTEXT.dyn_observer(params, reader)
}

/// Create a selector on the default context. See [`Context::selector`].
pub fn selector<A, V, F>(compute: F) -> Selector<A, V>
where
    A: SelectorArgs,
    V: Send + Sync + 'static,
    F: Fn(A) -> Result<V, Error> + Send + Sync + 'static,
{
    DEFAULT_CONTEXT.selector(compute)
}
