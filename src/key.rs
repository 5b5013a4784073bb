//! Cache keys and argument serialization.
//!
//! Selector arguments are lowered to a sequence of [`serde_json::Value`]s
//! and serialized into a [`CacheKey`]. Observer keys are strings of the
//! form `"id"` (no argument) or `"id:<json>"` — strings render quoted in
//! JSON, so a string argument can never collide with a stringified number.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A selector cache key produced from an argument tuple.
///
/// `Empty` is the sentinel for a zero-argument invocation. It is a
/// distinct variant rather than a reserved string, so `sel()` and
/// `sel("")` can never share a slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    /// Zero-argument invocation.
    Empty,
    /// Serialized arguments.
    Text(String),
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Empty => write!(f, "()"),
            CacheKey::Text(text) => write!(f, "{text}"),
        }
    }
}

/// True for values whose plain stringification is unambiguous: numbers,
/// booleans and null. Strings are excluded — `"5"` must not collide with
/// the number `5`.
fn is_plain_primitive(value: &Value) -> bool {
    value.is_number() || value.is_boolean() || value.is_null()
}

/// Default serializer: empty tuple → sentinel; a single non-string
/// primitive → its stringification; everything else → compact JSON of
/// the argument sequence.
pub fn default_serialize(args: &[Value]) -> CacheKey {
    match args {
        [] => CacheKey::Empty,
        [value] if is_plain_primitive(value) => CacheKey::Text(value.to_string()),
        _ => CacheKey::Text(Value::Array(args.to_vec()).to_string()),
    }
}

/// Build the observer key for an `(id, argument)` pair.
///
/// `Value`'s `Display` is compact JSON, which coincides with the plain
/// stringification for numbers, booleans and null, and quotes strings.
pub(crate) fn observer_key(id: u64, arg: Option<&Value>) -> String {
    match arg {
        None => id.to_string(),
        Some(value) => format!("{id}:{value}"),
    }
}

pub(crate) fn lower_arg<A: Serialize>(arg: &A) -> Value {
    serde_json::to_value(arg).unwrap_or(Value::Null)
}

/// Argument tuples accepted by selectors.
///
/// Implemented for `()`, common scalars, and tuples of up to four
/// `Serialize` elements. `to_values` lowers the tuple into the value
/// sequence handed to the serializer.
pub trait SelectorArgs: Clone + Send + Sync + 'static {
    /// Lower the arguments to a sequence of JSON values.
    fn to_values(&self) -> Vec<Value>;
}

impl SelectorArgs for () {
    fn to_values(&self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! scalar_args {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SelectorArgs for $ty {
                fn to_values(&self) -> Vec<Value> {
                    vec![lower_arg(self)]
                }
            }
        )*
    };
}

scalar_args!(i32, i64, u32, u64, usize, f32, f64, bool, String, &'static str);

macro_rules! tuple_args {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name),+> SelectorArgs for ($($name,)+)
        where
            $($name: Serialize + Clone + Send + Sync + 'static),+
        {
            fn to_values(&self) -> Vec<Value> {
                vec![$(lower_arg(&self.$idx)),+]
            }
        }
    };
}

tuple_args!(A0: 0);
tuple_args!(A0: 0, A1: 1);
tuple_args!(A0: 0, A1: 1, A2: 2);
tuple_args!(A0: 0, A1: 1, A2: 2, A3: 3);
