//! Error types for observer construction and selector evaluation.

use std::fmt;

/// Errors surfaced by the engine.
///
/// The two arity variants are contract checks on the dynamic observer
/// surface; the typed constructors make both conditions unrepresentable.
/// User failures inside selector computes travel as [`Error::User`] and
/// propagate to the caller unchanged — they are never cached.
#[derive(Debug)]
pub enum Error {
    /// A dynamic observer was constructed with a reader declaring more
    /// than two parameters (state plus an optional argument).
    ReaderArity,

    /// A dynamic observer was invoked with more than one argument.
    InvocationArity,

    /// A user compute function failed.
    ///
    /// Any `std::error::Error` converts into this variant via
    /// `anyhow::Error`, so computes compose with the `?` operator.
    User(anyhow::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ReaderArity => {
                write!(f, "Observer methods cannot receive more than two arguments")
            }
            Error::InvocationArity => {
                write!(f, "Observer methods cannot be invoked with more than one argument")
            }
            Error::User(source) => write!(f, "{source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::User(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::User(source)
    }
}
