#![forbid(unsafe_code)]

//! Errors for misuse of variables, trackers, validators, and collections.

use std::fmt;

/// Misuse of a variable component or a keyed collection.
///
/// Data invalidity is never reported through this type; it is queryable
/// validator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    /// The component was already bound to a variable.
    AlreadyConfigured(&'static str),
    /// The component was used after being disposed.
    Disposed(&'static str),
    /// The component was used before being bound to a variable.
    NotConfigured(&'static str),
    /// A secondary lookup with this name does not exist.
    UnknownLookup(String),
    /// A key expected to be present was not found.
    MissingKey(String),
}

impl fmt::Display for VariableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConfigured(component) => {
                write!(f, "{component} has already been configured")
            }
            Self::Disposed(component) => write!(f, "{component} has been disposed"),
            Self::NotConfigured(component) => write!(f, "{component} hasn't been configured"),
            Self::UnknownLookup(name) => write!(f, "lookup '{name}' does not exist"),
            Self::MissingKey(key) => write!(f, "key {key} does not exist"),
        }
    }
}

impl std::error::Error for VariableError {}

/// Convenience alias for results carrying a [`VariableError`].
pub type VariableResult<T> = Result<T, VariableError>;
