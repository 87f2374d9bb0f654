#![forbid(unsafe_code)]

//! Validation callbacks, the skippable async runner, and rule builders.

pub mod action;
pub mod rules;
pub mod runner;

pub use action::{AsyncValidationAction, AsyncValidationCallback, ValidationAction, ValidationCallback};
pub use runner::{FinishFn, ValidationRunner};
