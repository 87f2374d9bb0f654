#![forbid(unsafe_code)]

//! Runtime: change-tracked, validated variables.
//!
//! # Role in vartrack
//! `vartrack-runtime` implements the variable kinds on top of the contracts
//! in `vartrack-core`. Everything here is single-threaded: handles are
//! `Rc`-based and events dispatch synchronously on the caller's stack.
//!
//! # Primary responsibilities
//! - **CollectionVariable**: keyed collection with cancellable
//!   add/remove/replace/set/recreate operations.
//! - **Change tracking**: per-key classification against an original
//!   snapshot, recursing into elements that are variables themselves.
//! - **Validation**: synchronous and asynchronous rules, plus aggregation of
//!   nested element validity.
//! - **PrimitiveVariable**: the single-value variable, usable as a nested
//!   collection element.
//!
//! # How it fits in the system
//! UI bindings subscribe to the `on_*` events and read the tracker and
//! validator state. Asynchronous rules only make progress when the caller
//! drives the future returned by `settle()` or `validate()`.

pub mod collection;
pub mod primitive;
pub mod validation;

pub use collection::{
    ChangeTrackerConfig, CollectionVariable, CollectionVariableChangeTracker,
    CollectionVariableParams, CollectionVariableValidator, ValidatorConfig,
};
pub use primitive::{
    PrimitiveChangeTrackerConfig, PrimitiveValidatorConfig, PrimitiveVariable,
    PrimitiveVariableParams,
};
pub use validation::{AsyncValidationAction, ValidationAction, ValidationRunner};
