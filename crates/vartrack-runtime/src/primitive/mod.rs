#![forbid(unsafe_code)]

//! Primitive variables: one optional value, tracked and validated.
//!
//! A [`PrimitiveVariable`] implements the nested-variable contract, so a
//! collection of them aggregates their change and validity state.

pub mod change_tracker;
pub mod events;
pub mod validator;
pub mod variable;

pub use change_tracker::{
    PrimitiveChangeEvent, PrimitiveChangeTrackerConfig, PrimitiveChanges,
    PrimitiveVariableChangeTracker, ValueComparer,
};
pub use events::{
    ValueChangeCancellationReason, ValueChangeCancelledEvent, ValueChangeSource,
    ValueChangedEvent, ValueChangingEvent,
};
pub use validator::{PrimitiveValidatedEvent, PrimitiveValidatorConfig, PrimitiveVariableValidator};
pub use variable::{PrimitiveVariable, PrimitiveVariableParams, ValueMapper};

/// Bounds for values held by a [`PrimitiveVariable`].
pub trait PrimitiveValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> PrimitiveValue for T {}
