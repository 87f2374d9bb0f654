#![forbid(unsafe_code)]

//! Core: event hub, keyed collections, and the variable capability contracts.
//!
//! # Role in vartrack
//! `vartrack-core` holds the leaf types every variable kind shares. It has no
//! tracking or validation logic of its own; `vartrack-runtime` builds the
//! collection and primitive variables on top of it.
//!
//! # Primary responsibilities
//! - **EventHandler**: synchronous multicast publish/subscribe with RAII
//!   [`Subscription`] handles.
//! - **KeyedCollection**: ordered unique-key map with secondary lookups.
//! - **Capabilities**: [`Element`], [`Variable`], [`VariableChangeTracker`],
//!   [`VariableValidator`], [`Disposable`].
//! - **Validation data**: [`ValidationResult`], [`ValidatorState`].

pub mod error;
pub mod event;
pub mod keyed;
pub mod update_ref;
pub mod validation;
pub mod variable;

pub use error::{VariableError, VariableResult};
pub use event::{EventHandler, Subscription};
pub use keyed::{CollectionKey, CollectionSchema, KeyedCollection, LookupDefinition};
pub use update_ref::UpdateRef;
pub use validation::{
    ValidationResult, ValidatorFinishMode, ValidatorState, VariableValidatedEvent,
};
pub use variable::{
    Disposable, Element, Variable, VariableChangeEvent, VariableChangeTracker, VariableValidator,
};
