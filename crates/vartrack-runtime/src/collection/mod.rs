#![forbid(unsafe_code)]

//! Collection variables and their components.
//!
//! - [`variable`]: [`CollectionVariable`], the mutation protocol and events.
//! - [`indexed`]: positional storage kept in step with the keyed snapshot.
//! - [`change_tracker`]: per-key change classification against a baseline.
//! - [`validator`]: own rules plus aggregation of nested element validity.

pub mod change_tracker;
pub mod changes;
pub mod events;
pub mod indexed;
pub mod validator;
pub mod variable;

pub use change_tracker::{ChangeTrackerConfig, CollectionVariableChangeTracker};
pub use changes::{
    CollectionChangeEvent, ElementChange, ElementChangeType, ElementComparer, ElementEquality,
};
pub use events::{
    AddingElementsEvent, CancellableElements, CancellableEvent, CollectionMutation,
    ElementsAddedEvent, ElementsRemovedEvent, ElementsReplacedEvent, ElementsSetEvent,
    RecreateCancellationReason, RecreateCancelledEvent, RecreatedEvent, RecreatingEvent,
    RecreationSource, RemovingElementsEvent, ReplacingElementsEvent, SettingElementsEvent,
};
pub use indexed::IndexedCollection;
pub use validator::{
    CollectionValidatedEvent, CollectionValidatorState, CollectionVariableValidator,
    ElementValidatedEvent, ElementValidatorState, ValidatorConfig,
};
pub use variable::{CollectionVariable, CollectionVariableParams, ElementMapper};
