#![forbid(unsafe_code)]

//! Capability contracts shared by every variable kind.
//!
//! # Design
//!
//! A container never inspects concrete element types. Instead each element
//! type implements [`Element`] and opts into the capabilities it has:
//! [`Element::as_variable`] exposes a nested change tracker and validator,
//! [`Element::as_disposable`] lets the container release it. Plain values
//! use the default implementations and are treated as opaque data.
//!
//! Change payloads cross the nested boundary as `Rc<dyn Any>` so a container
//! can carry a child's typed changes without knowing the child's type.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::event::Subscription;
use crate::validation::{ValidatorState, VariableValidatedEvent};

/// Something that owns subscriptions or resources and can be released.
pub trait Disposable {
    /// Release everything. Calling this more than once is a no-op.
    fn dispose(&self);

    /// Whether [`dispose`](Self::dispose) has been called.
    fn is_disposed(&self) -> bool;
}

/// Type-erased change notification from a nested variable's tracker.
#[derive(Clone)]
pub struct VariableChangeEvent {
    /// Whether the tracker reports any change after this event.
    pub has_changed: bool,
    /// The tracker's change payload after this event.
    pub changes: Option<Rc<dyn Any>>,
    /// The tracker's own typed event.
    pub source: Rc<dyn Any>,
}

impl fmt::Debug for VariableChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableChangeEvent")
            .field("has_changed", &self.has_changed)
            .field("has_payload", &self.changes.is_some())
            .finish_non_exhaustive()
    }
}

/// Object-safe view of a change tracker.
pub trait VariableChangeTracker {
    /// Whether the current value differs from the original value.
    fn has_changed(&self) -> bool;

    /// Typed change payload; `None` when nothing changed.
    fn changes(&self) -> Option<Rc<dyn Any>>;

    /// Observe change notifications.
    fn listen_change(&self, listener: Box<dyn Fn(&VariableChangeEvent)>) -> Subscription;

    /// Recompute changes from scratch and notify listeners.
    fn detect_changes(&self);

    /// Whether the tracker reacts to variable events.
    fn is_attached(&self) -> bool;

    /// Resume reacting to variable events and resynchronize.
    fn attach(&self);

    /// Stop reacting to variable events.
    fn detach(&self);
}

/// Object-safe view of a validator.
pub trait VariableValidator {
    /// Whether the latest state has no errors, nested ones included.
    fn is_valid(&self) -> bool;

    /// Whether the latest state has warnings, nested ones included.
    fn has_warnings(&self) -> bool;

    /// Snapshot of the validator's own state.
    fn state(&self) -> ValidatorState;

    /// Whether a validation run is in flight or pending.
    fn is_busy(&self) -> bool;

    /// Observe finished validation runs.
    fn listen_validated(&self, listener: Box<dyn Fn(&VariableValidatedEvent)>) -> Subscription;
}

/// A reactive value with a change tracker and a validator.
pub trait Variable {
    /// The variable's change tracker.
    fn change_tracker(&self) -> &dyn VariableChangeTracker;

    /// The variable's validator.
    fn validator(&self) -> &dyn VariableValidator;

    /// Restore the original value.
    fn reset(&self);
}

/// A value that can be stored in a collection variable.
pub trait Element: 'static {
    /// The nested variable contract, if this element is a variable.
    fn as_variable(&self) -> Option<&dyn Variable> {
        None
    }

    /// The disposal contract, if this element owns resources.
    fn as_disposable(&self) -> Option<&dyn Disposable> {
        None
    }
}

/// Implement [`Element`] with no capabilities for the given types.
#[macro_export]
macro_rules! plain_element {
    ($($ty:ty),* $(,)?) => {
        $(impl $crate::variable::Element for $ty {})*
    };
}

plain_element!(
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
);

impl<T: Element> Element for Option<T> {
    fn as_variable(&self) -> Option<&dyn Variable> {
        self.as_ref().and_then(Element::as_variable)
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        self.as_ref().and_then(Element::as_disposable)
    }
}
