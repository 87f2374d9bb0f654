#![forbid(unsafe_code)]

//! A single optional value with change tracking and validation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;
use vartrack_core::{
    Disposable, Element, EventHandler, Variable, VariableChangeTracker, VariableResult,
    VariableValidator,
};

use super::PrimitiveValue;
use super::change_tracker::{PrimitiveChangeTrackerConfig, PrimitiveVariableChangeTracker};
use super::events::{
    ValueChangeCancellationReason, ValueChangeCancelledEvent, ValueChangeSource,
    ValueChangedEvent, ValueChangingEvent,
};
use super::validator::{PrimitiveValidatorConfig, PrimitiveVariableValidator};

/// Maps the original value to the value `reset` stores.
pub type ValueMapper<T> = Rc<dyn Fn(&Option<T>) -> Option<T>>;

/// Construction parameters for [`PrimitiveVariable`].
pub struct PrimitiveVariableParams<T> {
    pub value: Option<T>,
    pub change_tracker: Option<PrimitiveVariableChangeTracker<T>>,
    pub validator: Option<PrimitiveVariableValidator<T>>,
    /// Used by `reset`; identity when absent.
    pub reset_mapper: Option<ValueMapper<T>>,
}

impl<T: PrimitiveValue> PrimitiveVariableParams<T> {
    #[must_use]
    pub fn new(value: Option<T>) -> Self {
        Self {
            value,
            change_tracker: None,
            validator: None,
            reset_mapper: None,
        }
    }

    #[must_use]
    pub fn with_change_tracker(mut self, tracker: PrimitiveVariableChangeTracker<T>) -> Self {
        self.change_tracker = Some(tracker);
        self
    }

    #[must_use]
    pub fn with_change_tracker_config(self, config: PrimitiveChangeTrackerConfig<T>) -> Self {
        self.with_change_tracker(PrimitiveVariableChangeTracker::with_config(config))
    }

    #[must_use]
    pub fn with_validator(mut self, validator: PrimitiveVariableValidator<T>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_validator_config(self, config: PrimitiveValidatorConfig<T>) -> Self {
        self.with_validator(PrimitiveVariableValidator::with_config(config))
    }

    #[must_use]
    pub fn with_reset_mapper(mut self, mapper: impl Fn(&Option<T>) -> Option<T> + 'static) -> Self {
        self.reset_mapper = Some(Rc::new(mapper));
        self
    }
}

fn identity_mapper<T: PrimitiveValue>() -> ValueMapper<T> {
    Rc::new(|value: &Option<T>| value.clone())
}

impl<T: PrimitiveValue> Default for PrimitiveVariableParams<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

pub(crate) struct PrimitiveEvents<T> {
    pub(crate) changing: EventHandler<ValueChangingEvent<T>>,
    pub(crate) changed: EventHandler<Rc<ValueChangedEvent<T>>>,
    pub(crate) change_cancelled: EventHandler<ValueChangeCancelledEvent<T>>,
}

struct PrimitiveInner<T> {
    value: RefCell<Option<T>>,
    events: PrimitiveEvents<T>,
    tracker: PrimitiveVariableChangeTracker<T>,
    validator: PrimitiveVariableValidator<T>,
    reset_mapper: ValueMapper<T>,
    disposed: Cell<bool>,
}

/// A change-tracked, validated optional value.
///
/// Cloning creates another handle to the same variable.
pub struct PrimitiveVariable<T> {
    inner: Rc<PrimitiveInner<T>>,
}

impl<T> Clone for PrimitiveVariable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PrimitiveVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveVariable")
            .field("value", &self.inner.value.borrow())
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}

pub(crate) struct WeakPrimitiveVariable<T> {
    inner: Weak<PrimitiveInner<T>>,
}

impl<T> WeakPrimitiveVariable<T> {
    pub(crate) fn upgrade(&self) -> Option<PrimitiveVariable<T>> {
        self.inner.upgrade().map(|inner| PrimitiveVariable { inner })
    }
}

impl<T: PrimitiveValue> PrimitiveVariable<T> {
    /// Build the variable and configure its tracker and validator.
    ///
    /// # Errors
    ///
    /// Whatever configuring the supplied tracker or validator reports.
    pub fn try_new(params: PrimitiveVariableParams<T>) -> VariableResult<Self> {
        let variable = Self {
            inner: Rc::new(PrimitiveInner {
                value: RefCell::new(params.value),
                events: PrimitiveEvents {
                    changing: EventHandler::new(),
                    changed: EventHandler::new(),
                    change_cancelled: EventHandler::new(),
                },
                tracker: params.change_tracker.unwrap_or_default(),
                validator: params.validator.unwrap_or_default(),
                reset_mapper: params.reset_mapper.unwrap_or_else(identity_mapper),
                disposed: Cell::new(false),
            }),
        };
        variable.inner.tracker.configure(&variable)?;
        variable.inner.validator.configure(&variable)?;
        Ok(variable)
    }

    /// Build the variable.
    ///
    /// # Panics
    ///
    /// If the supplied tracker or validator is already configured or
    /// disposed.
    #[must_use]
    pub fn new(params: PrimitiveVariableParams<T>) -> Self {
        match Self::try_new(params) {
            Ok(variable) => variable,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakPrimitiveVariable<T> {
        WeakPrimitiveVariable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn events(&self) -> &PrimitiveEvents<T> {
        &self.inner.events
    }

    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// The tracker's baseline.
    #[must_use]
    pub fn original_value(&self) -> Option<T> {
        self.inner.tracker.original_value()
    }

    pub fn change_tracker(&self) -> &PrimitiveVariableChangeTracker<T> {
        &self.inner.tracker
    }

    pub fn validator(&self) -> &PrimitiveVariableValidator<T> {
        &self.inner.validator
    }

    pub fn on_value_changing(&self) -> &EventHandler<ValueChangingEvent<T>> {
        &self.inner.events.changing
    }

    pub fn on_value_changed(&self) -> &EventHandler<Rc<ValueChangedEvent<T>>> {
        &self.inner.events.changed
    }

    pub fn on_value_change_cancelled(&self) -> &EventHandler<ValueChangeCancelledEvent<T>> {
        &self.inner.events.change_cancelled
    }

    /// Store `value` unconditionally.
    pub fn update(&self, value: Option<T>) {
        self.set_value(value, ValueChangeSource::Update);
    }

    /// Store `value` unless it equals the current value or a changing
    /// listener cancels. Returns whether it was stored.
    pub fn try_update(&self, value: Option<T>) -> bool {
        let current = self.value();
        if self.inner.tracker.are_equal(current.as_ref(), value.as_ref()) {
            self.cancel_update(current, value, ValueChangeCancellationReason::EqualityComparison);
            return false;
        }

        let event = ValueChangingEvent::new(self.original_value(), current.clone(), value.clone());
        self.inner.events.changing.publish(&event);
        if event.is_cancelled() {
            self.cancel_update(current, value, ValueChangeCancellationReason::OnChangingEvent);
            return false;
        }

        self.set_value(value, ValueChangeSource::TryUpdate);
        true
    }

    /// Store the original value through the reset mapper.
    pub fn reset(&self) {
        let value = (self.inner.reset_mapper)(&self.original_value());
        self.set_value(value, ValueChangeSource::Reset);
    }

    fn cancel_update(
        &self,
        current: Option<T>,
        cancelled: Option<T>,
        reason: ValueChangeCancellationReason,
    ) {
        debug!(?reason, "value update cancelled");
        self.inner
            .events
            .change_cancelled
            .publish(&ValueChangeCancelledEvent {
                original_value: self.original_value(),
                current_value: current,
                cancelled_value: cancelled,
                reason,
            });
    }

    fn set_value(&self, value: Option<T>, source: ValueChangeSource) {
        let previous = self.inner.value.replace(value.clone());
        debug!(%source, "value changed");
        let event = Rc::new(ValueChangedEvent {
            original_value: self.original_value(),
            previous_value: previous,
            current_value: value,
            source,
        });
        self.inner.events.changed.publish(&event);
    }

    /// Dispose events, tracker and validator. Repeated calls are no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.events.changing.dispose();
        self.inner.events.changed.dispose();
        self.inner.events.change_cancelled.dispose();
        self.inner.tracker.dispose();
        self.inner.validator.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T: PrimitiveValue> Disposable for PrimitiveVariable<T> {
    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}

impl<T: PrimitiveValue> Variable for PrimitiveVariable<T> {
    fn change_tracker(&self) -> &dyn VariableChangeTracker {
        &self.inner.tracker
    }

    fn validator(&self) -> &dyn VariableValidator {
        &self.inner.validator
    }

    fn reset(&self) {
        Self::reset(self);
    }
}

impl<T: PrimitiveValue> Element for PrimitiveVariable<T> {
    fn as_variable(&self) -> Option<&dyn Variable> {
        Some(self)
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> PrimitiveVariable<i64> {
        PrimitiveVariable::new(PrimitiveVariableParams::new(Some(1)))
    }

    #[test]
    fn update_publishes_previous_and_current() {
        let var = counter();
        let seen: Rc<RefCell<Vec<(Option<i64>, Option<i64>, ValueChangeSource)>>> = Rc::default();
        let seen_clone = Rc::clone(&seen);
        let _sub = var.on_value_changed().listen(move |e| {
            seen_clone
                .borrow_mut()
                .push((e.previous_value, e.current_value, e.source));
        });

        var.update(Some(2));
        var.update(None);

        assert_eq!(
            *seen.borrow(),
            vec![
                (Some(1), Some(2), ValueChangeSource::Update),
                (Some(2), None, ValueChangeSource::Update),
            ]
        );
    }

    #[test]
    fn try_update_cancellation_reasons() {
        let var = counter();
        let reasons: Rc<RefCell<Vec<ValueChangeCancellationReason>>> = Rc::default();
        let reasons_clone = Rc::clone(&reasons);
        let _cancelled = var
            .on_value_change_cancelled()
            .listen(move |e| reasons_clone.borrow_mut().push(e.reason));

        assert!(!var.try_update(Some(1)));
        let veto = var.on_value_changing().listen(|e| {
            if e.next_value == Some(13) {
                e.cancel();
            }
        });
        assert!(!var.try_update(Some(13)));
        assert!(var.try_update(Some(7)));
        drop(veto);

        assert_eq!(var.value(), Some(7));
        assert_eq!(
            *reasons.borrow(),
            vec![
                ValueChangeCancellationReason::EqualityComparison,
                ValueChangeCancellationReason::OnChangingEvent,
            ]
        );
    }

    #[test]
    fn reset_uses_mapper() {
        let var = PrimitiveVariable::new(
            PrimitiveVariableParams::new(Some(10)).with_reset_mapper(|v: &Option<i64>| v.map(|v| v * 2)),
        );
        var.update(Some(3));
        var.reset();

        assert_eq!(var.value(), Some(20));
        assert!(var.change_tracker().has_changed());
    }

    #[test]
    fn shared_tracker_is_rejected() {
        let first = counter();
        let result = PrimitiveVariable::try_new(
            PrimitiveVariableParams::new(Some(0)).with_change_tracker(first.change_tracker().clone()),
        );
        assert_eq!(
            result.err(),
            Some(vartrack_core::VariableError::AlreadyConfigured("change tracker"))
        );
    }

    #[test]
    fn dispose_cascades() {
        let var = counter();
        var.dispose();
        var.dispose();

        assert!(var.is_disposed());
        assert!(var.change_tracker().is_disposed());
        assert!(var.validator().is_disposed());
    }
}
