#![forbid(unsafe_code)]

//! Rule-based validation for a single value.
//!
//! # Design
//!
//! Synchronous rules run inline on every value change. Asynchronous rules
//! are handed to a [`ValidationRunner`] and only run when someone drives
//! [`PrimitiveVariableValidator::settle`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use tracing::{debug, trace};
use vartrack_core::{
    Disposable, EventHandler, Subscription, ValidationResult, ValidatorFinishMode, ValidatorState,
    VariableError, VariableResult, VariableValidatedEvent, VariableValidator,
};

use super::PrimitiveValue;
use super::events::ValueChangedEvent;
use super::variable::{PrimitiveVariable, WeakPrimitiveVariable};
use crate::validation::{
    AsyncValidationAction, FinishFn, ValidationAction, ValidationCallback, ValidationRunner,
};

const COMPONENT: &str = "validator";

/// Primitive validator configuration.
pub struct PrimitiveValidatorConfig<T> {
    pub attach: bool,
    pub validate_immediately: bool,
    pub always_finish_sync_validation: bool,
    pub callbacks: ValidationAction<Option<T>>,
    pub async_callbacks: AsyncValidationAction<Option<T>>,
}

impl<T> Default for PrimitiveValidatorConfig<T> {
    fn default() -> Self {
        Self {
            attach: true,
            validate_immediately: true,
            always_finish_sync_validation: false,
            callbacks: ValidationAction::default(),
            async_callbacks: AsyncValidationAction::default(),
        }
    }
}

impl<T: PrimitiveValue> PrimitiveValidatorConfig<T> {
    #[must_use]
    pub fn with_attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }

    #[must_use]
    pub fn with_validate_immediately(mut self, validate: bool) -> Self {
        self.validate_immediately = validate;
        self
    }

    #[must_use]
    pub fn with_always_finish_sync_validation(mut self, finish_sync: bool) -> Self {
        self.always_finish_sync_validation = finish_sync;
        self
    }

    #[must_use]
    pub fn with_callback(
        mut self,
        callback: impl Fn(&Option<T>) -> Option<ValidationResult> + 'static,
    ) -> Self {
        self.callbacks = self.callbacks.with(callback);
        self
    }

    /// Append a prebuilt rule such as those in [`crate::validation::rules`].
    #[must_use]
    pub fn with_rule(mut self, rule: ValidationCallback<Option<T>>) -> Self {
        self.callbacks.push(rule);
        self
    }

    #[must_use]
    pub fn with_async_callback(
        mut self,
        callback: impl Fn(Option<T>) -> LocalBoxFuture<'static, Option<ValidationResult>> + 'static,
    ) -> Self {
        self.async_callbacks = self.async_callbacks.with(callback);
        self
    }
}

impl<T> fmt::Debug for PrimitiveValidatorConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveValidatorConfig")
            .field("attach", &self.attach)
            .field("validate_immediately", &self.validate_immediately)
            .field(
                "always_finish_sync_validation",
                &self.always_finish_sync_validation,
            )
            .field("callbacks", &self.callbacks)
            .field("async_callbacks", &self.async_callbacks)
            .finish()
    }
}

/// Published when a validation run finishes.
#[derive(Debug, Clone)]
pub struct PrimitiveValidatedEvent<T> {
    pub is_valid: bool,
    pub has_warnings: bool,
    pub state: ValidatorState,
    /// The value the rules ran against.
    pub value: Option<T>,
    pub mode: ValidatorFinishMode,
}

struct ValidatorData<T> {
    linked: Option<WeakPrimitiveVariable<T>>,
    requested: Option<Option<T>>,
    state: ValidatorState,
    listener: Option<Subscription>,
    attached: bool,
    disposed: bool,
}

struct ValidatorInner<T> {
    data: RefCell<ValidatorData<T>>,
    on_validated: EventHandler<PrimitiveValidatedEvent<T>>,
    callbacks: ValidationAction<Option<T>>,
    runner: ValidationRunner<Option<T>>,
    validate_immediately: bool,
}

/// Validates a [`PrimitiveVariable`] whenever its value changes.
///
/// Cloning creates another handle to the same validator.
pub struct PrimitiveVariableValidator<T> {
    inner: Rc<ValidatorInner<T>>,
}

impl<T> Clone for PrimitiveVariableValidator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for PrimitiveVariableValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.borrow();
        f.debug_struct("PrimitiveVariableValidator")
            .field("state", &data.state)
            .field("attached", &data.attached)
            .field("disposed", &data.disposed)
            .finish()
    }
}

impl<T: PrimitiveValue> Default for PrimitiveVariableValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PrimitiveValue> ValidatorInner<T> {
    fn begin_validation(self: &Rc<Self>, value: Option<T>) {
        self.data.borrow_mut().requested = Some(value.clone());
        let sync_result = self.callbacks.run(&value);
        let weak = Rc::downgrade(self);
        let validated = value.clone();
        let finish: FinishFn = Rc::new(move |result, mode| {
            if let Some(inner) = weak.upgrade() {
                inner.finish_validation(validated.clone(), result, mode);
            }
        });
        self.runner.begin(value, sync_result, finish);
    }

    fn finish_validation(
        &self,
        value: Option<T>,
        result: Option<ValidationResult>,
        mode: ValidatorFinishMode,
    ) {
        let event = {
            let mut data = self.data.borrow_mut();
            if data.disposed {
                return;
            }
            data.state = ValidatorState::from(result);
            PrimitiveValidatedEvent {
                is_valid: data.state.is_valid(),
                has_warnings: data.state.has_warnings(),
                state: data.state.clone(),
                value,
                mode,
            }
        };
        trace!(
            is_valid = event.is_valid,
            has_warnings = event.has_warnings,
            %mode,
            "primitive validation finished"
        );
        self.on_validated.publish(&event);
    }

    fn on_value_changed(self: &Rc<Self>, event: &Rc<ValueChangedEvent<T>>) {
        {
            let data = self.data.borrow();
            if !data.attached
                || data.disposed
                || data.requested.as_ref() == Some(&event.current_value)
            {
                return;
            }
        }
        self.begin_validation(event.current_value.clone());
    }
}

impl<T: PrimitiveValue> PrimitiveVariableValidator<T> {
    /// A validator with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PrimitiveValidatorConfig::default())
    }

    #[must_use]
    pub fn with_config(config: PrimitiveValidatorConfig<T>) -> Self {
        Self {
            inner: Rc::new(ValidatorInner {
                data: RefCell::new(ValidatorData {
                    linked: None,
                    requested: None,
                    state: ValidatorState::default(),
                    listener: None,
                    attached: config.attach,
                    disposed: false,
                }),
                on_validated: EventHandler::new(),
                callbacks: config.callbacks,
                runner: ValidationRunner::new(
                    config.async_callbacks,
                    config.always_finish_sync_validation,
                ),
                validate_immediately: config.validate_immediately,
            }),
        }
    }

    /// Bind the validator to `variable` and run the rules if configured to.
    ///
    /// # Errors
    ///
    /// [`VariableError::Disposed`] or [`VariableError::AlreadyConfigured`].
    pub fn configure(&self, variable: &PrimitiveVariable<T>) -> VariableResult<()> {
        {
            let mut data = self.inner.data.borrow_mut();
            if data.disposed {
                return Err(VariableError::Disposed(COMPONENT));
            }
            if data.linked.is_some() {
                return Err(VariableError::AlreadyConfigured(COMPONENT));
            }
            data.linked = Some(variable.downgrade());
        }
        if self.inner.validate_immediately {
            self.inner.begin_validation(variable.value());
        }

        let weak: Weak<ValidatorInner<T>> = Rc::downgrade(&self.inner);
        let listener = variable.events().changed.listen(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_value_changed(event);
            }
        });
        self.inner.data.borrow_mut().listener = Some(listener);
        debug!(is_valid = self.is_valid(), "primitive validator configured");
        Ok(())
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.data.borrow().linked.is_some()
    }

    pub fn on_validated(&self) -> &EventHandler<PrimitiveValidatedEvent<T>> {
        &self.inner.on_validated
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.data.borrow().state.is_valid()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.inner.data.borrow().state.has_warnings()
    }

    #[must_use]
    pub fn state(&self) -> ValidatorState {
        self.inner.data.borrow().state.clone()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.runner.is_busy()
    }

    /// Run the rules against the current value.
    ///
    /// # Panics
    ///
    /// If the validator is disposed or not configured.
    pub fn validate(&self) -> LocalBoxFuture<'static, ()> {
        let variable = {
            let data = self.inner.data.borrow();
            assert!(!data.disposed, "{}", VariableError::Disposed(COMPONENT));
            let linked = data
                .linked
                .as_ref()
                .unwrap_or_else(|| panic!("{}", VariableError::NotConfigured(COMPONENT)));
            linked.upgrade()
        };
        if let Some(variable) = variable {
            self.inner.begin_validation(variable.value());
        }
        self.inner.runner.settle()
    }

    /// Drive pending asynchronous rules to completion.
    pub fn settle(&self) -> LocalBoxFuture<'static, ()> {
        self.inner.runner.settle()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.data.borrow().attached
    }

    /// Resume reacting to value changes and revalidate.
    ///
    /// # Panics
    ///
    /// If the validator is disposed.
    pub fn attach(&self) -> LocalBoxFuture<'static, ()> {
        {
            let mut data = self.inner.data.borrow_mut();
            assert!(!data.disposed, "{}", VariableError::Disposed(COMPONENT));
            if data.attached {
                return self.inner.runner.settle();
            }
            data.attached = true;
        }
        self.validate()
    }

    /// # Panics
    ///
    /// If the validator is disposed.
    pub fn detach(&self) {
        let mut data = self.inner.data.borrow_mut();
        assert!(!data.disposed, "{}", VariableError::Disposed(COMPONENT));
        data.attached = false;
    }

    pub fn dispose(&self) {
        let listener = {
            let mut data = self.inner.data.borrow_mut();
            if data.disposed {
                return;
            }
            data.disposed = true;
            data.attached = false;
            data.linked = None;
            data.requested = None;
            data.state = ValidatorState::default();
            data.listener.take()
        };
        drop(listener);
        self.inner.runner.clear();
        self.inner.on_validated.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.data.borrow().disposed
    }
}

impl<T: PrimitiveValue> VariableValidator for PrimitiveVariableValidator<T> {
    fn is_valid(&self) -> bool {
        Self::is_valid(self)
    }

    fn has_warnings(&self) -> bool {
        Self::has_warnings(self)
    }

    fn state(&self) -> ValidatorState {
        Self::state(self)
    }

    fn is_busy(&self) -> bool {
        Self::is_busy(self)
    }

    fn listen_validated(&self, listener: Box<dyn Fn(&VariableValidatedEvent)>) -> Subscription {
        self.inner.on_validated.listen(move |event| {
            listener(&VariableValidatedEvent::new(
                event.is_valid,
                event.has_warnings,
                event.state.clone(),
            ));
        })
    }
}

impl<T: PrimitiveValue> Disposable for PrimitiveVariableValidator<T> {
    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}
