#![forbid(unsafe_code)]

//! Collection-level validity aggregated from rules and nested elements.
//!
//! # Design
//!
//! The validator keeps two key-indexed maps, one for elements whose own
//! validator reports errors and one for elements reporting warnings. Only
//! elements that are variables ever enter them. The maps are kept live by
//! subscribing to every nested validator, and are re-derived from the
//! variable's "-ed" events: additions and replacements resubscribe just the
//! affected keys, removals drop them, and a recreation rebuilds every
//! subscription from scratch.
//!
//! The collection's own rules run through a [`ValidationRunner`]: the
//! synchronous callbacks are evaluated on the spot, the asynchronous ones
//! are coalesced and run when [`CollectionVariableValidator::settle`] (or the
//! future returned by `validate`) is polled.
//!
//! # Invariants
//!
//! 1. `is_valid()` ⟺ the own state has no errors and no element is invalid.
//! 2. `has_warnings()` ⟺ the own state has warnings or some element has.
//! 3. A key is present in a map only while its element is in the collection.
//!
//! # Failure Modes
//!
//! - **Undriven async rules**: `is_busy()` stays true and no final
//!   `Async` validated event is published until someone awaits `settle()`.
//! - **Misuse**: `validate`, `attach` and `detach` panic on a disposed
//!   validator, and `validate` also on an unconfigured one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use tracing::{debug, trace};
use vartrack_core::{
    CollectionKey, Disposable, Element, EventHandler, KeyedCollection, Subscription,
    ValidationResult, ValidatorFinishMode, ValidatorState, VariableError, VariableResult,
    VariableValidatedEvent, VariableValidator,
};

use super::events::{
    CollectionMutation, ElementsAddedEvent, ElementsRemovedEvent, ElementsReplacedEvent,
    ElementsSetEvent, RecreatedEvent,
};
use super::variable::{CollectionVariable, WeakCollectionVariable};
use crate::validation::{AsyncValidationAction, FinishFn, ValidationAction, ValidationRunner};

const COMPONENT: &str = "validator";

type Snapshot<K, E> = Rc<KeyedCollection<K, E>>;

/// Collection validator configuration.
pub struct ValidatorConfig<K, E> {
    /// React to variable events right after configuration.
    pub attach: bool,
    /// Run the rules as part of configuration.
    pub validate_immediately: bool,
    /// Aggregate the validators of elements that are variables.
    pub listen_to_internal_changes: bool,
    /// Publish the synchronous result before asynchronous rules finish.
    pub always_finish_sync_validation: bool,
    pub callbacks: ValidationAction<KeyedCollection<K, E>>,
    pub async_callbacks: AsyncValidationAction<Snapshot<K, E>>,
}

impl<K, E> Default for ValidatorConfig<K, E> {
    fn default() -> Self {
        Self {
            attach: true,
            validate_immediately: true,
            listen_to_internal_changes: true,
            always_finish_sync_validation: false,
            callbacks: ValidationAction::default(),
            async_callbacks: AsyncValidationAction::default(),
        }
    }
}

impl<K: CollectionKey, E: Element> ValidatorConfig<K, E> {
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
    pub fn with_listen_to_internal_changes(mut self, listen: bool) -> Self {
        self.listen_to_internal_changes = listen;
        self
    }

    #[must_use]
    pub fn with_always_finish_sync_validation(mut self, finish_sync: bool) -> Self {
        self.always_finish_sync_validation = finish_sync;
        self
    }

    /// Append a synchronous rule over the whole collection.
    #[must_use]
    pub fn with_callback(
        mut self,
        callback: impl Fn(&KeyedCollection<K, E>) -> Option<ValidationResult> + 'static,
    ) -> Self {
        self.callbacks = self.callbacks.with(callback);
        self
    }

    /// Append an asynchronous rule over a collection snapshot.
    #[must_use]
    pub fn with_async_callback(
        mut self,
        callback: impl Fn(Snapshot<K, E>) -> LocalBoxFuture<'static, Option<ValidationResult>> + 'static,
    ) -> Self {
        self.async_callbacks = self.async_callbacks.with(callback);
        self
    }
}

impl<K, E> fmt::Debug for ValidatorConfig<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("attach", &self.attach)
            .field("validate_immediately", &self.validate_immediately)
            .field("listen_to_internal_changes", &self.listen_to_internal_changes)
            .field("always_finish_sync_validation", &self.always_finish_sync_validation)
            .field("callbacks", &self.callbacks)
            .field("async_callbacks", &self.async_callbacks)
            .finish()
    }
}

/// Snapshot of one element's validator, stored under its key.
pub struct ElementValidatorState<K, E> {
    pub key: K,
    pub element: Rc<E>,
    pub state: ValidatorState,
}

impl<K: Clone, E> Clone for ElementValidatorState<K, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            element: Rc::clone(&self.element),
            state: self.state.clone(),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for ElementValidatorState<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementValidatorState")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Full validator snapshot: own rule state plus element maps.
pub struct CollectionValidatorState<K, E> {
    pub own: ValidatorState,
    pub invalid_elements: Vec<ElementValidatorState<K, E>>,
    pub elements_with_warnings: Vec<ElementValidatorState<K, E>>,
}

impl<K: Clone, E> Clone for CollectionValidatorState<K, E> {
    fn clone(&self) -> Self {
        Self {
            own: self.own.clone(),
            invalid_elements: self.invalid_elements.clone(),
            elements_with_warnings: self.elements_with_warnings.clone(),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CollectionValidatorState<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionValidatorState")
            .field("own", &self.own)
            .field("invalid_elements", &self.invalid_elements)
            .field("elements_with_warnings", &self.elements_with_warnings)
            .finish()
    }
}

/// Republished validation of a nested element.
pub struct ElementValidatedEvent<K, E> {
    pub key: K,
    pub element: Rc<E>,
    /// Whether the element moved into or out of the invalid map.
    pub has_validity_changed: bool,
    /// Collection-level validity after the update.
    pub is_valid: bool,
    /// Collection-level warning presence after the update.
    pub has_warnings: bool,
    /// The collection's own rule state.
    pub state: ValidatorState,
    /// The element validator's event.
    pub source: VariableValidatedEvent,
}

/// Published by a [`CollectionVariableValidator`].
pub enum CollectionValidatedEvent<K, E> {
    /// A rule run finished. `source` is the mutation that triggered it,
    /// `None` for configuration and explicit validation.
    Collection {
        is_valid: bool,
        has_warnings: bool,
        state: ValidatorState,
        mode: ValidatorFinishMode,
        source: Option<CollectionMutation<K, E>>,
    },
    /// A nested element's validator finished.
    Element(ElementValidatedEvent<K, E>),
}

impl<K, E> CollectionValidatedEvent<K, E> {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Collection { is_valid, .. } => *is_valid,
            Self::Element(event) => event.is_valid,
        }
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        match self {
            Self::Collection { has_warnings, .. } => *has_warnings,
            Self::Element(event) => event.has_warnings,
        }
    }

    /// The collection's own rule state carried by the event.
    pub fn state(&self) -> &ValidatorState {
        match self {
            Self::Collection { state, .. } => state,
            Self::Element(event) => &event.state,
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CollectionValidatedEvent<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection {
                is_valid,
                has_warnings,
                state,
                mode,
                source,
            } => f
                .debug_struct("Collection")
                .field("is_valid", is_valid)
                .field("has_warnings", has_warnings)
                .field("state", state)
                .field("mode", mode)
                .field("source", &source.as_ref().map(CollectionMutation::kind))
                .finish(),
            Self::Element(event) => f
                .debug_struct("Element")
                .field("key", &event.key)
                .field("has_validity_changed", &event.has_validity_changed)
                .field("is_valid", &event.is_valid)
                .field("has_warnings", &event.has_warnings)
                .finish_non_exhaustive(),
        }
    }
}

struct ValidatorData<K, E> {
    linked: Option<WeakCollectionVariable<K, E>>,
    current: Option<Snapshot<K, E>>,
    own: ValidatorState,
    invalid: IndexMap<K, ElementValidatorState<K, E>>,
    warned: IndexMap<K, ElementValidatorState<K, E>>,
    element_listeners: HashMap<K, Subscription>,
    collection_listeners: Vec<Subscription>,
    attached: bool,
    disposed: bool,
}

impl<K: CollectionKey, E> ValidatorData<K, E> {
    fn is_valid(&self) -> bool {
        self.own.is_valid() && self.invalid.is_empty()
    }

    fn has_warnings(&self) -> bool {
        self.own.has_warnings() || !self.warned.is_empty()
    }

    fn forget(&mut self, key: &K) {
        self.invalid.shift_remove(key);
        self.warned.shift_remove(key);
        self.element_listeners.remove(key);
    }
}

struct ValidatorInner<K, E> {
    data: RefCell<ValidatorData<K, E>>,
    on_validated: EventHandler<CollectionValidatedEvent<K, E>>,
    callbacks: ValidationAction<KeyedCollection<K, E>>,
    runner: ValidationRunner<Snapshot<K, E>>,
    validate_immediately: bool,
    listen_to_internal_changes: bool,
}

/// Validates a collection variable and aggregates its elements' validity.
///
/// Cloning creates another handle to the same validator.
pub struct CollectionVariableValidator<K, E> {
    inner: Rc<ValidatorInner<K, E>>,
}

impl<K, E> Clone for CollectionVariableValidator<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CollectionVariableValidator<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.borrow();
        f.debug_struct("CollectionVariableValidator")
            .field("own", &data.own)
            .field("invalid", &data.invalid.keys().collect::<Vec<_>>())
            .field("warned", &data.warned.keys().collect::<Vec<_>>())
            .field("attached", &data.attached)
            .field("disposed", &data.disposed)
            .finish()
    }
}

impl<K: CollectionKey, E: Element> Default for CollectionVariableValidator<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CollectionKey, E: Element> ValidatorInner<K, E> {
    fn is_active(&self) -> bool {
        let data = self.data.borrow();
        data.attached && !data.disposed
    }

    fn add_element(self: &Rc<Self>, data: &mut ValidatorData<K, E>, key: &K, element: &Rc<E>) {
        data.forget(key);
        let Some(validator) = element.as_variable().map(|v| v.validator()) else {
            return;
        };

        let snapshot = || ElementValidatorState {
            key: key.clone(),
            element: Rc::clone(element),
            state: validator.state(),
        };
        if !validator.is_valid() {
            data.invalid.insert(key.clone(), snapshot());
        }
        if validator.has_warnings() {
            data.warned.insert(key.clone(), snapshot());
        }

        let weak_self = Rc::downgrade(self);
        let weak_element = Rc::downgrade(element);
        let listener_key = key.clone();
        let subscription = validator.listen_validated(Box::new(move |event| {
            if let (Some(inner), Some(element)) = (weak_self.upgrade(), weak_element.upgrade()) {
                inner.on_element_validated(&listener_key, &element, event);
            }
        }));
        data.element_listeners.insert(key.clone(), subscription);
    }

    fn rebuild(self: &Rc<Self>, current: &Snapshot<K, E>) {
        let mut data = self.data.borrow_mut();
        data.current = Some(Rc::clone(current));
        if !self.listen_to_internal_changes {
            return;
        }
        data.element_listeners.clear();
        data.invalid.clear();
        data.warned.clear();
        for (key, element) in current.iter() {
            self.add_element(&mut data, key, element);
        }
        debug!(
            elements = current.len(),
            invalid = data.invalid.len(),
            warned = data.warned.len(),
            "validator element state rebuilt"
        );
    }

    fn begin_validation(self: &Rc<Self>, value: Snapshot<K, E>, source: Option<CollectionMutation<K, E>>) {
        let sync_result = self.callbacks.run(&value);
        let weak = Rc::downgrade(self);
        let finish: FinishFn = Rc::new(move |result, mode| {
            if let Some(inner) = weak.upgrade() {
                inner.finish_validation(result, mode, source.clone());
            }
        });
        self.runner.begin(value, sync_result, finish);
    }

    fn finish_validation(
        &self,
        result: Option<ValidationResult>,
        mode: ValidatorFinishMode,
        source: Option<CollectionMutation<K, E>>,
    ) {
        let event = {
            let mut data = self.data.borrow_mut();
            if data.disposed {
                return;
            }
            data.own = ValidatorState::from(result);
            CollectionValidatedEvent::Collection {
                is_valid: data.is_valid(),
                has_warnings: data.has_warnings(),
                state: data.own.clone(),
                mode,
                source,
            }
        };
        trace!(
            is_valid = event.is_valid(),
            has_warnings = event.has_warnings(),
            %mode,
            "collection validation finished"
        );
        self.on_validated.publish(&event);
    }

    fn on_element_validated(&self, key: &K, element: &Rc<E>, event: &VariableValidatedEvent) {
        let published = {
            let mut data = self.data.borrow_mut();
            if !data.attached || data.disposed {
                return;
            }
            let was_valid = !data.invalid.contains_key(key);
            let snapshot = ElementValidatorState {
                key: key.clone(),
                element: Rc::clone(element),
                state: event.state.clone(),
            };
            if event.is_valid {
                data.invalid.shift_remove(key);
            } else {
                data.invalid.insert(key.clone(), snapshot.clone());
            }
            if event.has_warnings {
                data.warned.insert(key.clone(), snapshot);
            } else {
                data.warned.shift_remove(key);
            }
            ElementValidatedEvent {
                key: key.clone(),
                element: Rc::clone(element),
                has_validity_changed: was_valid != event.is_valid,
                is_valid: data.is_valid(),
                has_warnings: data.has_warnings(),
                state: data.own.clone(),
                source: event.clone(),
            }
        };
        trace!(
            key = ?key,
            element_valid = event.is_valid,
            validity_changed = published.has_validity_changed,
            "nested element validated"
        );
        self.on_validated
            .publish(&CollectionValidatedEvent::Element(published));
    }

    fn on_attached<'a>(
        self: &Rc<Self>,
        current: &Snapshot<K, E>,
        elements: impl IntoIterator<Item = &'a Rc<E>>,
        source: CollectionMutation<K, E>,
    ) {
        if !self.is_active() {
            return;
        }
        {
            let mut data = self.data.borrow_mut();
            data.current = Some(Rc::clone(current));
            if self.listen_to_internal_changes {
                for element in elements {
                    self.add_element(&mut data, &current.key_of(element), element);
                }
            }
        }
        self.begin_validation(Rc::clone(current), Some(source));
    }

    fn on_added(self: &Rc<Self>, event: &Rc<ElementsAddedEvent<K, E>>) {
        self.on_attached(
            &event.current_value,
            &event.added_elements,
            CollectionMutation::Added(Rc::clone(event)),
        );
    }

    fn on_replaced(self: &Rc<Self>, event: &Rc<ElementsReplacedEvent<K, E>>) {
        self.on_attached(
            &event.current_value,
            event.replaced_elements.iter().map(|u| &u.value),
            CollectionMutation::Replaced(Rc::clone(event)),
        );
    }

    fn on_set(self: &Rc<Self>, event: &Rc<ElementsSetEvent<K, E>>) {
        self.on_attached(
            &event.current_value,
            event
                .added_elements
                .iter()
                .chain(event.replaced_elements.iter().map(|u| &u.value)),
            CollectionMutation::Set(Rc::clone(event)),
        );
    }

    fn on_removed(self: &Rc<Self>, event: &Rc<ElementsRemovedEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        {
            let mut data = self.data.borrow_mut();
            data.current = Some(Rc::clone(&event.current_value));
            if self.listen_to_internal_changes {
                for element in &event.removed_elements {
                    data.forget(&event.current_value.key_of(element));
                }
            }
        }
        self.begin_validation(
            Rc::clone(&event.current_value),
            Some(CollectionMutation::Removed(Rc::clone(event))),
        );
    }

    fn on_recreated(self: &Rc<Self>, event: &Rc<RecreatedEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        self.rebuild(&event.current_value);
        self.begin_validation(
            Rc::clone(&event.current_value),
            Some(CollectionMutation::Recreated(Rc::clone(event))),
        );
    }

    fn forward<T: 'static>(weak: std::rc::Weak<Self>, handler: fn(&Rc<Self>, &T)) -> impl Fn(&T) + 'static {
        move |event| {
            if let Some(inner) = weak.upgrade() {
                handler(&inner, event);
            }
        }
    }
}

impl<K: CollectionKey, E: Element> CollectionVariableValidator<K, E> {
    /// A validator with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ValidatorConfig<K, E>) -> Self {
        Self {
            inner: Rc::new(ValidatorInner {
                data: RefCell::new(ValidatorData {
                    linked: None,
                    current: None,
                    own: ValidatorState::default(),
                    invalid: IndexMap::new(),
                    warned: IndexMap::new(),
                    element_listeners: HashMap::new(),
                    collection_listeners: Vec::new(),
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
                listen_to_internal_changes: config.listen_to_internal_changes,
            }),
        }
    }

    /// Bind the validator to `variable`, snapshot its elements, and run the
    /// rules if configured to.
    ///
    /// # Errors
    ///
    /// [`VariableError::Disposed`] or [`VariableError::AlreadyConfigured`].
    pub fn configure(&self, variable: &CollectionVariable<K, E>) -> VariableResult<()> {
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

        let value = variable.value();
        self.inner.rebuild(&value);
        if self.inner.validate_immediately {
            self.inner.begin_validation(value, None);
        }

        let weak = Rc::downgrade(&self.inner);
        let events = variable.events();
        let listeners = vec![
            events.added.listen(ValidatorInner::forward(weak.clone(), ValidatorInner::on_added)),
            events.removed.listen(ValidatorInner::forward(weak.clone(), ValidatorInner::on_removed)),
            events.replaced.listen(ValidatorInner::forward(weak.clone(), ValidatorInner::on_replaced)),
            events.set.listen(ValidatorInner::forward(weak.clone(), ValidatorInner::on_set)),
            events.recreated.listen(ValidatorInner::forward(weak, ValidatorInner::on_recreated)),
        ];
        self.inner.data.borrow_mut().collection_listeners = listeners;
        debug!(name = %variable.name(), "collection validator configured");
        Ok(())
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.data.borrow().linked.is_some()
    }

    /// Validated notifications, for both rule runs and nested elements.
    pub fn on_validated(&self) -> &EventHandler<CollectionValidatedEvent<K, E>> {
        &self.inner.on_validated
    }

    /// No own errors and no invalid elements.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.data.borrow().is_valid()
    }

    /// Own warnings or elements with warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.inner.data.borrow().has_warnings()
    }

    /// The collection's own rule state.
    #[must_use]
    pub fn state(&self) -> ValidatorState {
        self.inner.data.borrow().own.clone()
    }

    /// Own state plus element maps.
    #[must_use]
    pub fn snapshot(&self) -> CollectionValidatorState<K, E> {
        let data = self.inner.data.borrow();
        CollectionValidatorState {
            own: data.own.clone(),
            invalid_elements: data.invalid.values().cloned().collect(),
            elements_with_warnings: data.warned.values().cloned().collect(),
        }
    }

    /// Whether asynchronous rules are pending or running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.runner.is_busy()
    }

    /// Current elements not in the invalid map.
    #[must_use]
    pub fn get_valid_elements(&self) -> Vec<Rc<E>> {
        let data = self.inner.data.borrow();
        let Some(current) = &data.current else {
            return Vec::new();
        };
        current
            .iter()
            .filter(|(key, _)| !data.invalid.contains_key(*key))
            .map(|(_, element)| Rc::clone(element))
            .collect()
    }

    #[must_use]
    pub fn get_invalid_elements(&self) -> Vec<Rc<E>> {
        self.inner
            .data
            .borrow()
            .invalid
            .values()
            .map(|s| Rc::clone(&s.element))
            .collect()
    }

    #[must_use]
    pub fn get_elements_with_warnings(&self) -> Vec<Rc<E>> {
        self.inner
            .data
            .borrow()
            .warned
            .values()
            .map(|s| Rc::clone(&s.element))
            .collect()
    }

    /// Rebuild element state and run the rules against the current value.
    ///
    /// Synchronous rules finish before this returns. The returned future
    /// drives the asynchronous ones; dropping it leaves them pending.
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
            let value = variable.value();
            self.inner.rebuild(&value);
            self.inner.begin_validation(value, None);
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

    /// Resume reacting to events and revalidate.
    ///
    /// The returned future drives asynchronous rules, as for `validate`.
    ///
    /// # Panics
    ///
    /// If the validator is disposed or not configured.
    pub fn attach(&self) -> LocalBoxFuture<'static, ()> {
        {
            let mut data = self.inner.data.borrow_mut();
            assert!(!data.disposed, "{}", VariableError::Disposed(COMPONENT));
            if data.attached {
                return self.inner.runner.settle();
            }
            data.attached = true;
        }
        debug!("collection validator attached");
        self.validate()
    }

    /// Stop reacting to mutations and nested validation.
    ///
    /// # Panics
    ///
    /// If the validator is disposed.
    pub fn detach(&self) {
        let mut data = self.inner.data.borrow_mut();
        assert!(!data.disposed, "{}", VariableError::Disposed(COMPONENT));
        data.attached = false;
        debug!("collection validator detached");
    }

    /// Drop every subscription, pending run and element snapshot.
    pub fn dispose(&self) {
        let (collection_listeners, element_listeners) = {
            let mut data = self.inner.data.borrow_mut();
            if data.disposed {
                return;
            }
            data.disposed = true;
            data.attached = false;
            data.linked = None;
            data.current = None;
            data.own = ValidatorState::default();
            data.invalid.clear();
            data.warned.clear();
            (
                std::mem::take(&mut data.collection_listeners),
                std::mem::take(&mut data.element_listeners),
            )
        };
        drop(collection_listeners);
        drop(element_listeners);
        self.inner.runner.clear();
        self.inner.on_validated.dispose();
        debug!("collection validator disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.data.borrow().disposed
    }
}

impl<K: CollectionKey, E: Element> VariableValidator for CollectionVariableValidator<K, E> {
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
                event.is_valid(),
                event.has_warnings(),
                event.state().clone(),
            ));
        })
    }
}

impl<K: CollectionKey, E: Element> Disposable for CollectionVariableValidator<K, E> {
    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}
