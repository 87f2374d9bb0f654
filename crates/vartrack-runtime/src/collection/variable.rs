#![forbid(unsafe_code)]

//! The collection variable: a keyed, change-tracked, validated collection.
//!
//! # Design
//!
//! [`CollectionVariable`] is a cheap handle around shared state. Every
//! mutation follows the same protocol:
//!
//! 1. Drop empty or ineligible input without publishing anything.
//! 2. Publish the cancellable "-ing" event; listeners veto elements by key.
//! 3. Commit the accepted elements into the [`IndexedCollection`].
//! 4. If anything was committed, publish the "-ed" event. The change
//!    tracker and validator update themselves from it.
//!
//! No `RefCell` borrow is held while an event is published, so listeners may
//! read the variable (or mutate it) re-entrantly.
//!
//! # Invariants
//!
//! 1. The "-ing" event is fully dispatched before any commit; the "-ed"
//!    event strictly after.
//! 2. A mutation that commits nothing publishes no "-ed" event.
//! 3. With auto-disposal, an element is disposed when the collection stops
//!    holding it: on removal, when superseded by a replacement, when a
//!    recreation drops its allocation, and when the variable is disposed.
//!
//! # Failure Modes
//!
//! - **Misconfigured collaborators**: [`CollectionVariable::new`] panics if
//!   the supplied tracker or validator is already configured or disposed;
//!   [`CollectionVariable::try_new`] reports it instead.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;
use vartrack_core::{
    CollectionKey, CollectionSchema, Disposable, Element, EventHandler, KeyedCollection, UpdateRef,
    Variable, VariableChangeTracker, VariableResult, VariableValidator,
};

use super::change_tracker::CollectionVariableChangeTracker;
use super::events::{
    AddingElementsEvent, ElementsAddedEvent, ElementsRemovedEvent, ElementsReplacedEvent,
    ElementsSetEvent, RecreateCancellationReason, RecreateCancelledEvent, RecreatedEvent,
    RecreatingEvent, RecreationSource, RemovingElementsEvent, ReplacingElementsEvent,
    SettingElementsEvent,
};
use super::indexed::IndexedCollection;
use super::validator::CollectionVariableValidator;

type Snapshot<K, E> = Rc<KeyedCollection<K, E>>;

/// Maps an original element to the element `reset` stores.
pub type ElementMapper<E> = Rc<dyn Fn(&Rc<E>) -> Rc<E>>;

fn identity_mapper<E: 'static>() -> ElementMapper<E> {
    Rc::new(|element: &Rc<E>| Rc::clone(element))
}

/// Construction parameters for [`CollectionVariable`].
pub struct CollectionVariableParams<K, E> {
    /// Key selector, key formatter, name and secondary lookups.
    pub schema: CollectionSchema<K, E>,
    /// Initial elements; later duplicates by key are dropped.
    pub value: Vec<Rc<E>>,
    /// Dispose elements the collection stops holding.
    pub auto_dispose: bool,
    pub change_tracker: Option<CollectionVariableChangeTracker<K, E>>,
    pub validator: Option<CollectionVariableValidator<K, E>>,
    /// Used by `reset`; identity when absent.
    pub element_reset_mapper: Option<ElementMapper<E>>,
}

impl<K: CollectionKey, E: Element> CollectionVariableParams<K, E> {
    #[must_use]
    pub fn new(schema: CollectionSchema<K, E>) -> Self {
        Self {
            schema,
            value: Vec::new(),
            auto_dispose: true,
            change_tracker: None,
            validator: None,
            element_reset_mapper: None,
        }
    }

    /// Parameters for a collection keyed by `selector` with default schema
    /// settings.
    #[must_use]
    pub fn keyed_by(selector: impl Fn(&E) -> K + 'static) -> Self {
        Self::new(CollectionSchema::new(selector))
    }

    #[must_use]
    pub fn with_value(mut self, elements: impl IntoIterator<Item = Rc<E>>) -> Self {
        self.value = elements.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_auto_dispose(mut self, auto_dispose: bool) -> Self {
        self.auto_dispose = auto_dispose;
        self
    }

    #[must_use]
    pub fn with_change_tracker(mut self, tracker: CollectionVariableChangeTracker<K, E>) -> Self {
        self.change_tracker = Some(tracker);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: CollectionVariableValidator<K, E>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_element_reset_mapper(mut self, mapper: impl Fn(&Rc<E>) -> Rc<E> + 'static) -> Self {
        self.element_reset_mapper = Some(Rc::new(mapper));
        self
    }
}

impl<K: CollectionKey, E> fmt::Debug for CollectionVariableParams<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionVariableParams")
            .field("name", &self.schema.name())
            .field("value_len", &self.value.len())
            .field("auto_dispose", &self.auto_dispose)
            .field("has_change_tracker", &self.change_tracker.is_some())
            .field("has_validator", &self.validator.is_some())
            .field("has_element_reset_mapper", &self.element_reset_mapper.is_some())
            .finish()
    }
}

pub(crate) struct CollectionEvents<K, E> {
    pub(crate) adding: EventHandler<AddingElementsEvent<K, E>>,
    pub(crate) added: EventHandler<Rc<ElementsAddedEvent<K, E>>>,
    pub(crate) removing: EventHandler<RemovingElementsEvent<K, E>>,
    pub(crate) removed: EventHandler<Rc<ElementsRemovedEvent<K, E>>>,
    pub(crate) replacing: EventHandler<ReplacingElementsEvent<K, E>>,
    pub(crate) replaced: EventHandler<Rc<ElementsReplacedEvent<K, E>>>,
    pub(crate) setting: EventHandler<SettingElementsEvent<K, E>>,
    pub(crate) set: EventHandler<Rc<ElementsSetEvent<K, E>>>,
    pub(crate) recreating: EventHandler<RecreatingEvent<K, E>>,
    pub(crate) recreated: EventHandler<Rc<RecreatedEvent<K, E>>>,
    pub(crate) recreate_cancelled: EventHandler<RecreateCancelledEvent<K, E>>,
}

impl<K: CollectionKey, E: 'static> CollectionEvents<K, E> {
    fn new() -> Self {
        Self {
            adding: EventHandler::new(),
            added: EventHandler::new(),
            removing: EventHandler::new(),
            removed: EventHandler::new(),
            replacing: EventHandler::new(),
            replaced: EventHandler::new(),
            setting: EventHandler::new(),
            set: EventHandler::new(),
            recreating: EventHandler::new(),
            recreated: EventHandler::new(),
            recreate_cancelled: EventHandler::new(),
        }
    }

    fn dispose(&self) {
        self.adding.dispose();
        self.added.dispose();
        self.removing.dispose();
        self.removed.dispose();
        self.replacing.dispose();
        self.replaced.dispose();
        self.setting.dispose();
        self.set.dispose();
        self.recreating.dispose();
        self.recreated.dispose();
        self.recreate_cancelled.dispose();
    }
}

struct CollectionInner<K, E> {
    data: RefCell<IndexedCollection<K, E>>,
    events: CollectionEvents<K, E>,
    tracker: CollectionVariableChangeTracker<K, E>,
    validator: CollectionVariableValidator<K, E>,
    reset_mapper: ElementMapper<E>,
    auto_dispose: bool,
    disposed: Cell<bool>,
}

/// A keyed collection wrapped in change tracking and validation.
///
/// Cloning creates another handle to the same variable.
pub struct CollectionVariable<K, E> {
    inner: Rc<CollectionInner<K, E>>,
}

impl<K, E> Clone for CollectionVariable<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CollectionVariable<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionVariable")
            .field("data", &self.inner.data.borrow())
            .field("auto_dispose", &self.inner.auto_dispose)
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle held by the tracker and validator.
pub(crate) struct WeakCollectionVariable<K, E> {
    inner: Weak<CollectionInner<K, E>>,
}

impl<K, E> Clone for WeakCollectionVariable<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K, E> WeakCollectionVariable<K, E> {
    pub(crate) fn upgrade(&self) -> Option<CollectionVariable<K, E>> {
        self.inner.upgrade().map(|inner| CollectionVariable { inner })
    }
}

impl<K: CollectionKey, E: Element> CollectionVariable<K, E> {
    /// Build the variable and configure its tracker and validator.
    ///
    /// # Errors
    ///
    /// Whatever configuring the supplied tracker or validator reports.
    pub fn try_new(params: CollectionVariableParams<K, E>) -> VariableResult<Self> {
        let CollectionVariableParams {
            schema,
            value,
            auto_dispose,
            change_tracker,
            validator,
            element_reset_mapper,
        } = params;

        let variable = Self {
            inner: Rc::new(CollectionInner {
                data: RefCell::new(IndexedCollection::new(KeyedCollection::with_elements(
                    schema, value,
                ))),
                events: CollectionEvents::new(),
                tracker: change_tracker.unwrap_or_default(),
                validator: validator.unwrap_or_default(),
                reset_mapper: element_reset_mapper.unwrap_or_else(identity_mapper),
                auto_dispose,
                disposed: Cell::new(false),
            }),
        };
        variable.inner.tracker.configure(&variable)?;
        variable.inner.validator.configure(&variable)?;
        debug!(
            name = %variable.name(),
            len = variable.len(),
            auto_dispose,
            "collection variable created"
        );
        Ok(variable)
    }

    /// Build the variable.
    ///
    /// # Panics
    ///
    /// If the supplied tracker or validator is already configured or
    /// disposed.
    #[must_use]
    pub fn new(params: CollectionVariableParams<K, E>) -> Self {
        match Self::try_new(params) {
            Ok(variable) => variable,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakCollectionVariable<K, E> {
        WeakCollectionVariable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn events(&self) -> &CollectionEvents<K, E> {
        &self.inner.events
    }

    /// Snapshot of the live keyed collection.
    #[must_use]
    pub fn value(&self) -> Snapshot<K, E> {
        Rc::clone(self.inner.data.borrow().lookup())
    }

    /// Live elements in positional order.
    #[must_use]
    pub fn elements(&self) -> Vec<Rc<E>> {
        self.inner.data.borrow().all().to_vec()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.data.borrow().is_empty()
    }

    /// Collection name from the schema.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.data.borrow().lookup().name().to_string()
    }

    pub fn get(&self, key: &K) -> Option<Rc<E>> {
        self.inner.data.borrow().lookup().get(key).cloned()
    }

    pub fn get_at(&self, index: usize) -> Option<Rc<E>> {
        self.inner.data.borrow().all().get(index).cloned()
    }

    /// Position of the element stored under the key of `element`.
    pub fn get_index(&self, element: &E) -> Option<usize> {
        self.inner.data.borrow().get_index(element)
    }

    /// Iterate a snapshot of the live elements.
    pub fn iter(&self) -> std::vec::IntoIter<Rc<E>> {
        self.elements().into_iter()
    }

    #[must_use]
    pub fn is_auto_disposing(&self) -> bool {
        self.inner.auto_dispose
    }

    /// The tracker's baseline, or an empty collection before configuration.
    #[must_use]
    pub fn original_value(&self) -> Snapshot<K, E> {
        self.inner
            .tracker
            .original_value()
            .unwrap_or_else(|| Rc::new(self.inner.data.borrow().lookup().clone_schema()))
    }

    pub fn change_tracker(&self) -> &CollectionVariableChangeTracker<K, E> {
        &self.inner.tracker
    }

    pub fn validator(&self) -> &CollectionVariableValidator<K, E> {
        &self.inner.validator
    }

    pub fn on_adding_elements(&self) -> &EventHandler<AddingElementsEvent<K, E>> {
        &self.inner.events.adding
    }

    pub fn on_elements_added(&self) -> &EventHandler<Rc<ElementsAddedEvent<K, E>>> {
        &self.inner.events.added
    }

    pub fn on_removing_elements(&self) -> &EventHandler<RemovingElementsEvent<K, E>> {
        &self.inner.events.removing
    }

    pub fn on_elements_removed(&self) -> &EventHandler<Rc<ElementsRemovedEvent<K, E>>> {
        &self.inner.events.removed
    }

    pub fn on_replacing_elements(&self) -> &EventHandler<ReplacingElementsEvent<K, E>> {
        &self.inner.events.replacing
    }

    pub fn on_elements_replaced(&self) -> &EventHandler<Rc<ElementsReplacedEvent<K, E>>> {
        &self.inner.events.replaced
    }

    pub fn on_setting_elements(&self) -> &EventHandler<SettingElementsEvent<K, E>> {
        &self.inner.events.setting
    }

    pub fn on_elements_set(&self) -> &EventHandler<Rc<ElementsSetEvent<K, E>>> {
        &self.inner.events.set
    }

    pub fn on_recreating(&self) -> &EventHandler<RecreatingEvent<K, E>> {
        &self.inner.events.recreating
    }

    pub fn on_recreated(&self) -> &EventHandler<Rc<RecreatedEvent<K, E>>> {
        &self.inner.events.recreated
    }

    pub fn on_recreate_cancelled(&self) -> &EventHandler<RecreateCancelledEvent<K, E>> {
        &self.inner.events.recreate_cancelled
    }

    /// Add elements whose key is not present.
    pub fn add(&self, elements: impl IntoIterator<Item = Rc<E>>) {
        let elements: Vec<Rc<E>> = elements.into_iter().collect();
        if elements.is_empty() {
            return;
        }

        let event = AddingElementsEvent::new(self.original_value(), self.value(), elements);
        self.inner.events.adding.publish(&event);
        let accepted: Vec<Rc<E>> = event.accepted_elements().cloned().collect();
        let candidates = event.into_candidates();

        let added = self.inner.data.borrow_mut().add_range(accepted);
        if added.is_empty() {
            debug!(candidates = candidates.len(), "add committed nothing");
            return;
        }
        debug!(added = added.len(), candidates = candidates.len(), "elements added");

        let event = Rc::new(ElementsAddedEvent::new(
            self.original_value(),
            self.value(),
            added,
            candidates,
        ));
        self.inner.events.added.publish(&event);
    }

    /// Remove the elements stored under the keys of `elements`.
    pub fn remove(&self, elements: impl IntoIterator<Item = Rc<E>>) {
        let elements: Vec<Rc<E>> = elements.into_iter().collect();
        if elements.is_empty() {
            return;
        }

        let event = RemovingElementsEvent::new(self.original_value(), self.value(), elements);
        self.inner.events.removing.publish(&event);
        let accepted: Vec<Rc<E>> = event.accepted_elements().cloned().collect();
        let candidates = event.into_candidates();

        let removed = self.inner.data.borrow_mut().remove_range(&accepted);
        if removed.is_empty() {
            debug!(candidates = candidates.len(), "remove committed nothing");
            return;
        }
        for element in &removed {
            self.try_auto_dispose(element);
        }
        debug!(removed = removed.len(), candidates = candidates.len(), "elements removed");

        let event = Rc::new(ElementsRemovedEvent::new(
            self.original_value(),
            self.value(),
            removed,
            candidates,
        ));
        self.inner.events.removed.publish(&event);
    }

    /// Pair each element with the stored element under its key, dropping
    /// absent keys and equal pairs.
    fn replacement_candidates(&self, elements: &[Rc<E>]) -> Vec<UpdateRef<Rc<E>>> {
        let data = self.inner.data.borrow();
        elements
            .iter()
            .filter_map(|element| {
                let existing = data.lookup().try_get(element)?;
                (!self
                    .inner
                    .tracker
                    .are_elements_equal(Some(element), Some(existing)))
                .then(|| UpdateRef::new(Rc::clone(element), Rc::clone(existing)))
            })
            .collect()
    }

    /// Replace stored elements with unequal elements under the same key.
    pub fn replace(&self, elements: impl IntoIterator<Item = Rc<E>>) {
        let elements: Vec<Rc<E>> = elements.into_iter().collect();
        let updates = self.replacement_candidates(&elements);
        if updates.is_empty() {
            return;
        }

        let event = ReplacingElementsEvent::new(self.original_value(), self.value(), updates);
        self.inner.events.replacing.publish(&event);
        let accepted: Vec<UpdateRef<Rc<E>>> = event.accepted_elements().cloned().collect();
        let candidates = event.into_candidates();

        let replaced = self.inner.data.borrow_mut().replace_range(accepted);
        if replaced.is_empty() {
            debug!(candidates = candidates.len(), "replace committed nothing");
            return;
        }
        for update in &replaced {
            self.try_auto_dispose(&update.old_value);
        }
        debug!(replaced = replaced.len(), candidates = candidates.len(), "elements replaced");

        let event = Rc::new(ElementsReplacedEvent::new(
            self.original_value(),
            self.value(),
            replaced,
            candidates,
        ));
        self.inner.events.replaced.publish(&event);
    }

    /// Add elements with new keys and replace unequal elements with existing
    /// keys, in one event pair.
    pub fn set(&self, elements: impl IntoIterator<Item = Rc<E>>) {
        let elements: Vec<Rc<E>> = elements.into_iter().collect();
        let to_add: Vec<Rc<E>> = {
            let data = self.inner.data.borrow();
            elements
                .iter()
                .filter(|e| !data.lookup().has(e))
                .cloned()
                .collect()
        };
        let to_replace = self.replacement_candidates(&elements);
        if to_add.is_empty() && to_replace.is_empty() {
            return;
        }

        let event =
            SettingElementsEvent::new(self.original_value(), self.value(), to_add, to_replace);
        self.inner.events.setting.publish(&event);
        let accepted_replace: Vec<UpdateRef<Rc<E>>> =
            event.accepted_elements_to_replace().cloned().collect();
        let accepted_add: Vec<Rc<E>> = event.accepted_elements_to_add().cloned().collect();
        let (candidates_add, candidates_replace) = event.into_candidates();

        let (replaced, added) = {
            let mut data = self.inner.data.borrow_mut();
            let replaced = data.replace_range(accepted_replace);
            (replaced, data.add_range(accepted_add))
        };
        if replaced.is_empty() && added.is_empty() {
            debug!("set committed nothing");
            return;
        }
        for update in &replaced {
            self.try_auto_dispose(&update.old_value);
        }
        debug!(added = added.len(), replaced = replaced.len(), "elements set");

        let event = Rc::new(ElementsSetEvent::new(
            self.original_value(),
            self.value(),
            added,
            replaced,
            candidates_add,
            candidates_replace,
        ));
        self.inner.events.set.publish(&event);
    }

    /// Rebuild the collection from the tracker's baseline through the
    /// element reset mapper.
    pub fn reset(&self) {
        let original = self.original_value();
        let mut value = self.inner.data.borrow().lookup().clone_schema();
        value.try_add_range(original.entities().map(|e| (self.inner.reset_mapper)(e)));
        self.set_value(Rc::new(value), RecreationSource::Reset);
    }

    /// Replace the collection wholesale unless it is equal to the current
    /// one or a recreating listener cancels. Returns whether it happened.
    pub fn try_recreate(&self, elements: impl IntoIterator<Item = Rc<E>>) -> bool {
        let current = self.value();
        let mut candidate = current.clone_schema();
        candidate.try_add_range(elements);
        let candidate = Rc::new(candidate);

        if self.inner.tracker.are_equal(&current, &candidate) {
            self.publish_recreate_cancelled(current, candidate, RecreateCancellationReason::EqualityComparison);
            return false;
        }

        let event = RecreatingEvent::new(
            self.original_value(),
            Rc::clone(&current),
            Rc::clone(&candidate),
            self.inner.tracker.equality().clone(),
        );
        self.inner.events.recreating.publish(&event);
        if event.is_cancelled() {
            self.publish_recreate_cancelled(current, candidate, RecreateCancellationReason::OnRecreatingEvent);
            return false;
        }

        drop(event);
        drop(current);
        self.set_value(candidate, RecreationSource::TryRecreate);
        true
    }

    /// Replace the collection wholesale.
    pub fn recreate(&self, elements: impl IntoIterator<Item = Rc<E>>) {
        let mut value = self.inner.data.borrow().lookup().clone_schema();
        value.try_add_range(elements);
        self.set_value(Rc::new(value), RecreationSource::Recreate);
    }

    /// Remove every element. No-op on an empty collection.
    pub fn clear(&self) {
        let value = {
            let data = self.inner.data.borrow();
            if data.is_empty() {
                debug!("clear skipped on empty collection");
                return;
            }
            data.lookup().clone_schema()
        };
        self.set_value(Rc::new(value), RecreationSource::Clear);
    }

    fn publish_recreate_cancelled(
        &self,
        current: Snapshot<K, E>,
        candidate: Snapshot<K, E>,
        reason: RecreateCancellationReason,
    ) {
        debug!(?reason, "recreate cancelled");
        self.inner
            .events
            .recreate_cancelled
            .publish(&RecreateCancelledEvent {
                original_value: self.original_value(),
                current_value: current,
                cancelled_value: candidate,
                reason,
            });
    }

    fn set_value(&self, value: Snapshot<K, E>, source: RecreationSource) {
        let previous = self.value();
        if self.inner.auto_dispose {
            let dropped = previous.iter().filter(|(key, element)| {
                value
                    .get(key)
                    .is_none_or(|next| !Rc::ptr_eq(next, element))
            });
            for (_, element) in dropped {
                self.try_auto_dispose(element);
            }
        }

        self.inner.data.borrow_mut().update(Rc::clone(&value));
        debug!(
            %source,
            previous = previous.len(),
            current = value.len(),
            "collection recreated"
        );

        let event = Rc::new(RecreatedEvent::new(
            self.original_value(),
            previous,
            value,
            source,
            self.inner.tracker.equality().clone(),
        ));
        self.inner.events.recreated.publish(&event);
    }

    fn try_auto_dispose(&self, element: &Rc<E>) {
        if !self.inner.auto_dispose {
            return;
        }
        if let Some(disposable) = element.as_disposable() {
            disposable.dispose();
        }
    }

    /// Dispose events, tracker, validator and, with auto-disposal, every
    /// element. Repeated calls are no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.events.dispose();
        for element in self.elements() {
            self.try_auto_dispose(&element);
        }
        self.inner.tracker.dispose();
        self.inner.validator.dispose();
        debug!(name = %self.name(), "collection variable disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<'a, K: CollectionKey, E: Element> IntoIterator for &'a CollectionVariable<K, E> {
    type Item = Rc<E>;
    type IntoIter = std::vec::IntoIter<Rc<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: CollectionKey, E: Element> Disposable for CollectionVariable<K, E> {
    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}

impl<K: CollectionKey, E: Element> Variable for CollectionVariable<K, E> {
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

impl<K: CollectionKey, E: Element> Element for CollectionVariable<K, E> {
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
    use crate::collection::CancellableEvent;

    #[derive(Debug)]
    struct Doc {
        id: u32,
        title: &'static str,
        disposed: Cell<bool>,
    }

    impl Disposable for Doc {
        fn dispose(&self) {
            self.disposed.set(true);
        }

        fn is_disposed(&self) -> bool {
            self.disposed.get()
        }
    }

    impl Element for Doc {
        fn as_disposable(&self) -> Option<&dyn Disposable> {
            Some(self)
        }
    }

    fn doc(id: u32, title: &'static str) -> Rc<Doc> {
        Rc::new(Doc {
            id,
            title,
            disposed: Cell::new(false),
        })
    }

    fn docs(initial: Vec<Rc<Doc>>) -> CollectionVariable<u32, Doc> {
        CollectionVariable::new(CollectionVariableParams::keyed_by(|d: &Doc| d.id).with_value(initial))
    }

    fn ids(var: &CollectionVariable<u32, Doc>) -> Vec<u32> {
        var.iter().map(|d| d.id).collect()
    }

    fn counter<T: 'static>(handler: &EventHandler<T>) -> (Rc<Cell<usize>>, vartrack_core::Subscription) {
        let count = Rc::new(Cell::new(0));
        let count_clone = Rc::clone(&count);
        let sub = handler.listen(move |_| count_clone.set(count_clone.get() + 1));
        (count, sub)
    }

    #[test]
    fn params_debug_reports_shape() {
        let params = CollectionVariableParams::keyed_by(|d: &Doc| d.id)
            .with_value([doc(1, "a"), doc(2, "b")])
            .with_auto_dispose(false);
        let rendered = format!("{params:?}");

        assert!(rendered.contains("name: \"elements\""), "{rendered}");
        assert!(rendered.contains("value_len: 2"), "{rendered}");
        assert!(rendered.contains("auto_dispose: false"), "{rendered}");
    }

    #[test]
    fn add_skips_existing_keys() {
        let var = docs(vec![doc(1, "a")]);
        let added: Rc<RefCell<Vec<u32>>> = Rc::default();
        let added_clone = Rc::clone(&added);
        let _sub = var.on_elements_added().listen(move |e| {
            added_clone.borrow_mut().extend(e.added_elements.iter().map(|d| d.id));
        });

        var.add([doc(1, "b"), doc(2, "c")]);

        assert_eq!(*added.borrow(), vec![2]);
        assert_eq!(var.get(&1).unwrap().title, "a");
        assert_eq!(var.get_index(&doc(2, "")), Some(1));
    }

    #[test]
    fn empty_input_publishes_nothing() {
        let var = docs(vec![doc(1, "a")]);
        let (adding, _a) = counter(var.on_adding_elements());
        let (removing, _r) = counter(var.on_removing_elements());

        var.add([]);
        var.remove([]);
        var.replace([var.get(&1).unwrap()]);

        assert_eq!((adding.get(), removing.get()), (0, 0));
    }

    #[test]
    fn cancelling_everything_skips_commit() {
        let var = docs(vec![doc(1, "a")]);
        let _veto = var.on_adding_elements().listen(|e| e.cancel_all());
        let (added, _sub) = counter(var.on_elements_added());

        var.add([doc(2, "b"), doc(3, "c")]);

        assert_eq!(added.get(), 0);
        assert_eq!(ids(&var), vec![1]);
    }

    #[test]
    fn cancel_by_key_keeps_the_rest() {
        let var = docs(vec![doc(1, "a"), doc(2, "b"), doc(3, "c")]);
        let _veto = var.on_removing_elements().listen(|e| e.cancel_key(2));

        var.remove([doc(2, ""), doc(3, "")]);

        assert_eq!(ids(&var), vec![1, 2]);
    }

    #[test]
    fn remove_and_replace_auto_dispose() {
        let first = doc(1, "a");
        let second = doc(2, "b");
        let var = docs(vec![Rc::clone(&first), Rc::clone(&second)]);

        var.replace([doc(1, "z")]);
        assert!(first.disposed.get());
        assert_eq!(var.get_index(&doc(1, "")), Some(0));

        var.remove([doc(2, "")]);
        assert!(second.disposed.get());
        assert_eq!(ids(&var), vec![1]);
    }

    #[test]
    fn auto_dispose_can_be_disabled() {
        let first = doc(1, "a");
        let var = CollectionVariable::new(
            CollectionVariableParams::keyed_by(|d: &Doc| d.id)
                .with_value([Rc::clone(&first)])
                .with_auto_dispose(false),
        );

        var.clear();
        assert!(!first.disposed.get());
        assert!(var.is_empty());
    }

    #[test]
    fn set_adds_and_replaces_in_one_event() {
        let one = doc(1, "a");
        let var = docs(vec![Rc::clone(&one)]);
        let seen: Rc<RefCell<Vec<(usize, usize)>>> = Rc::default();
        let seen_clone = Rc::clone(&seen);
        let _sub = var.on_elements_set().listen(move |e| {
            seen_clone
                .borrow_mut()
                .push((e.added_elements.len(), e.replaced_elements.len()));
        });

        var.set([Rc::clone(&one), doc(1, "dup"), doc(2, "b")]);

        assert_eq!(*seen.borrow(), vec![(1, 1)]);
        assert_eq!(var.get(&1).unwrap().title, "dup");
        assert_eq!(ids(&var), vec![1, 2]);
    }

    #[test]
    fn try_recreate_with_equal_content_is_cancelled() {
        let one = doc(1, "a");
        let var = docs(vec![Rc::clone(&one)]);
        let reasons: Rc<RefCell<Vec<RecreateCancellationReason>>> = Rc::default();
        let reasons_clone = Rc::clone(&reasons);
        let _sub = var
            .on_recreate_cancelled()
            .listen(move |e| reasons_clone.borrow_mut().push(e.reason));
        let (recreating, _r) = counter(var.on_recreating());

        assert!(!var.try_recreate([one]));
        assert_eq!(recreating.get(), 0);

        let _veto = var.on_recreating().listen(|e| e.cancel());
        assert!(!var.try_recreate([doc(5, "x")]));

        assert_eq!(
            *reasons.borrow(),
            vec![
                RecreateCancellationReason::EqualityComparison,
                RecreateCancellationReason::OnRecreatingEvent
            ]
        );
        assert_eq!(ids(&var), vec![1]);
    }

    #[test]
    fn recreate_disposes_only_dropped_allocations() {
        let kept = doc(1, "a");
        let dropped = doc(2, "b");
        let var = docs(vec![Rc::clone(&kept), Rc::clone(&dropped)]);
        let sources: Rc<RefCell<Vec<RecreationSource>>> = Rc::default();
        let sources_clone = Rc::clone(&sources);
        let _sub = var
            .on_recreated()
            .listen(move |e| sources_clone.borrow_mut().push(e.source));

        assert!(var.try_recreate([Rc::clone(&kept), doc(3, "c")]));

        assert!(!kept.disposed.get());
        assert!(dropped.disposed.get());
        assert_eq!(ids(&var), vec![1, 3]);
        assert_eq!(*sources.borrow(), vec![RecreationSource::TryRecreate]);
    }

    #[test]
    fn clear_on_empty_is_noop() {
        let var = docs(vec![]);
        let (recreated, _sub) = counter(var.on_recreated());

        var.clear();
        assert_eq!(recreated.get(), 0);
    }

    #[test]
    fn reset_restores_baseline() {
        let var = docs(vec![doc(1, "a"), doc(2, "b")]);
        var.add([doc(3, "c")]);
        var.remove([doc(1, "")]);
        assert!(var.change_tracker().has_changed());

        var.reset();

        assert_eq!(ids(&var), vec![1, 2]);
        assert!(!var.change_tracker().has_changed());
    }

    #[test]
    fn reset_mapper_rehydrates_elements() {
        let var = CollectionVariable::new(
            CollectionVariableParams::keyed_by(|d: &Doc| d.id)
                .with_value([doc(1, "a")])
                .with_auto_dispose(false)
                .with_element_reset_mapper(|d: &Rc<Doc>| doc(d.id, "fresh")),
        );

        var.reset();

        assert_eq!(var.get(&1).unwrap().title, "fresh");
        assert_eq!(var.change_tracker().get_replaced_elements().len(), 1);
    }

    #[test]
    fn dispose_is_idempotent_and_disposes_elements() {
        let one = doc(1, "a");
        let var = docs(vec![Rc::clone(&one)]);
        let (added, _sub) = counter(var.on_elements_added());

        var.dispose();
        var.dispose();
        var.add([doc(2, "b")]);

        assert!(one.disposed.get());
        assert!(var.change_tracker().is_disposed());
        assert!(var.validator().is_disposed());
        assert_eq!(added.get(), 0);
    }

    #[test]
    fn preconfigured_tracker_is_rejected() {
        let first = docs(vec![]);
        let err = CollectionVariable::try_new(
            CollectionVariableParams::keyed_by(|d: &Doc| d.id)
                .with_change_tracker(first.change_tracker().clone()),
        )
        .unwrap_err();
        assert_eq!(err, vartrack_core::VariableError::AlreadyConfigured("change tracker"));
    }
}
