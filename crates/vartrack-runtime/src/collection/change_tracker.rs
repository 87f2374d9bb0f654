#![forbid(unsafe_code)]

//! Per-key change classification for collection variables.
//!
//! # Design
//!
//! The tracker compares the live collection against an original snapshot
//! taken when it is configured. It keeps one [`ElementChange`] record per
//! key that currently differs from the original and updates those records
//! from the variable's "-ed" events instead of diffing the whole collection
//! on every mutation. A full recompute only happens on configuration,
//! `detect_changes`, and wholesale recreation.
//!
//! Elements that are themselves variables are observed through their own
//! trackers: an element equal to its original counts as `Changed` while its
//! own tracker reports changes.
//!
//! # Invariants
//!
//! 1. Stored records are only `Added`, `Removed`, `Replaced` or `Changed`.
//!    Restorations are reported in events and then forgotten.
//! 2. `has_changed()` ⟺ at least one record is stored.
//! 3. A key has at most one record.
//! 4. While detached, mutations and nested changes are ignored; `attach()`
//!    recomputes from scratch.
//!
//! # Failure Modes
//!
//! - **Misuse**: `detect_changes`, `attach` and `detach` panic on a disposed
//!   or unconfigured tracker. `configure` reports the same conditions as
//!   [`VariableError`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace};
use vartrack_core::{
    CollectionKey, Disposable, Element, EventHandler, KeyedCollection, Subscription, UpdateRef,
    VariableChangeEvent, VariableChangeTracker, VariableError, VariableResult,
};

use super::changes::{
    CollectionChangeEvent, ElementChange, ElementChangeType, ElementComparer, ElementEquality,
};
use super::events::{
    CollectionMutation, ElementsAddedEvent, ElementsRemovedEvent, ElementsReplacedEvent,
    ElementsSetEvent, RecreatedEvent,
};
use super::variable::{CollectionVariable, WeakCollectionVariable};

const COMPONENT: &str = "change tracker";

/// Change tracker configuration.
pub struct ChangeTrackerConfig<E> {
    /// React to variable events right after configuration.
    pub attach: bool,
    /// Observe the trackers of elements that are variables.
    pub listen_to_internal_changes: bool,
    /// Baseline elements; defaults to the variable's initial value.
    pub original_value: Option<Vec<Rc<E>>>,
    /// Structural element equality on top of allocation identity.
    pub element_comparer: Option<ElementComparer<E>>,
}

impl<E> Default for ChangeTrackerConfig<E> {
    fn default() -> Self {
        Self {
            attach: true,
            listen_to_internal_changes: true,
            original_value: None,
            element_comparer: None,
        }
    }
}

impl<E> ChangeTrackerConfig<E> {
    #[must_use]
    pub fn with_attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }

    #[must_use]
    pub fn with_listen_to_internal_changes(mut self, listen: bool) -> Self {
        self.listen_to_internal_changes = listen;
        self
    }

    /// Use `elements` as the baseline instead of the initial value.
    #[must_use]
    pub fn with_original_value<T: Into<Rc<E>>>(mut self, elements: impl IntoIterator<Item = T>) -> Self {
        self.original_value = Some(elements.into_iter().map(Into::into).collect());
        self
    }

    /// Treat elements as equal when `comparer` says so.
    #[must_use]
    pub fn with_element_comparer(mut self, comparer: impl Fn(&E, &E) -> bool + 'static) -> Self {
        self.element_comparer = Some(Rc::new(comparer));
        self
    }
}

impl<E> fmt::Debug for ChangeTrackerConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTrackerConfig")
            .field("attach", &self.attach)
            .field("listen_to_internal_changes", &self.listen_to_internal_changes)
            .field("has_original_value", &self.original_value.is_some())
            .field("has_element_comparer", &self.element_comparer.is_some())
            .finish()
    }
}

struct NestedChanges {
    has_changed: bool,
    changes: Option<Rc<dyn Any>>,
}

struct TrackerState<K, E> {
    linked: Option<WeakCollectionVariable<K, E>>,
    pending_original: Option<Vec<Rc<E>>>,
    original: Option<Rc<KeyedCollection<K, E>>>,
    records: IndexMap<K, ElementChange<K, E>>,
    element_listeners: HashMap<K, Subscription>,
    collection_listeners: Vec<Subscription>,
    attached: bool,
    disposed: bool,
}

struct TrackerInner<K, E> {
    state: RefCell<TrackerState<K, E>>,
    on_change: EventHandler<Rc<CollectionChangeEvent<K, E>>>,
    equality: ElementEquality<E>,
    listen_to_internal_changes: bool,
}

/// Classifies every key of a collection variable against its original
/// snapshot.
///
/// Cloning creates another handle to the same tracker.
pub struct CollectionVariableChangeTracker<K, E> {
    inner: Rc<TrackerInner<K, E>>,
}

impl<K, E> Clone for CollectionVariableChangeTracker<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CollectionVariableChangeTracker<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CollectionVariableChangeTracker")
            .field("records", &state.records.keys().collect::<Vec<_>>())
            .field("attached", &state.attached)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<K: CollectionKey, E: Element> Default for CollectionVariableChangeTracker<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CollectionKey, E: Element> TrackerInner<K, E> {
    fn original_of(state: &TrackerState<K, E>, key: &K) -> Option<Rc<E>> {
        state.original.as_ref().and_then(|o| o.get(key)).cloned()
    }

    fn is_active(&self) -> bool {
        let state = self.state.borrow();
        state.attached && !state.disposed
    }

    /// Subscribe to the tracker of `element` if it is a variable.
    fn listen_element(
        self: &Rc<Self>,
        state: &mut TrackerState<K, E>,
        key: &K,
        element: &Rc<E>,
    ) -> Option<NestedChanges> {
        state.element_listeners.remove(key);
        if !self.listen_to_internal_changes {
            return None;
        }
        let tracker = element.as_variable()?.change_tracker();

        let weak_self = Rc::downgrade(self);
        let weak_element = Rc::downgrade(element);
        let listener_key = key.clone();
        let subscription = tracker.listen_change(Box::new(move |event| {
            if let (Some(inner), Some(element)) = (weak_self.upgrade(), weak_element.upgrade()) {
                inner.on_element_change(&listener_key, &element, event);
            }
        }));
        state.element_listeners.insert(key.clone(), subscription);

        Some(NestedChanges {
            has_changed: tracker.has_changed(),
            changes: tracker.changes(),
        })
    }

    fn attach_element(
        self: &Rc<Self>,
        state: &mut TrackerState<K, E>,
        key: &K,
        element: &Rc<E>,
    ) -> ElementChange<K, E> {
        let original = Self::original_of(state, key);
        let nested = self.listen_element(state, key, element);
        let current = Some(Rc::clone(element));

        let change = match original {
            None => ElementChange::new(
                key.clone(),
                ElementChangeType::Added,
                None,
                current,
                nested.and_then(|n| n.changes),
            ),
            Some(original) if self.equality.are_equal(Some(&original), Some(element)) => {
                match nested.filter(|n| n.has_changed) {
                    Some(nested) => ElementChange::new(
                        key.clone(),
                        ElementChangeType::Changed,
                        Some(original),
                        current,
                        nested.changes,
                    ),
                    None => ElementChange::new(
                        key.clone(),
                        ElementChangeType::RestoredAsExisting,
                        Some(original),
                        current,
                        None,
                    ),
                }
            }
            Some(original) => ElementChange::new(
                key.clone(),
                ElementChangeType::Replaced,
                Some(original),
                current,
                nested.and_then(|n| n.changes),
            ),
        };

        trace!(key = ?key, change = %change.change_type, "element attached");
        if change.change_type.is_restoration() {
            state.records.shift_remove(key);
        } else {
            state.records.insert(key.clone(), change.clone());
        }
        change
    }

    fn detach_element(state: &mut TrackerState<K, E>, key: &K) -> ElementChange<K, E> {
        state.element_listeners.remove(key);
        let change = match Self::original_of(state, key) {
            None => {
                state.records.shift_remove(key);
                ElementChange::new(
                    key.clone(),
                    ElementChangeType::RestoredAsMissing,
                    None,
                    None,
                    None,
                )
            }
            Some(original) => {
                let change = ElementChange::new(
                    key.clone(),
                    ElementChangeType::Removed,
                    Some(original),
                    None,
                    None,
                );
                state.records.insert(key.clone(), change.clone());
                change
            }
        };
        trace!(key = ?key, change = %change.change_type, "element detached");
        change
    }

    /// Reclassify every key; returns only the records that moved.
    fn update_changes(
        self: &Rc<Self>,
        state: &mut TrackerState<K, E>,
        current: &KeyedCollection<K, E>,
    ) -> Vec<ElementChange<K, E>> {
        let vanished: Vec<K> = state
            .records
            .iter()
            .filter(|(key, record)| {
                record.change_type == ElementChangeType::Added && !current.has_key(key)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut moved = Vec::new();
        for (key, element) in current {
            let previous = state.records.get(key).cloned();
            let change = self.attach_element(state, key, element);
            let unchanged = match &previous {
                Some(previous) => previous.is_same_as(&change),
                None => change.change_type == ElementChangeType::RestoredAsExisting,
            };
            if !unchanged {
                moved.push(change);
            }
        }

        if let Some(original) = state.original.clone() {
            for key in original.keys() {
                if current.has_key(key) {
                    continue;
                }
                let already_removed = state
                    .records
                    .get(key)
                    .is_some_and(|r| r.change_type == ElementChangeType::Removed);
                if !already_removed {
                    moved.push(Self::detach_element(state, key));
                }
            }
        }

        for key in vanished {
            moved.push(Self::detach_element(state, &key));
        }

        debug!(
            moved = moved.len(),
            records = state.records.len(),
            "collection changes recomputed"
        );
        moved
    }

    fn publish_collection(
        &self,
        changes: Vec<ElementChange<K, E>>,
        source: Option<CollectionMutation<K, E>>,
    ) {
        self.on_change
            .publish(&Rc::new(CollectionChangeEvent::Collection { changes, source }));
    }

    fn on_added(self: &Rc<Self>, event: &Rc<ElementsAddedEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        let changes = {
            let mut state = self.state.borrow_mut();
            event
                .added_elements
                .iter()
                .map(|element| {
                    let key = event.current_value.key_of(element);
                    self.attach_element(&mut state, &key, element)
                })
                .collect()
        };
        self.publish_collection(changes, Some(CollectionMutation::Added(Rc::clone(event))));
    }

    fn on_removed(self: &Rc<Self>, event: &Rc<ElementsRemovedEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        let changes = {
            let mut state = self.state.borrow_mut();
            event
                .removed_elements
                .iter()
                .map(|element| Self::detach_element(&mut state, &event.current_value.key_of(element)))
                .collect()
        };
        self.publish_collection(changes, Some(CollectionMutation::Removed(Rc::clone(event))));
    }

    fn on_replaced(self: &Rc<Self>, event: &Rc<ElementsReplacedEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        let changes = {
            let mut state = self.state.borrow_mut();
            event
                .replaced_elements
                .iter()
                .map(|update| {
                    let key = event.current_value.key_of(&update.value);
                    self.attach_element(&mut state, &key, &update.value)
                })
                .collect()
        };
        self.publish_collection(changes, Some(CollectionMutation::Replaced(Rc::clone(event))));
    }

    fn on_set(self: &Rc<Self>, event: &Rc<ElementsSetEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        let changes = {
            let mut state = self.state.borrow_mut();
            let attached = event
                .added_elements
                .iter()
                .chain(event.replaced_elements.iter().map(|u| &u.value));
            attached
                .map(|element| {
                    let key = event.current_value.key_of(element);
                    self.attach_element(&mut state, &key, element)
                })
                .collect()
        };
        self.publish_collection(changes, Some(CollectionMutation::Set(Rc::clone(event))));
    }

    fn on_recreated(self: &Rc<Self>, event: &Rc<RecreatedEvent<K, E>>) {
        if !self.is_active() {
            return;
        }
        let changes = {
            let mut state = self.state.borrow_mut();
            self.update_changes(&mut state, &event.current_value)
        };
        self.publish_collection(changes, Some(CollectionMutation::Recreated(Rc::clone(event))));
    }

    fn on_element_change(&self, key: &K, element: &Rc<E>, event: &VariableChangeEvent) {
        let change = {
            let mut state = self.state.borrow_mut();
            if !state.attached || state.disposed {
                return;
            }
            let recorded = state.records.get(key).map(|r| r.change_type);
            let original = Self::original_of(&state, key);
            match recorded {
                None if event.has_changed => {
                    let change = ElementChange::new(
                        key.clone(),
                        ElementChangeType::Changed,
                        original,
                        Some(Rc::clone(element)),
                        event.changes.clone(),
                    );
                    state.records.insert(key.clone(), change.clone());
                    change
                }
                Some(change_type) if change_type != ElementChangeType::Changed || event.has_changed => {
                    match state.records.get_mut(key) {
                        Some(record) => {
                            record.element_changes = event.changes.clone();
                            record.clone()
                        }
                        None => return,
                    }
                }
                _ => {
                    state.records.shift_remove(key);
                    ElementChange::new(
                        key.clone(),
                        ElementChangeType::RestoredAsExisting,
                        original,
                        Some(Rc::clone(element)),
                        None,
                    )
                }
            }
        };
        trace!(key = ?key, change = %change.change_type, "nested element changed");
        self.on_change.publish(&Rc::new(CollectionChangeEvent::Element {
            change,
            source: event.clone(),
        }));
    }

    fn forward<T: 'static>(weak: Weak<Self>, handler: fn(&Rc<Self>, &T)) -> impl Fn(&T) + 'static {
        move |event| {
            if let Some(inner) = weak.upgrade() {
                handler(&inner, event);
            }
        }
    }
}

impl<K: CollectionKey, E: Element> CollectionVariableChangeTracker<K, E> {
    /// A tracker with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChangeTrackerConfig::default())
    }

    /// A tracker with an explicit configuration.
    #[must_use]
    pub fn with_config(config: ChangeTrackerConfig<E>) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                state: RefCell::new(TrackerState {
                    linked: None,
                    pending_original: config.original_value,
                    original: None,
                    records: IndexMap::new(),
                    element_listeners: HashMap::new(),
                    collection_listeners: Vec::new(),
                    attached: config.attach,
                    disposed: false,
                }),
                on_change: EventHandler::new(),
                equality: ElementEquality::from_comparer(config.element_comparer),
                listen_to_internal_changes: config.listen_to_internal_changes,
            }),
        }
    }

    /// Bind the tracker to `variable`, snapshot the baseline, and classify
    /// the initial value.
    ///
    /// # Errors
    ///
    /// [`VariableError::Disposed`] or [`VariableError::AlreadyConfigured`].
    pub fn configure(&self, variable: &CollectionVariable<K, E>) -> VariableResult<()> {
        let value = variable.value();
        {
            let mut state = self.inner.state.borrow_mut();
            if state.disposed {
                return Err(VariableError::Disposed(COMPONENT));
            }
            if state.linked.is_some() {
                return Err(VariableError::AlreadyConfigured(COMPONENT));
            }

            let mut original = value.clone_schema_named(format!("original_{}", value.name()));
            match state.pending_original.take() {
                Some(elements) => original.try_add_range(elements),
                None => original.try_add_range(value.entities().cloned()),
            };
            state.original = Some(Rc::new(original));
            state.linked = Some(variable.downgrade());
            let changes = self.inner.update_changes(&mut state, &value);
            debug!(
                name = %value.name(),
                changed = !changes.is_empty(),
                "change tracker configured"
            );
        }

        let weak = Rc::downgrade(&self.inner);
        let events = variable.events();
        let listeners = vec![
            events.added.listen(TrackerInner::forward(weak.clone(), TrackerInner::on_added)),
            events.removed.listen(TrackerInner::forward(weak.clone(), TrackerInner::on_removed)),
            events.replaced.listen(TrackerInner::forward(weak.clone(), TrackerInner::on_replaced)),
            events.set.listen(TrackerInner::forward(weak.clone(), TrackerInner::on_set)),
            events.recreated.listen(TrackerInner::forward(weak.clone(), TrackerInner::on_recreated)),
        ];
        self.inner.state.borrow_mut().collection_listeners = listeners;
        Ok(())
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.state.borrow().linked.is_some()
    }

    /// The baseline snapshot, once configured.
    #[must_use]
    pub fn original_value(&self) -> Option<Rc<KeyedCollection<K, E>>> {
        self.inner.state.borrow().original.clone()
    }

    /// Change notifications.
    pub fn on_change(&self) -> &EventHandler<Rc<CollectionChangeEvent<K, E>>> {
        &self.inner.on_change
    }

    /// Whether any key differs from the original.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        !self.inner.state.borrow().records.is_empty()
    }

    /// Every stored record, in first-change order.
    #[must_use]
    pub fn element_changes(&self) -> Vec<ElementChange<K, E>> {
        self.inner.state.borrow().records.values().cloned().collect()
    }

    /// The record stored for `key`.
    #[must_use]
    pub fn change_of(&self, key: &K) -> Option<ElementChange<K, E>> {
        self.inner.state.borrow().records.get(key).cloned()
    }

    fn collect<T>(&self, change_type: ElementChangeType, map: impl Fn(&ElementChange<K, E>) -> Option<T>) -> Vec<T> {
        self.inner
            .state
            .borrow()
            .records
            .values()
            .filter(|r| r.change_type == change_type)
            .filter_map(map)
            .collect()
    }

    /// Current elements under keys absent from the original.
    #[must_use]
    pub fn get_added_elements(&self) -> Vec<Rc<E>> {
        self.collect(ElementChangeType::Added, |r| r.current_element.clone())
    }

    /// Original elements under keys no longer present.
    #[must_use]
    pub fn get_removed_elements(&self) -> Vec<Rc<E>> {
        self.collect(ElementChangeType::Removed, |r| r.original_element.clone())
    }

    /// Current elements paired with the unequal originals they replaced.
    #[must_use]
    pub fn get_replaced_elements(&self) -> Vec<UpdateRef<Rc<E>>> {
        self.collect(ElementChangeType::Replaced, |r| {
            Some(UpdateRef::new(
                r.current_element.clone()?,
                r.original_element.clone()?,
            ))
        })
    }

    /// Original elements whose live counterpart is equal but changed
    /// internally. The live element is on the record's `current_element`.
    #[must_use]
    pub fn get_changed_elements(&self) -> Vec<Rc<E>> {
        self.collect(ElementChangeType::Changed, |r| r.original_element.clone())
    }

    /// Original elements with no record.
    #[must_use]
    pub fn get_unchanged_elements(&self) -> Vec<Rc<E>> {
        let state = self.inner.state.borrow();
        let Some(original) = &state.original else {
            return Vec::new();
        };
        original
            .iter()
            .filter(|(key, _)| !state.records.contains_key(*key))
            .map(|(_, element)| Rc::clone(element))
            .collect()
    }

    /// Collection equality as used by `try_recreate`.
    pub fn are_equal(
        &self,
        first: &Rc<KeyedCollection<K, E>>,
        second: &Rc<KeyedCollection<K, E>>,
    ) -> bool {
        self.inner.equality.are_collections_equal(first, second)
    }

    /// Element equality as used by replace and set eligibility.
    pub fn are_elements_equal(&self, first: Option<&Rc<E>>, second: Option<&Rc<E>>) -> bool {
        self.inner.equality.are_equal(first, second)
    }

    pub(crate) fn equality(&self) -> &ElementEquality<E> {
        &self.inner.equality
    }

    fn linked_variable(&self) -> Option<CollectionVariable<K, E>> {
        let state = self.inner.state.borrow();
        assert!(!state.disposed, "{}", VariableError::Disposed(COMPONENT));
        let linked = state
            .linked
            .as_ref()
            .unwrap_or_else(|| panic!("{}", VariableError::NotConfigured(COMPONENT)));
        linked.upgrade()
    }

    /// Reclassify every key from scratch and publish the moved records.
    ///
    /// # Panics
    ///
    /// If the tracker is disposed or not configured.
    pub fn detect_changes(&self) {
        let Some(variable) = self.linked_variable() else {
            return;
        };
        let value = variable.value();
        let changes = {
            let mut state = self.inner.state.borrow_mut();
            self.inner.update_changes(&mut state, &value)
        };
        self.inner.publish_collection(changes, None);
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.state.borrow().attached
    }

    /// Resume tracking and resynchronize.
    ///
    /// # Panics
    ///
    /// If the tracker is disposed.
    pub fn attach(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            assert!(!state.disposed, "{}", VariableError::Disposed(COMPONENT));
            if state.attached {
                return;
            }
            state.attached = true;
        }
        debug!("change tracker attached");
        self.detect_changes();
    }

    /// Stop reacting to mutations and nested changes.
    ///
    /// # Panics
    ///
    /// If the tracker is disposed.
    pub fn detach(&self) {
        let mut state = self.inner.state.borrow_mut();
        assert!(!state.disposed, "{}", VariableError::Disposed(COMPONENT));
        state.attached = false;
        debug!("change tracker detached");
    }

    /// Drop every subscription and record.
    pub fn dispose(&self) {
        let (collection_listeners, element_listeners) = {
            let mut state = self.inner.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.attached = false;
            state.linked = None;
            state.records.clear();
            (
                std::mem::take(&mut state.collection_listeners),
                std::mem::take(&mut state.element_listeners),
            )
        };
        drop(collection_listeners);
        drop(element_listeners);
        self.inner.on_change.dispose();
        debug!("change tracker disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.borrow().disposed
    }
}

impl<K: CollectionKey, E: Element> VariableChangeTracker for CollectionVariableChangeTracker<K, E> {
    fn has_changed(&self) -> bool {
        Self::has_changed(self)
    }

    /// `Rc<Vec<ElementChange<K, E>>>` when anything changed.
    fn changes(&self) -> Option<Rc<dyn Any>> {
        let changes = self.element_changes();
        if changes.is_empty() {
            None
        } else {
            Some(Rc::new(changes))
        }
    }

    fn listen_change(&self, listener: Box<dyn Fn(&VariableChangeEvent)>) -> Subscription {
        let tracker = Rc::downgrade(&self.inner);
        self.inner.on_change.listen(move |event| {
            let Some(inner) = tracker.upgrade() else {
                return;
            };
            let handle = CollectionVariableChangeTracker { inner };
            let has_changed = handle.has_changed();
            listener(&VariableChangeEvent {
                has_changed,
                changes: VariableChangeTracker::changes(&handle),
                source: Rc::clone(event) as Rc<dyn Any>,
            });
        })
    }

    fn detect_changes(&self) {
        Self::detect_changes(self);
    }

    fn is_attached(&self) -> bool {
        Self::is_attached(self)
    }

    fn attach(&self) {
        Self::attach(self);
    }

    fn detach(&self) {
        Self::detach(self);
    }
}

impl<K: CollectionKey, E: Element> Disposable for CollectionVariableChangeTracker<K, E> {
    fn dispose(&self) {
        Self::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionVariableParams;

    #[derive(Debug)]
    struct Item {
        id: u32,
        v: &'static str,
    }

    fn item(id: u32, v: &'static str) -> Rc<Item> {
        Rc::new(Item { id, v })
    }

    vartrack_core::plain_element!(Item);

    fn variable(initial: Vec<Rc<Item>>) -> CollectionVariable<u32, Item> {
        CollectionVariable::new(CollectionVariableParams::keyed_by(|i: &Item| i.id).with_value(initial))
    }

    fn types(tracker: &CollectionVariableChangeTracker<u32, Item>) -> Vec<(u32, ElementChangeType)> {
        tracker
            .element_changes()
            .iter()
            .map(|c| (c.key, c.change_type))
            .collect()
    }

    #[test]
    fn initial_value_is_the_baseline() {
        let var = variable(vec![item(1, "a"), item(2, "b")]);
        let tracker = var.change_tracker();

        assert!(!tracker.has_changed());
        assert_eq!(tracker.original_value().unwrap().name(), "original_elements");
        assert_eq!(tracker.get_unchanged_elements().len(), 2);
    }

    #[test]
    fn add_then_remove_restores_as_missing() {
        let var = variable(vec![item(1, "a")]);
        let log: Rc<RefCell<Vec<ElementChangeType>>> = Rc::default();
        let log_clone = Rc::clone(&log);
        let _sub = var.change_tracker().on_change().listen(move |e| {
            log_clone.borrow_mut().extend(e.changes().iter().map(|c| c.change_type));
        });

        let extra = item(2, "b");
        var.add([Rc::clone(&extra)]);
        assert_eq!(types(var.change_tracker()), vec![(2, ElementChangeType::Added)]);

        var.remove([extra]);
        assert!(!var.change_tracker().has_changed());
        assert_eq!(
            *log.borrow(),
            vec![ElementChangeType::Added, ElementChangeType::RestoredAsMissing]
        );
    }

    #[test]
    fn replace_and_restore_original_allocation() {
        let first = item(1, "a");
        let var = variable(vec![Rc::clone(&first)]);

        var.replace([item(1, "z")]);
        let replaced = var.change_tracker().get_replaced_elements();
        assert_eq!(replaced.len(), 1);
        assert_eq!((replaced[0].value.v, replaced[0].old_value.v), ("z", "a"));

        var.replace([first]);
        assert!(!var.change_tracker().has_changed());
    }

    #[test]
    fn removing_an_original_element_is_recorded() {
        let var = variable(vec![item(1, "a"), item(2, "b")]);
        var.remove([item(2, "")]);

        let removed = var.change_tracker().get_removed_elements();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].v, "b");
        assert_eq!(var.change_tracker().get_unchanged_elements().len(), 1);
    }

    #[test]
    fn detached_tracker_resynchronizes_on_attach() {
        let var = variable(vec![item(1, "a")]);
        let tracker = var.change_tracker().clone();
        tracker.detach();

        var.add([item(2, "b")]);
        assert!(!tracker.has_changed());

        let published = Rc::new(RefCell::new(0));
        let published_clone = Rc::clone(&published);
        let _sub = tracker.on_change().listen(move |e| {
            if let CollectionChangeEvent::Collection { source: None, changes } = &**e {
                *published_clone.borrow_mut() += changes.len();
            }
        });
        tracker.attach();

        assert_eq!(types(&tracker), vec![(2, ElementChangeType::Added)]);
        assert_eq!(*published.borrow(), 1);
    }

    #[test]
    fn comparer_makes_equal_replacements_unchanged() {
        let tracker = CollectionVariableChangeTracker::with_config(
            ChangeTrackerConfig::default().with_element_comparer(|a: &Item, b: &Item| a.v == b.v),
        );
        let var = CollectionVariable::new(
            CollectionVariableParams::keyed_by(|i: &Item| i.id)
                .with_value([item(1, "a")])
                .with_change_tracker(tracker),
        );

        var.recreate([item(1, "a")]);
        assert!(!var.change_tracker().has_changed());
        var.recreate([item(1, "b")]);
        assert_eq!(types(var.change_tracker()), vec![(1, ElementChangeType::Replaced)]);
    }

    #[test]
    fn changed_elements_report_the_original_allocation() {
        use crate::primitive::{PrimitiveVariable, PrimitiveVariableParams};

        type Field = PrimitiveVariable<&'static str>;
        let field = |v: &'static str| Rc::new(Field::new(PrimitiveVariableParams::new(Some(v))));
        let tracker = CollectionVariableChangeTracker::with_config(
            ChangeTrackerConfig::default()
                .with_element_comparer(|a: &Field, b: &Field| a.original_value() == b.original_value()),
        );
        let original = field("x");
        let var = CollectionVariable::new(
            CollectionVariableParams::keyed_by(|f: &Field| f.original_value())
                .with_value([Rc::clone(&original)])
                .with_change_tracker(tracker)
                .with_auto_dispose(false),
        );

        let edited = field("x");
        edited.update(Some("y"));
        var.recreate([Rc::clone(&edited)]);

        let changed = var.change_tracker().get_changed_elements();
        assert_eq!(changed.len(), 1);
        assert!(Rc::ptr_eq(&changed[0], &original));
        let record = var.change_tracker().change_of(&Some("x")).unwrap();
        assert_eq!(record.change_type, ElementChangeType::Changed);
        assert!(Rc::ptr_eq(record.current_element.as_ref().unwrap(), &edited));
    }

    #[test]
    fn explicit_original_value() {
        let tracker = CollectionVariableChangeTracker::with_config(
            ChangeTrackerConfig::default().with_original_value([item(9, "base")]),
        );
        let var = CollectionVariable::new(
            CollectionVariableParams::keyed_by(|i: &Item| i.id)
                .with_value([item(1, "a")])
                .with_change_tracker(tracker),
        );

        assert_eq!(
            types(var.change_tracker()),
            vec![(1, ElementChangeType::Added), (9, ElementChangeType::Removed)]
        );
    }

    #[test]
    fn configuring_twice_is_rejected() {
        let var = variable(vec![]);
        let err = var.change_tracker().configure(&var).unwrap_err();
        assert_eq!(err, VariableError::AlreadyConfigured("change tracker"));
    }

    #[test]
    #[should_panic(expected = "change tracker has been disposed")]
    fn detect_changes_after_dispose_panics() {
        let var = variable(vec![]);
        var.change_tracker().dispose();
        var.change_tracker().detect_changes();
    }
}
