#![forbid(unsafe_code)]

//! Events published by a collection variable.
//!
//! # Design
//!
//! Every mutation publishes a cancellable "-ing" event before touching the
//! collection and an "-ed" event after committing. "-ing" events record
//! vetoes as a set of keys; the accepted candidates are re-filtered against
//! that set on every read, so the answer reflects whatever the set holds
//! once dispatch finishes.
//!
//! All events carry `Rc` snapshots of the tracker's original collection and
//! of the live collection at publish time. "-ed" and recreated events are
//! published as `Rc<…>` so listeners can keep them as change sources.
//!
//! # Invariants
//!
//! 1. Cancelling is by key: cancelling one element vetoes every candidate
//!    with the same key.
//! 2. `ignored_elements` on an "-ed" event lists the candidates whose key
//!    was not committed, or was committed with a different allocation.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use vartrack_core::{CollectionKey, KeyedCollection, UpdateRef};

use super::changes::ElementEquality;

type Snapshot<K, E> = Rc<KeyedCollection<K, E>>;

/// Veto state shared by every "-ing" event.
pub struct CancellableElements<K, E> {
    original_value: Snapshot<K, E>,
    current_value: Snapshot<K, E>,
    cancelled: RefCell<HashSet<K>>,
}

impl<K: CollectionKey, E> CancellableElements<K, E> {
    pub(crate) fn new(original_value: Snapshot<K, E>, current_value: Snapshot<K, E>) -> Self {
        Self {
            original_value,
            current_value,
            cancelled: RefCell::new(HashSet::new()),
        }
    }

    /// Tracker baseline.
    pub fn original_value(&self) -> &Snapshot<K, E> {
        &self.original_value
    }

    /// Live collection before the mutation.
    pub fn current_value(&self) -> &Snapshot<K, E> {
        &self.current_value
    }

    /// Veto the candidate with the key of `element`.
    pub fn cancel(&self, element: &E) {
        self.cancel_key(self.current_value.key_of(element));
    }

    /// Veto the candidate with `key`.
    pub fn cancel_key(&self, key: K) {
        self.cancelled.borrow_mut().insert(key);
    }

    /// Whether the key of `element` is vetoed.
    pub fn is_cancelled(&self, element: &E) -> bool {
        self.is_key_cancelled(&self.current_value.key_of(element))
    }

    /// Whether `key` is vetoed.
    pub fn is_key_cancelled(&self, key: &K) -> bool {
        self.cancelled.borrow().contains(key)
    }
}

/// Common surface of the cancellable "-ing" events.
pub trait CancellableEvent<K: CollectionKey, E> {
    /// Veto state.
    fn base(&self) -> &CancellableElements<K, E>;

    /// Veto every candidate.
    fn cancel_all(&self);

    fn original_value(&self) -> &Snapshot<K, E> {
        self.base().original_value()
    }

    fn current_value(&self) -> &Snapshot<K, E> {
        self.base().current_value()
    }

    fn cancel(&self, element: &E) {
        self.base().cancel(element);
    }

    fn cancel_key(&self, key: K) {
        self.base().cancel_key(key);
    }

    fn is_cancelled(&self, element: &E) -> bool {
        self.base().is_cancelled(element)
    }

    fn is_key_cancelled(&self, key: &K) -> bool {
        self.base().is_key_cancelled(key)
    }
}

/// Candidates whose key was not committed with the same allocation.
fn ignored<'a, K: CollectionKey, E: 'a>(
    keys: &KeyedCollection<K, E>,
    expected: impl IntoIterator<Item = &'a Rc<E>>,
    actual: impl IntoIterator<Item = &'a Rc<E>>,
) -> Vec<Rc<E>> {
    let committed: HashMap<K, &Rc<E>> = actual
        .into_iter()
        .map(|element| (keys.key_of(element), element))
        .collect();
    expected
        .into_iter()
        .filter(|element| {
            committed
                .get(&keys.key_of(element))
                .is_none_or(|stored| !Rc::ptr_eq(stored, element))
        })
        .cloned()
        .collect()
}

macro_rules! cancellable_event {
    ($name:ident, |$event:ident| $cancel_all:block) => {
        impl<K: CollectionKey, E> CancellableEvent<K, E> for $name<K, E> {
            fn base(&self) -> &CancellableElements<K, E> {
                &self.base
            }

            fn cancel_all(&self) {
                let $event = self;
                $cancel_all
            }
        }

        impl<K: fmt::Debug, E> fmt::Debug for $name<K, E> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("cancelled", &self.base.cancelled.borrow())
                    .finish_non_exhaustive()
            }
        }
    };
}

/// Published before elements are added.
pub struct AddingElementsEvent<K, E> {
    base: CancellableElements<K, E>,
    elements_to_add: Vec<Rc<E>>,
}

impl<K: CollectionKey, E> AddingElementsEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        elements_to_add: Vec<Rc<E>>,
    ) -> Self {
        Self {
            base: CancellableElements::new(original_value, current_value),
            elements_to_add,
        }
    }

    /// Every candidate, vetoed or not.
    pub fn elements_to_add(&self) -> &[Rc<E>] {
        &self.elements_to_add
    }

    /// Candidates not vetoed so far.
    pub fn accepted_elements(&self) -> impl Iterator<Item = &Rc<E>> + '_ {
        self.elements_to_add
            .iter()
            .filter(|e| !self.base.is_cancelled(e))
    }

    pub(crate) fn into_candidates(self) -> Vec<Rc<E>> {
        self.elements_to_add
    }
}

cancellable_event!(AddingElementsEvent, |event| {
    for element in &event.elements_to_add {
        event.base.cancel(element);
    }
});

/// Published before elements are removed.
pub struct RemovingElementsEvent<K, E> {
    base: CancellableElements<K, E>,
    elements_to_remove: Vec<Rc<E>>,
}

impl<K: CollectionKey, E> RemovingElementsEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        elements_to_remove: Vec<Rc<E>>,
    ) -> Self {
        Self {
            base: CancellableElements::new(original_value, current_value),
            elements_to_remove,
        }
    }

    /// Every candidate, vetoed or not.
    pub fn elements_to_remove(&self) -> &[Rc<E>] {
        &self.elements_to_remove
    }

    /// Candidates not vetoed so far.
    pub fn accepted_elements(&self) -> impl Iterator<Item = &Rc<E>> + '_ {
        self.elements_to_remove
            .iter()
            .filter(|e| !self.base.is_cancelled(e))
    }

    pub(crate) fn into_candidates(self) -> Vec<Rc<E>> {
        self.elements_to_remove
    }
}

cancellable_event!(RemovingElementsEvent, |event| {
    for element in &event.elements_to_remove {
        event.base.cancel(element);
    }
});

/// Published before stored elements are swapped for new allocations.
pub struct ReplacingElementsEvent<K, E> {
    base: CancellableElements<K, E>,
    elements_to_replace: Vec<UpdateRef<Rc<E>>>,
}

impl<K: CollectionKey, E> ReplacingElementsEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        elements_to_replace: Vec<UpdateRef<Rc<E>>>,
    ) -> Self {
        Self {
            base: CancellableElements::new(original_value, current_value),
            elements_to_replace,
        }
    }

    /// Every candidate pair, vetoed or not.
    pub fn elements_to_replace(&self) -> &[UpdateRef<Rc<E>>] {
        &self.elements_to_replace
    }

    /// Candidate pairs whose key is not vetoed.
    pub fn accepted_elements(&self) -> impl Iterator<Item = &UpdateRef<Rc<E>>> + '_ {
        self.elements_to_replace
            .iter()
            .filter(|u| !self.base.is_cancelled(&u.value))
    }

    pub(crate) fn into_candidates(self) -> Vec<UpdateRef<Rc<E>>> {
        self.elements_to_replace
    }
}

cancellable_event!(ReplacingElementsEvent, |event| {
    for update in &event.elements_to_replace {
        event.base.cancel(&update.value);
    }
});

/// Published before an add-or-replace.
pub struct SettingElementsEvent<K, E> {
    base: CancellableElements<K, E>,
    elements_to_add: Vec<Rc<E>>,
    elements_to_replace: Vec<UpdateRef<Rc<E>>>,
}

impl<K: CollectionKey, E> SettingElementsEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        elements_to_add: Vec<Rc<E>>,
        elements_to_replace: Vec<UpdateRef<Rc<E>>>,
    ) -> Self {
        Self {
            base: CancellableElements::new(original_value, current_value),
            elements_to_add,
            elements_to_replace,
        }
    }

    /// Candidates whose key is absent.
    pub fn elements_to_add(&self) -> &[Rc<E>] {
        &self.elements_to_add
    }

    /// Candidates whose key is stored with an unequal element.
    pub fn elements_to_replace(&self) -> &[UpdateRef<Rc<E>>] {
        &self.elements_to_replace
    }

    pub fn accepted_elements_to_add(&self) -> impl Iterator<Item = &Rc<E>> + '_ {
        self.elements_to_add
            .iter()
            .filter(|e| !self.base.is_cancelled(e))
    }

    pub fn accepted_elements_to_replace(&self) -> impl Iterator<Item = &UpdateRef<Rc<E>>> + '_ {
        self.elements_to_replace
            .iter()
            .filter(|u| !self.base.is_cancelled(&u.value))
    }

    pub(crate) fn into_candidates(self) -> (Vec<Rc<E>>, Vec<UpdateRef<Rc<E>>>) {
        (self.elements_to_add, self.elements_to_replace)
    }
}

cancellable_event!(SettingElementsEvent, |event| {
    for element in &event.elements_to_add {
        event.base.cancel(element);
    }
    for update in &event.elements_to_replace {
        event.base.cancel(&update.value);
    }
});

/// Published after elements were added.
pub struct ElementsAddedEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    /// Live collection after the commit.
    pub current_value: Snapshot<K, E>,
    /// Exactly the elements that were stored.
    pub added_elements: Vec<Rc<E>>,
    candidates: Vec<Rc<E>>,
}

impl<K: CollectionKey, E> ElementsAddedEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        added_elements: Vec<Rc<E>>,
        candidates: Vec<Rc<E>>,
    ) -> Self {
        Self {
            original_value,
            current_value,
            added_elements,
            candidates,
        }
    }

    /// Candidates that were vetoed or dropped as duplicates.
    pub fn ignored_elements(&self) -> Vec<Rc<E>> {
        ignored(&self.current_value, &self.candidates, &self.added_elements)
    }
}

/// Published after elements were removed.
pub struct ElementsRemovedEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    pub current_value: Snapshot<K, E>,
    /// The stored elements that were removed.
    pub removed_elements: Vec<Rc<E>>,
    candidates: Vec<Rc<E>>,
}

impl<K: CollectionKey, E> ElementsRemovedEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        removed_elements: Vec<Rc<E>>,
        candidates: Vec<Rc<E>>,
    ) -> Self {
        Self {
            original_value,
            current_value,
            removed_elements,
            candidates,
        }
    }

    /// Candidates that were vetoed, absent, or not the stored allocation.
    pub fn ignored_elements(&self) -> Vec<Rc<E>> {
        ignored(&self.current_value, &self.candidates, &self.removed_elements)
    }
}

/// Published after stored elements were replaced.
pub struct ElementsReplacedEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    pub current_value: Snapshot<K, E>,
    /// Applied pairs; `old_value` is the superseded allocation.
    pub replaced_elements: Vec<UpdateRef<Rc<E>>>,
    candidates: Vec<UpdateRef<Rc<E>>>,
}

impl<K: CollectionKey, E> ElementsReplacedEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        replaced_elements: Vec<UpdateRef<Rc<E>>>,
        candidates: Vec<UpdateRef<Rc<E>>>,
    ) -> Self {
        Self {
            original_value,
            current_value,
            replaced_elements,
            candidates,
        }
    }

    /// New values that did not make it into the collection.
    pub fn ignored_elements(&self) -> Vec<Rc<E>> {
        ignored(
            &self.current_value,
            self.candidates.iter().map(|u| &u.value),
            self.replaced_elements.iter().map(|u| &u.value),
        )
    }
}

/// Published after an add-or-replace.
pub struct ElementsSetEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    pub current_value: Snapshot<K, E>,
    pub added_elements: Vec<Rc<E>>,
    pub replaced_elements: Vec<UpdateRef<Rc<E>>>,
    candidates_to_add: Vec<Rc<E>>,
    candidates_to_replace: Vec<UpdateRef<Rc<E>>>,
}

impl<K: CollectionKey, E> ElementsSetEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        added_elements: Vec<Rc<E>>,
        replaced_elements: Vec<UpdateRef<Rc<E>>>,
        candidates_to_add: Vec<Rc<E>>,
        candidates_to_replace: Vec<UpdateRef<Rc<E>>>,
    ) -> Self {
        Self {
            original_value,
            current_value,
            added_elements,
            replaced_elements,
            candidates_to_add,
            candidates_to_replace,
        }
    }

    /// Replace candidates, then add candidates, that were not committed.
    pub fn ignored_elements(&self) -> Vec<Rc<E>> {
        let mut skipped = ignored(
            &self.current_value,
            self.candidates_to_replace.iter().map(|u| &u.value),
            self.replaced_elements.iter().map(|u| &u.value),
        );
        skipped.extend(ignored(
            &self.current_value,
            &self.candidates_to_add,
            &self.added_elements,
        ));
        skipped
    }
}

/// Which operation replaced the collection wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecreationSource {
    Reset,
    TryRecreate,
    Recreate,
    Clear,
}

impl fmt::Display for RecreationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reset => "reset",
            Self::TryRecreate => "try-recreate",
            Self::Recreate => "recreate",
            Self::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Why a `try_recreate` did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecreateCancellationReason {
    /// The candidate equals the live collection.
    EqualityComparison,
    /// A recreating listener set the cancel flag.
    OnRecreatingEvent,
}

/// Pairs each element of `outer` with the element stored under its key in
/// `inner`, keeping what `select` returns.
fn join<K: CollectionKey, E, R>(
    outer: &KeyedCollection<K, E>,
    inner: &KeyedCollection<K, E>,
    mut select: impl FnMut(&Rc<E>, Option<&Rc<E>>) -> Option<R>,
) -> Vec<R> {
    outer
        .iter()
        .filter_map(|(key, element)| select(element, inner.get(key)))
        .collect()
}

/// Published by `try_recreate` before the live collection is swapped.
pub struct RecreatingEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    pub current_value: Snapshot<K, E>,
    /// The candidate collection.
    pub next_value: Snapshot<K, E>,
    cancelled: Cell<bool>,
    equality: ElementEquality<E>,
}

impl<K: CollectionKey, E> RecreatingEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        next_value: Snapshot<K, E>,
        equality: ElementEquality<E>,
    ) -> Self {
        Self {
            original_value,
            current_value,
            next_value,
            cancelled: Cell::new(false),
            equality,
        }
    }

    /// Veto the whole recreation.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Candidate elements whose key is not live.
    pub fn elements_to_add(&self) -> Vec<Rc<E>> {
        join(&self.next_value, &self.current_value, |next, live| {
            live.is_none().then(|| Rc::clone(next))
        })
    }

    /// Live elements whose key the candidate lacks.
    pub fn elements_to_remove(&self) -> Vec<Rc<E>> {
        join(&self.current_value, &self.next_value, |live, next| {
            next.is_none().then(|| Rc::clone(live))
        })
    }

    /// Candidate elements that differ from the live element under their key.
    pub fn elements_to_replace(&self) -> Vec<UpdateRef<Rc<E>>> {
        join(&self.next_value, &self.current_value, |next, live| {
            let live = live?;
            (!self.equality.are_equal(Some(next), Some(live)))
                .then(|| UpdateRef::new(Rc::clone(next), Rc::clone(live)))
        })
    }

    /// Candidate elements equal to the live element under their key.
    pub fn elements_to_persist(&self) -> Vec<Rc<E>> {
        join(&self.next_value, &self.current_value, |next, live| {
            let live = live?;
            self.equality
                .are_equal(Some(next), Some(live))
                .then(|| Rc::clone(next))
        })
    }
}

impl<K: CollectionKey, E> fmt::Debug for RecreatingEvent<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecreatingEvent")
            .field("next_len", &self.next_value.len())
            .field("cancelled", &self.cancelled.get())
            .finish_non_exhaustive()
    }
}

/// Published after the live collection was swapped wholesale.
pub struct RecreatedEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    pub previous_value: Snapshot<K, E>,
    pub current_value: Snapshot<K, E>,
    pub source: RecreationSource,
    equality: ElementEquality<E>,
}

impl<K: CollectionKey, E> RecreatedEvent<K, E> {
    pub(crate) fn new(
        original_value: Snapshot<K, E>,
        previous_value: Snapshot<K, E>,
        current_value: Snapshot<K, E>,
        source: RecreationSource,
        equality: ElementEquality<E>,
    ) -> Self {
        Self {
            original_value,
            previous_value,
            current_value,
            source,
            equality,
        }
    }

    pub fn added_elements(&self) -> Vec<Rc<E>> {
        join(&self.current_value, &self.previous_value, |now, before| {
            before.is_none().then(|| Rc::clone(now))
        })
    }

    pub fn removed_elements(&self) -> Vec<Rc<E>> {
        join(&self.previous_value, &self.current_value, |before, now| {
            now.is_none().then(|| Rc::clone(before))
        })
    }

    pub fn replaced_elements(&self) -> Vec<UpdateRef<Rc<E>>> {
        join(&self.current_value, &self.previous_value, |now, before| {
            let before = before?;
            (!self.equality.are_equal(Some(now), Some(before)))
                .then(|| UpdateRef::new(Rc::clone(now), Rc::clone(before)))
        })
    }

    pub fn persisted_elements(&self) -> Vec<Rc<E>> {
        join(&self.current_value, &self.previous_value, |now, before| {
            let before = before?;
            self.equality
                .are_equal(Some(now), Some(before))
                .then(|| Rc::clone(now))
        })
    }
}

/// Published when `try_recreate` gives up.
pub struct RecreateCancelledEvent<K, E> {
    pub original_value: Snapshot<K, E>,
    pub current_value: Snapshot<K, E>,
    /// The candidate that was not applied.
    pub cancelled_value: Snapshot<K, E>,
    pub reason: RecreateCancellationReason,
}

/// A committed structural mutation, as carried by tracker and validator
/// events.
pub enum CollectionMutation<K, E> {
    Added(Rc<ElementsAddedEvent<K, E>>),
    Removed(Rc<ElementsRemovedEvent<K, E>>),
    Replaced(Rc<ElementsReplacedEvent<K, E>>),
    Set(Rc<ElementsSetEvent<K, E>>),
    Recreated(Rc<RecreatedEvent<K, E>>),
}

impl<K, E> Clone for CollectionMutation<K, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Added(e) => Self::Added(Rc::clone(e)),
            Self::Removed(e) => Self::Removed(Rc::clone(e)),
            Self::Replaced(e) => Self::Replaced(Rc::clone(e)),
            Self::Set(e) => Self::Set(Rc::clone(e)),
            Self::Recreated(e) => Self::Recreated(Rc::clone(e)),
        }
    }
}

impl<K, E> CollectionMutation<K, E> {
    /// Short name of the mutation.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Removed(_) => "removed",
            Self::Replaced(_) => "replaced",
            Self::Set(_) => "set",
            Self::Recreated(_) => "recreated",
        }
    }

    /// Live collection after the mutation.
    pub fn current_value(&self) -> &Snapshot<K, E> {
        match self {
            Self::Added(e) => &e.current_value,
            Self::Removed(e) => &e.current_value,
            Self::Replaced(e) => &e.current_value,
            Self::Set(e) => &e.current_value,
            Self::Recreated(e) => &e.current_value,
        }
    }
}

impl<K, E> fmt::Debug for CollectionMutation<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CollectionMutation").field(&self.kind()).finish()
    }
}
