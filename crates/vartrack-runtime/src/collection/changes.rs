#![forbid(unsafe_code)]

//! Per-key change records and element equality.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use vartrack_core::{CollectionKey, KeyedCollection, VariableChangeEvent};

use super::events::CollectionMutation;

/// Caller-supplied structural equality for elements.
pub type ElementComparer<E> = Rc<dyn Fn(&E, &E) -> bool>;

/// Element equality: allocation identity, optionally widened by a comparer.
pub struct ElementEquality<E> {
    comparer: Option<ElementComparer<E>>,
}

impl<E> Clone for ElementEquality<E> {
    fn clone(&self) -> Self {
        Self {
            comparer: self.comparer.clone(),
        }
    }
}

impl<E> Default for ElementEquality<E> {
    fn default() -> Self {
        Self { comparer: None }
    }
}

impl<E> fmt::Debug for ElementEquality<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementEquality")
            .field("has_comparer", &self.comparer.is_some())
            .finish()
    }
}

impl<E> ElementEquality<E> {
    /// Identity-only equality.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Identity or `comparer`.
    #[must_use]
    pub fn with_comparer(comparer: impl Fn(&E, &E) -> bool + 'static) -> Self {
        Self {
            comparer: Some(Rc::new(comparer)),
        }
    }

    pub(crate) fn from_comparer(comparer: Option<ElementComparer<E>>) -> Self {
        Self { comparer }
    }

    /// Same allocation, both absent, or both present and equal by the
    /// comparer.
    pub fn are_equal(&self, first: Option<&Rc<E>>, second: Option<&Rc<E>>) -> bool {
        match (first, second) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                Rc::ptr_eq(a, b) || self.comparer.as_ref().is_some_and(|compare| compare(a, b))
            }
            _ => false,
        }
    }

    /// Same snapshot, or same length with every entry equal to the entry
    /// stored under the same key.
    pub fn are_collections_equal<K: CollectionKey>(
        &self,
        first: &Rc<KeyedCollection<K, E>>,
        second: &Rc<KeyedCollection<K, E>>,
    ) -> bool {
        Rc::ptr_eq(first, second)
            || (first.len() == second.len()
                && first
                    .iter()
                    .all(|(key, element)| self.are_equal(Some(element), second.get(key))))
    }
}

/// Relationship between the original and current element under one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementChangeType {
    /// Present now, absent from the original.
    Added,
    /// Present in the original, absent now.
    Removed,
    /// Present in both, not equal.
    Replaced,
    /// Equal to the original, but its own tracker reports changes.
    Changed,
    /// Back to an element equal to the original with no nested changes.
    RestoredAsExisting,
    /// An added element removed again.
    RestoredAsMissing,
}

impl ElementChangeType {
    /// Whether this type describes a transition back to the original
    /// rather than a persistent difference.
    #[must_use]
    pub const fn is_restoration(self) -> bool {
        matches!(self, Self::RestoredAsExisting | Self::RestoredAsMissing)
    }
}

impl fmt::Display for ElementChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Replaced => "replaced",
            Self::Changed => "changed",
            Self::RestoredAsExisting => "restored-as-existing",
            Self::RestoredAsMissing => "restored-as-missing",
        };
        f.write_str(name)
    }
}

/// Change observed for one key.
pub struct ElementChange<K, E> {
    pub key: K,
    pub change_type: ElementChangeType,
    pub original_element: Option<Rc<E>>,
    pub current_element: Option<Rc<E>>,
    /// Nested tracker payload when the element is itself a variable.
    pub element_changes: Option<Rc<dyn Any>>,
}

impl<K: Clone, E> Clone for ElementChange<K, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            change_type: self.change_type,
            original_element: self.original_element.clone(),
            current_element: self.current_element.clone(),
            element_changes: self.element_changes.clone(),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for ElementChange<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementChange")
            .field("key", &self.key)
            .field("change_type", &self.change_type)
            .field("has_original", &self.original_element.is_some())
            .field("has_current", &self.current_element.is_some())
            .field("has_element_changes", &self.element_changes.is_some())
            .finish()
    }
}

fn same_ref<E>(first: Option<&Rc<E>>, second: Option<&Rc<E>>) -> bool {
    match (first, second) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

impl<K, E> ElementChange<K, E> {
    pub(crate) fn new(
        key: K,
        change_type: ElementChangeType,
        original_element: Option<Rc<E>>,
        current_element: Option<Rc<E>>,
        element_changes: Option<Rc<dyn Any>>,
    ) -> Self {
        Self {
            key,
            change_type,
            original_element,
            current_element,
            element_changes,
        }
    }

    /// Same type over the same original and current allocations.
    pub fn is_same_as(&self, other: &Self) -> bool {
        self.change_type == other.change_type
            && same_ref(
                self.original_element.as_ref(),
                other.original_element.as_ref(),
            )
            && same_ref(self.current_element.as_ref(), other.current_element.as_ref())
    }
}

/// Published by a collection change tracker.
pub enum CollectionChangeEvent<K, E> {
    /// Records produced by a structural mutation or a full recompute.
    /// `source` is `None` for an explicit `detect_changes`.
    Collection {
        changes: Vec<ElementChange<K, E>>,
        source: Option<CollectionMutation<K, E>>,
    },
    /// A nested element's own tracker reported a change.
    Element {
        change: ElementChange<K, E>,
        source: VariableChangeEvent,
    },
}

impl<K, E> CollectionChangeEvent<K, E> {
    /// Records carried by this event.
    pub fn changes(&self) -> &[ElementChange<K, E>] {
        match self {
            Self::Collection { changes, .. } => changes,
            Self::Element { change, .. } => std::slice::from_ref(change),
        }
    }

    /// Whether a nested element triggered this event.
    #[must_use]
    pub fn is_element_event(&self) -> bool {
        matches!(self, Self::Element { .. })
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CollectionChangeEvent<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection { changes, source } => f
                .debug_struct("Collection")
                .field("changes", changes)
                .field("source", &source.as_ref().map(CollectionMutation::kind))
                .finish(),
            Self::Element { change, source } => f
                .debug_struct("Element")
                .field("change", change)
                .field("source", source)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vartrack_core::CollectionSchema;

    #[derive(Debug)]
    struct Tag {
        id: u8,
        text: &'static str,
    }

    fn tag(id: u8, text: &'static str) -> Rc<Tag> {
        Rc::new(Tag { id, text })
    }

    #[test]
    fn identity_equality_ignores_content() {
        let eq = ElementEquality::<Tag>::identity();
        let a = tag(1, "x");
        assert!(eq.are_equal(Some(&a), Some(&Rc::clone(&a))));
        assert!(!eq.are_equal(Some(&a), Some(&tag(1, "x"))));
        assert!(eq.are_equal(None, None));
        assert!(!eq.are_equal(Some(&a), None));
    }

    #[test]
    fn comparer_widens_equality() {
        let eq = ElementEquality::with_comparer(|a: &Tag, b: &Tag| a.text == b.text);
        assert!(eq.are_equal(Some(&tag(1, "x")), Some(&tag(2, "x"))));
        assert!(!eq.are_equal(Some(&tag(1, "x")), Some(&tag(1, "y"))));
    }

    #[test]
    fn collection_equality_is_keyed() {
        let eq = ElementEquality::with_comparer(|a: &Tag, b: &Tag| a.text == b.text);
        let schema = CollectionSchema::new(|t: &Tag| t.id);
        let first = Rc::new(KeyedCollection::with_elements(schema.clone(), [tag(1, "a"), tag(2, "b")]));
        let reordered = Rc::new(KeyedCollection::with_elements(schema.clone(), [tag(2, "b"), tag(1, "a")]));
        let shorter = Rc::new(KeyedCollection::with_elements(schema, [tag(1, "a")]));

        assert!(eq.are_collections_equal(&first, &reordered));
        assert!(!eq.are_collections_equal(&first, &shorter));
        assert!(!ElementEquality::identity().are_collections_equal(&first, &reordered));
    }

    #[test]
    fn same_as_compares_allocations() {
        let a = tag(1, "a");
        let record = ElementChange::<u8, Tag>::new(1, ElementChangeType::Added, None, Some(Rc::clone(&a)), None);
        let again = ElementChange::new(1, ElementChangeType::Added, None, Some(a), None);
        let other = ElementChange::new(1, ElementChangeType::Added, None, Some(tag(1, "a")), None);

        assert!(record.is_same_as(&again));
        assert!(!record.is_same_as(&other));
        assert_eq!(ElementChangeType::RestoredAsMissing.to_string(), "restored-as-missing");
        assert!(ElementChangeType::RestoredAsExisting.is_restoration());
    }
}
