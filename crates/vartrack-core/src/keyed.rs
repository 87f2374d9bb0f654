#![forbid(unsafe_code)]

//! Ordered unique-key collections with secondary lookups.
//!
//! # Design
//!
//! A [`KeyedCollection`] stores shared elements (`Rc<E>`) in insertion order,
//! keyed by a primary key derived from each element through the
//! [`CollectionSchema`] key selector. Secondary lookups group elements under
//! string keys and are kept in sync on every add and delete.
//!
//! Element identity is allocation identity: two `Rc<E>` pointing at the same
//! allocation are "the same element". Key identity is `K: Eq + Hash`, so
//! structural keys need no stringifier; the optional key formatter only
//! controls how keys are rendered in diagnostics.
//!
//! # Invariants
//!
//! 1. At most one element per primary key.
//! 2. Iteration order is insertion order; deleting preserves the relative
//!    order of the survivors.
//! 3. For every secondary lookup, each stored element appears exactly once,
//!    under the key its selector produced at insertion time.
//! 4. Range deletes make a single pass over the map, so removing `m` keys
//!    from `n` costs O(n + m), not O(n * m).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{VariableError, VariableResult};

/// Bounds required of a primary key.
pub trait CollectionKey: Clone + Eq + Hash + fmt::Debug + 'static {}

impl<T: Clone + Eq + Hash + fmt::Debug + 'static> CollectionKey for T {}

/// Derives the primary key of an element.
pub type KeySelector<K, E> = Rc<dyn Fn(&E) -> K>;

/// Renders a key for diagnostics.
pub type KeyFormatter<K> = Rc<dyn Fn(&K) -> String>;

/// A named secondary lookup grouping elements by a string key.
pub struct LookupDefinition<E> {
    name: String,
    selector: Rc<dyn Fn(&E) -> String>,
}

impl<E> Clone for LookupDefinition<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            selector: Rc::clone(&self.selector),
        }
    }
}

impl<E> fmt::Debug for LookupDefinition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<E> LookupDefinition<E> {
    /// Define a lookup named `name` keyed by `selector`.
    pub fn new(name: impl Into<String>, selector: impl Fn(&E) -> String + 'static) -> Self {
        Self {
            name: name.into(),
            selector: Rc::new(selector),
        }
    }

    /// Lookup name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Key and lookup configuration shared by a collection and every collection
/// cloned from its schema.
pub struct CollectionSchema<K, E> {
    name: String,
    key_selector: KeySelector<K, E>,
    key_formatter: Option<KeyFormatter<K>>,
    lookups: Vec<LookupDefinition<E>>,
}

impl<K, E> Clone for CollectionSchema<K, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key_selector: Rc::clone(&self.key_selector),
            key_formatter: self.key_formatter.clone(),
            lookups: self.lookups.clone(),
        }
    }
}

impl<K, E> fmt::Debug for CollectionSchema<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSchema")
            .field("name", &self.name)
            .field("has_key_formatter", &self.key_formatter.is_some())
            .field("lookups", &self.lookups)
            .finish()
    }
}

impl<K: CollectionKey, E> CollectionSchema<K, E> {
    /// Default collection name.
    pub const DEFAULT_NAME: &'static str = "elements";

    /// Create a schema keyed by `key_selector`.
    pub fn new(key_selector: impl Fn(&E) -> K + 'static) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            key_selector: Rc::new(key_selector),
            key_formatter: None,
            lookups: Vec::new(),
        }
    }

    /// Set the collection name. Empty names fall back to the default.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.is_empty() {
            Self::DEFAULT_NAME.to_string()
        } else {
            name
        };
        self
    }

    /// Set how keys are rendered in diagnostics.
    #[must_use]
    pub fn with_key_formatter(mut self, formatter: impl Fn(&K) -> String + 'static) -> Self {
        self.key_formatter = Some(Rc::new(formatter));
        self
    }

    /// Add a secondary lookup.
    #[must_use]
    pub fn with_lookup(mut self, lookup: LookupDefinition<E>) -> Self {
        self.lookups.push(lookup);
        self
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Secondary lookup definitions.
    #[must_use]
    pub fn lookups(&self) -> &[LookupDefinition<E>] {
        &self.lookups
    }

    /// Primary key of `element`.
    pub fn key_of(&self, element: &E) -> K {
        (self.key_selector)(element)
    }

    /// Render `key` with the formatter, or its `Debug` form.
    pub fn format_key(&self, key: &K) -> String {
        match &self.key_formatter {
            Some(formatter) => formatter(key),
            None => format!("{key:?}"),
        }
    }
}

/// An ordered map of shared elements keyed by a derived primary key.
pub struct KeyedCollection<K, E> {
    schema: Rc<CollectionSchema<K, E>>,
    entities: IndexMap<K, Rc<E>>,
    secondary: Vec<HashMap<String, Vec<K>>>,
}

impl<K: Clone, E> Clone for KeyedCollection<K, E> {
    fn clone(&self) -> Self {
        Self {
            schema: Rc::clone(&self.schema),
            entities: self.entities.clone(),
            secondary: self.secondary.clone(),
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for KeyedCollection<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCollection")
            .field("name", &self.schema.name)
            .field("keys", &self.entities.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: CollectionKey, E> KeyedCollection<K, E> {
    /// Create an empty collection.
    #[must_use]
    pub fn new(schema: CollectionSchema<K, E>) -> Self {
        Self::from_schema(Rc::new(schema))
    }

    /// Create a collection holding `elements`. Later duplicates by key are
    /// dropped.
    pub fn with_elements(
        schema: CollectionSchema<K, E>,
        elements: impl IntoIterator<Item = Rc<E>>,
    ) -> Self {
        let mut collection = Self::new(schema);
        collection.try_add_range(elements);
        collection
    }

    fn from_schema(schema: Rc<CollectionSchema<K, E>>) -> Self {
        let secondary = vec![HashMap::new(); schema.lookups.len()];
        Self {
            schema,
            entities: IndexMap::new(),
            secondary,
        }
    }

    /// An empty collection with the same name, key and lookups.
    #[must_use]
    pub fn clone_schema(&self) -> Self {
        Self::from_schema(Rc::clone(&self.schema))
    }

    /// An empty collection with the same key and lookups under a new name.
    #[must_use]
    pub fn clone_schema_named(&self, name: impl Into<String>) -> Self {
        let schema = (*self.schema).clone().with_name(name);
        Self::from_schema(Rc::new(schema))
    }

    /// Shared schema.
    #[must_use]
    pub fn schema(&self) -> &CollectionSchema<K, E> {
        &self.schema
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Primary key of `element`.
    pub fn key_of(&self, element: &E) -> K {
        self.schema.key_of(element)
    }

    /// Render `key` for diagnostics.
    pub fn format_key(&self, key: &K) -> String {
        self.schema.format_key(key)
    }

    /// Whether an element with the same key as `element` is stored.
    pub fn has(&self, element: &E) -> bool {
        self.entities.contains_key(&self.key_of(element))
    }

    /// Whether `key` is stored.
    pub fn has_key(&self, key: &K) -> bool {
        self.entities.contains_key(key)
    }

    /// Element stored under `key`.
    pub fn get(&self, key: &K) -> Option<&Rc<E>> {
        self.entities.get(key)
    }

    /// Element stored under the key of `element`.
    pub fn try_get(&self, element: &E) -> Option<&Rc<E>> {
        self.entities.get(&self.key_of(element))
    }

    /// Elements in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Rc<E>> + '_ {
        self.entities.values()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entities.keys()
    }

    /// Key/element pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Rc<E>)> + '_ {
        self.entities.iter()
    }

    /// Add `element` unless its key is already stored.
    pub fn try_add(&mut self, element: Rc<E>) -> bool {
        let key = self.key_of(&element);
        if self.entities.contains_key(&key) {
            return false;
        }
        for (index, lookup) in self.schema.lookups.iter().enumerate() {
            let lookup_key = (lookup.selector)(&element);
            self.secondary[index]
                .entry(lookup_key)
                .or_default()
                .push(key.clone());
        }
        self.entities.insert(key, element);
        true
    }

    /// Add every element whose key is not yet stored; returns exactly the
    /// elements that were added, in input order.
    pub fn try_add_range(&mut self, elements: impl IntoIterator<Item = Rc<E>>) -> Vec<Rc<E>> {
        elements
            .into_iter()
            .filter(|element| self.try_add(Rc::clone(element)))
            .collect()
    }

    /// Remove the element stored under `key`.
    pub fn try_delete(&mut self, key: &K) -> Option<Rc<E>> {
        let removed = self.entities.shift_remove(key)?;
        for (index, lookup) in self.schema.lookups.iter().enumerate() {
            let lookup_key = (lookup.selector)(&removed);
            let group = &mut self.secondary[index];
            if let Some(keys) = group.get_mut(&lookup_key) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    group.remove(&lookup_key);
                }
            }
        }
        Some(removed)
    }

    /// Remove the elements stored under the keys of `elements`; returns the
    /// stored elements that were actually removed.
    pub fn try_delete_range<'a>(
        &mut self,
        elements: impl IntoIterator<Item = &'a Rc<E>>,
    ) -> Vec<Rc<E>>
    where
        E: 'a,
    {
        let keys: Vec<K> = elements.into_iter().map(|e| self.key_of(e)).collect();
        self.try_delete_keys(&keys)
    }

    /// Remove the elements stored under `keys` in one pass over the map.
    /// Absent and repeated keys are skipped; the removed elements come back
    /// in the order of `keys`.
    pub fn try_delete_keys(&mut self, keys: &[K]) -> Vec<Rc<E>> {
        let mut doomed = HashSet::with_capacity(keys.len());
        let removed: Vec<Rc<E>> = keys
            .iter()
            .filter_map(|key| {
                let stored = self.entities.get(key)?;
                doomed.insert(key.clone()).then(|| Rc::clone(stored))
            })
            .collect();
        if removed.is_empty() {
            return removed;
        }

        self.entities.retain(|key, _| !doomed.contains(key));
        for (index, lookup) in self.schema.lookups.iter().enumerate() {
            let touched: HashSet<String> = removed
                .iter()
                .map(|element| (lookup.selector)(element))
                .collect();
            let group = &mut self.secondary[index];
            for lookup_key in touched {
                if let Some(keys) = group.get_mut(&lookup_key) {
                    keys.retain(|k| !doomed.contains(k));
                    if keys.is_empty() {
                        group.remove(&lookup_key);
                    }
                }
            }
        }
        removed
    }

    /// Swap the element stored under the key of `element` for `element`,
    /// keeping its position. Returns the superseded element, or `None` when
    /// the key is absent.
    pub fn try_replace(&mut self, element: Rc<E>) -> Option<Rc<E>> {
        let key = self.key_of(&element);
        let index = self.entities.get_index_of(&key)?;
        for (lookup_index, lookup) in self.schema.lookups.iter().enumerate() {
            let old_group = (lookup.selector)(&self.entities[index]);
            let new_group = (lookup.selector)(&element);
            if old_group == new_group {
                continue;
            }
            let groups = &mut self.secondary[lookup_index];
            if let Some(keys) = groups.get_mut(&old_group) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    groups.remove(&old_group);
                }
            }
            groups.entry(new_group).or_default().push(key.clone());
        }
        Some(std::mem::replace(&mut self.entities[index], element))
    }

    /// Remove the elements stored under the keys of `elements`.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::MissingKey`] without removing anything if any
    /// key is absent.
    pub fn delete_range<'a>(
        &mut self,
        elements: impl IntoIterator<Item = &'a Rc<E>>,
    ) -> VariableResult<Vec<Rc<E>>>
    where
        E: 'a,
    {
        let keys: Vec<K> = elements.into_iter().map(|e| self.key_of(e)).collect();
        if let Some(missing) = keys.iter().find(|key| !self.entities.contains_key(*key)) {
            return Err(VariableError::MissingKey(self.format_key(missing)));
        }
        Ok(self.try_delete_keys(&keys))
    }

    /// Names of the secondary lookups.
    pub fn lookup_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.schema.lookups.iter().map(LookupDefinition::name)
    }

    /// Elements grouped under `key` in the secondary lookup `lookup`, in
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::UnknownLookup`] if no lookup has that name.
    pub fn get_by(&self, lookup: &str, key: &str) -> VariableResult<Vec<&Rc<E>>> {
        let index = self
            .schema
            .lookups
            .iter()
            .position(|l| l.name == lookup)
            .ok_or_else(|| VariableError::UnknownLookup(lookup.to_string()))?;

        // Group keys are appended on add and retained on delete, so they are
        // already in insertion order.
        Ok(self.secondary[index]
            .get(key)
            .map(|keys| keys.iter().filter_map(|k| self.entities.get(k)).collect())
            .unwrap_or_default())
    }
}

impl<'a, K, E> IntoIterator for &'a KeyedCollection<K, E> {
    type Item = (&'a K, &'a Rc<E>);
    type IntoIter = indexmap::map::Iter<'a, K, Rc<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
