#![forbid(unsafe_code)]

//! Dense, positionally indexed storage behind a collection variable.
//!
//! # Design
//!
//! [`IndexedCollection`] pairs a shared [`KeyedCollection`] snapshot with a
//! dense `Vec` of the same elements and a key-to-position index. The keyed
//! snapshot is copy-on-write: events hold cheap `Rc` clones of it, and a
//! mutation only copies the map when such a clone is still alive.
//!
//! # Invariants
//!
//! 1. `all` mirrors the keyed snapshot's iteration order, with no gaps.
//! 2. For every stored key `k`, `all[indexer[k]]` is the element stored
//!    under `k`.
//! 3. Replacing an element never changes its position.
//! 4. Removing `m` elements is O(n + m): one pass over the keyed map and one
//!    compaction of `all`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use vartrack_core::{CollectionKey, KeyedCollection, UpdateRef};

/// Keyed snapshot plus dense positional view.
pub struct IndexedCollection<K, E> {
    lookup: Rc<KeyedCollection<K, E>>,
    all: Vec<Rc<E>>,
    indexer: HashMap<K, usize>,
}

impl<K: fmt::Debug, E> fmt::Debug for IndexedCollection<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedCollection")
            .field("lookup", &self.lookup)
            .field("len", &self.all.len())
            .finish()
    }
}

impl<K: CollectionKey, E> IndexedCollection<K, E> {
    /// Take ownership of `lookup` and index it.
    #[must_use]
    pub fn new(lookup: KeyedCollection<K, E>) -> Self {
        let mut collection = Self {
            lookup: Rc::new(lookup),
            all: Vec::new(),
            indexer: HashMap::new(),
        };
        collection.reindex();
        collection
    }

    /// Shared keyed snapshot.
    #[must_use]
    pub fn lookup(&self) -> &Rc<KeyedCollection<K, E>> {
        &self.lookup
    }

    /// Elements in positional order.
    #[must_use]
    pub fn all(&self) -> &[Rc<E>] {
        &self.all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Position of the element stored under the key of `element`.
    pub fn get_index(&self, element: &E) -> Option<usize> {
        self.indexer.get(&self.lookup.key_of(element)).copied()
    }

    /// Position of `key`.
    pub fn index_of_key(&self, key: &K) -> Option<usize> {
        self.indexer.get(key).copied()
    }

    /// Add elements whose key is absent; returns exactly those added.
    pub fn add_range(&mut self, elements: impl IntoIterator<Item = Rc<E>>) -> Vec<Rc<E>> {
        let added = Rc::make_mut(&mut self.lookup).try_add_range(elements);
        for element in &added {
            let key = self.lookup.key_of(element);
            self.indexer.insert(key, self.all.len());
            self.all.push(Rc::clone(element));
        }
        added
    }

    /// Remove the elements stored under the keys of `elements`; returns the
    /// stored elements that were removed.
    pub fn remove_range(&mut self, elements: &[Rc<E>]) -> Vec<Rc<E>> {
        let keys: Vec<K> = elements
            .iter()
            .map(|element| self.lookup.key_of(element))
            .filter(|key| self.indexer.contains_key(key))
            .collect();
        if keys.is_empty() {
            return Vec::new();
        }

        let removed = Rc::make_mut(&mut self.lookup).try_delete_keys(&keys);
        let mut doomed = vec![false; self.all.len()];
        let mut first = self.all.len();
        for key in &keys {
            if let Some(position) = self.indexer.remove(key) {
                doomed[position] = true;
                first = first.min(position);
            }
        }

        let mut read = 0;
        self.all.retain(|_| {
            let keep = !doomed[read];
            read += 1;
            keep
        });
        for (position, element) in self.all.iter().enumerate().skip(first) {
            self.indexer.insert(self.lookup.key_of(element), position);
        }
        removed
    }

    /// Replace stored elements in place. Requests are deduplicated by key,
    /// keeping the first; requests for absent keys are dropped. Returns the
    /// applied pairs with the actually superseded old values.
    pub fn replace_range(
        &mut self,
        updates: impl IntoIterator<Item = UpdateRef<Rc<E>>>,
    ) -> Vec<UpdateRef<Rc<E>>> {
        let lookup = Rc::make_mut(&mut self.lookup);
        let mut seen = HashSet::new();
        let mut replaced = Vec::new();
        for update in updates {
            let key = lookup.key_of(&update.value);
            if !seen.insert(key.clone()) {
                continue;
            }
            let Some(old_value) = lookup.try_replace(Rc::clone(&update.value)) else {
                continue;
            };
            if let Some(&position) = self.indexer.get(&key) {
                self.all[position] = Rc::clone(&update.value);
            }
            replaced.push(UpdateRef::new(update.value, old_value));
        }
        replaced
    }

    /// Swap in a whole new keyed collection.
    pub fn update(&mut self, lookup: Rc<KeyedCollection<K, E>>) {
        self.lookup = lookup;
        self.reindex();
    }

    fn reindex(&mut self) {
        self.all = self.lookup.entities().cloned().collect();
        self.indexer = self
            .lookup
            .keys()
            .cloned()
            .enumerate()
            .map(|(position, key)| (key, position))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vartrack_core::CollectionSchema;

    #[derive(Debug)]
    struct Row {
        id: u32,
        label: &'static str,
    }

    fn row(id: u32, label: &'static str) -> Rc<Row> {
        Rc::new(Row { id, label })
    }

    fn collection(ids: &[u32]) -> IndexedCollection<u32, Row> {
        let schema = CollectionSchema::new(|r: &Row| r.id);
        IndexedCollection::new(KeyedCollection::with_elements(
            schema,
            ids.iter().map(|&id| row(id, "init")),
        ))
    }

    fn ids(c: &IndexedCollection<u32, Row>) -> Vec<u32> {
        c.all().iter().map(|r| r.id).collect()
    }

    fn assert_indexed(c: &IndexedCollection<u32, Row>) {
        assert_eq!(c.all().len(), c.lookup().len());
        for (position, element) in c.all().iter().enumerate() {
            assert_eq!(c.index_of_key(&element.id), Some(position));
            assert!(Rc::ptr_eq(c.lookup().get(&element.id).unwrap(), element));
        }
    }

    #[test]
    fn add_range_appends_new_keys_only() {
        let mut c = collection(&[1]);
        let added = c.add_range([row(1, "dup"), row(2, "new")]);

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, 2);
        assert_eq!(ids(&c), vec![1, 2]);
        assert_eq!(c.get_index(&Row { id: 2, label: "" }), Some(1));
        assert_indexed(&c);
    }

    #[test]
    fn remove_range_compacts_stably() {
        let mut c = collection(&[1, 2, 3, 4, 5, 6]);
        let removed = c.remove_range(&[row(5, ""), row(2, ""), row(99, ""), row(3, "")]);

        assert_eq!(removed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 2, 3]);
        assert_eq!(ids(&c), vec![1, 4, 6]);
        assert_eq!(c.index_of_key(&2), None);
        assert_indexed(&c);
    }

    #[test]
    fn remove_range_of_duplicate_and_absent_keys() {
        let mut c = collection(&[1, 2, 3]);
        let before = Rc::clone(c.lookup());

        assert!(c.remove_range(&[row(9, ""), row(10, "")]).is_empty());
        assert!(Rc::ptr_eq(&before, c.lookup()));

        let removed = c.remove_range(&[row(2, ""), row(2, "")]);
        assert_eq!(removed.len(), 1);
        assert_eq!(ids(&c), vec![1, 3]);
        assert_indexed(&c);
    }

    /// Best of three timings of removing the first half of `n` rows.
    fn time_remove_front_half(n: u32) -> std::time::Duration {
        (0..3)
            .map(|_| {
                let all: Vec<u32> = (0..n).collect();
                let mut c = collection(&all);
                let doomed: Vec<_> = (0..n / 2).map(|id| row(id, "")).collect();
                let start = std::time::Instant::now();
                let removed = c.remove_range(&doomed);
                let elapsed = start.elapsed();
                assert_eq!(removed.len(), (n / 2) as usize);
                assert_eq!(c.len(), (n - n / 2) as usize);
                elapsed
            })
            .min()
            .unwrap_or_default()
    }

    #[test]
    fn remove_range_scales_linearly() {
        let small = time_remove_front_half(25_000);
        let large = time_remove_front_half(100_000);

        // Linear work grows ~4x; per-key tail shifting would grow ~16x.
        let ratio = large.as_secs_f64() / small.as_secs_f64().max(1e-6);
        assert!(
            ratio < 10.0,
            "remove_range grew {ratio:.1}x for 4x input ({small:?} -> {large:?})"
        );

        let mut c = collection(&(0..100_000).collect::<Vec<_>>());
        c.remove_range(&(0..50_000).map(|id| row(id * 2, "")).collect::<Vec<_>>());
        assert_indexed(&c);
    }

    #[test]
    fn replace_range_keeps_position_and_first_duplicate() {
        let mut c = collection(&[1, 2, 3]);
        let replaced = c.replace_range([
            UpdateRef::new(row(2, "first"), row(2, "")),
            UpdateRef::new(row(2, "second"), row(2, "")),
            UpdateRef::new(row(8, "absent"), row(8, "")),
        ]);

        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].value.label, "first");
        assert_eq!(replaced[0].old_value.label, "init");
        assert_eq!(ids(&c), vec![1, 2, 3]);
        assert_eq!(c.all()[1].label, "first");
        assert_indexed(&c);
    }

    #[test]
    fn snapshots_are_not_mutated() {
        let mut c = collection(&[1, 2]);
        let before = Rc::clone(c.lookup());
        c.add_range([row(3, "")]);
        c.remove_range(&[row(1, "")]);

        assert_eq!(before.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(ids(&c), vec![2, 3]);
    }

    #[test]
    fn update_rebuilds_index() {
        let mut c = collection(&[1, 2]);
        let next = KeyedCollection::with_elements(
            CollectionSchema::new(|r: &Row| r.id),
            [row(7, ""), row(3, "")],
        );
        c.update(Rc::new(next));

        assert_eq!(ids(&c), vec![7, 3]);
        assert_indexed(&c);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(Vec<u32>),
            Remove(Vec<u32>),
            Replace(Vec<u32>),
        }

        fn op() -> impl Strategy<Value = Op> {
            let ids = || proptest::collection::vec(0u32..24, 0..8);
            prop_oneof![
                ids().prop_map(Op::Add),
                ids().prop_map(Op::Remove),
                ids().prop_map(Op::Replace),
            ]
        }

        proptest! {
            #[test]
            fn index_stays_dense_and_consistent(ops in proptest::collection::vec(op(), 0..40)) {
                let mut c = collection(&[]);
                for op in ops {
                    match op {
                        Op::Add(ids) => {
                            c.add_range(ids.into_iter().map(|id| row(id, "add")));
                        }
                        Op::Remove(ids) => {
                            let rows: Vec<_> = ids.into_iter().map(|id| row(id, "")).collect();
                            c.remove_range(&rows);
                        }
                        Op::Replace(ids) => {
                            c.replace_range(ids.into_iter().map(|id| UpdateRef::new(row(id, "rep"), row(id, ""))));
                        }
                    }
                    prop_assert_eq!(c.all().len(), c.lookup().len());
                    let keyed: Vec<u32> = c.lookup().keys().copied().collect();
                    prop_assert_eq!(ids(&c), keyed);
                    for (position, element) in c.all().iter().enumerate() {
                        prop_assert_eq!(c.index_of_key(&element.id), Some(position));
                    }
                }
            }
        }
    }
}
