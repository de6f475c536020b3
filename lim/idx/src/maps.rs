use super::index_trait::IndexRef;
use std::{marker::PhantomData, ops};

/// A dense, append-only map from handles to data.
#[derive(Debug, Clone)]
pub struct IndexedMap<K, D>
where
    K: IndexRef,
{
    data: Vec<D>,
    phantom: PhantomData<K>,
}

impl<K, D> ops::Index<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        &self.data[index.index()]
    }
}

impl<K, D> ops::IndexMut<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        &mut self.data[index.index()]
    }
}

impl<K, D> IndexedMap<K, D>
where
    K: IndexRef,
{
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            data: Vec::with_capacity(size),
            phantom: PhantomData,
        }
    }

    pub fn get(&self, index: K) -> Option<&D> {
        self.data.get(index.index())
    }

    pub fn get_mut(&mut self, index: K) -> Option<&mut D> {
        self.data.get_mut(index.index())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, item: D) -> K {
        self.data.push(item);
        K::new(self.data.len() - 1)
    }

    pub fn peek_next_idx(&self) -> K {
        K::new(self.data.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut D)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::new(i), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &D> {
        self.data.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + use<K, D> {
        (0..self.data.len()).map(K::new)
    }
}

impl<K, D> Default for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An arena whose entries can be removed. Handles are never reused, so a
/// stale handle finds nothing rather than aliasing a newer node.
#[derive(Debug, Clone)]
pub struct IndexedPool<K, D>
where
    K: IndexRef,
{
    slots: IndexedMap<K, Option<D>>,
    live: usize,
}

impl<K, D> IndexedPool<K, D>
where
    K: IndexRef,
{
    pub fn new() -> Self {
        Self {
            slots: IndexedMap::new(),
            live: 0,
        }
    }

    pub fn push(&mut self, item: D) -> K {
        self.live += 1;
        self.slots.push(Some(item))
    }

    /// The handle the next [IndexedPool::push] will return.
    pub fn peek_next_idx(&self) -> K {
        self.slots.peek_next_idx()
    }

    /// Remove the entry for `index`, returning it if it was still live.
    pub fn remove(&mut self, index: K) -> Option<D> {
        let removed = self.slots.get_mut(index).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn contains(&self, index: K) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: K) -> Option<&D> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: K) -> Option<&mut D> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.slots
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }
}

impl<K, D> ops::Index<K> for IndexedPool<K, D>
where
    K: IndexRef,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        match self.slots.get(index) {
            Some(Some(d)) => d,
            Some(None) => panic!("Index {} refers to a removed entry", index.index()),
            None => panic!("Index {} is out of bounds", index.index()),
        }
    }
}

impl<K, D> ops::IndexMut<K> for IndexedPool<K, D>
where
    K: IndexRef,
{
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        match self.slots.get_mut(index) {
            Some(Some(d)) => d,
            Some(None) => panic!("Index {} refers to a removed entry", index.index()),
            None => panic!("Index {} is out of bounds", index.index()),
        }
    }
}

impl<K, D> Default for IndexedPool<K, D>
where
    K: IndexRef,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Side table keyed by the handles of another map. Keys that were never
/// inserted read as the default value.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone,
{
    data: Vec<D>,
    phantom: PhantomData<K>,
    default_value: D,
}

// NOTE: do not implement IndexMut, writes must go through `insert`.

impl<K, D> ops::Index<K> for SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index)
    }
}

impl<K, D> SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone,
{
    pub fn new_with_default(default_value: D) -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
            default_value,
        }
    }

    pub fn get(&self, index: K) -> &D {
        self.data.get(index.index()).unwrap_or(&self.default_value)
    }

    pub fn insert(&mut self, index: K, item: D) {
        if index.index() >= self.data.len() {
            self.data
                .resize(index.index() + 1, self.default_value.clone());
        }
        self.data[index.index()] = item;
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(k, v)| (K::new(k), v))
    }
}

impl<K, D> SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone + Default,
{
    pub fn new() -> Self {
        Self::new_with_default(D::default())
    }
}

impl<K, D> Default for SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_index;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct MyIdx(u32);
    impl_index!(MyIdx);

    #[test]
    fn pool_handles_are_not_reused() {
        let mut pool: IndexedPool<MyIdx, &str> = IndexedPool::new();
        let a = pool.push("a");
        let b = pool.push("b");
        assert_eq!(pool.remove(a), Some("a"));
        assert_eq!(pool.remove(a), None);
        let next = pool.peek_next_idx();
        let c = pool.push("c");
        assert_eq!(next, c);
        assert_ne!(a, c);
        assert!(!pool.contains(a));
        assert_eq!(pool[b], "b");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.keys().collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    #[should_panic(expected = "removed entry")]
    fn indexing_removed_entry_panics() {
        let mut pool: IndexedPool<MyIdx, u8> = IndexedPool::new();
        let a = pool.push(1);
        pool.remove(a);
        let _ = pool[a];
    }

    #[test]
    fn secondary_map_defaults() {
        let mut map: SecondaryMap<MyIdx, Option<u32>> = SecondaryMap::new();
        map.insert(MyIdx(4), Some(7));
        assert_eq!(map[MyIdx(4)], Some(7));
        assert_eq!(map[MyIdx(2)], None);
        assert_eq!(map[MyIdx(100)], None);
    }

    proptest! {
        #[test]
        fn pool_tracks_live_entries(
            (count, removed) in (1usize..200).prop_flat_map(|count| {
                (Just(count), prop::collection::btree_set(0..count, 0..count))
            })
        ) {
            let mut pool: IndexedPool<MyIdx, usize> = IndexedPool::new();
            for i in 0..count {
                pool.push(i);
            }
            for r in removed.iter() {
                pool.remove(MyIdx::from(*r));
            }
            prop_assert_eq!(pool.len(), count - removed.len());
            let live: BTreeSet<usize> = pool.iter().map(|(_, v)| *v).collect();
            for i in 0..count {
                prop_assert_eq!(live.contains(&i), !removed.contains(&i));
            }
        }
    }
}
