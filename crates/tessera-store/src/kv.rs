//! Raw key-value layers: committed store, write sets and cache branches

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Iteration order over encoded keys
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// A key and its stored value
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Read access to a key-value layer
pub trait KvRead {
    /// Point lookup
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Ordered snapshot of every entry inside the bounds
    fn range(&self, start: Bound<&[u8]>, end: Bound<&[u8]>, order: Order) -> Vec<KvPair>;
}

/// True when the bounds describe an empty interval (BTreeMap would panic on some of these)
pub(crate) fn is_empty_range(start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    match (start, end) {
        (Bound::Included(s), Bound::Included(e)) => s > e,
        (Bound::Included(s), Bound::Excluded(e))
        | (Bound::Excluded(s), Bound::Included(e))
        | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        _ => false,
    }
}

fn ordered(mut entries: Vec<KvPair>, order: Order) -> Vec<KvPair> {
    if order == Order::Descending {
        entries.reverse();
    }
    entries
}

/// Pending writes; `None` marks a deletion
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSet {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.insert(key, None);
    }

    /// Pending operation for a key, if any
    pub fn get(&self, key: &[u8]) -> Option<&Option<Vec<u8>>> {
        self.ops.get(key)
    }

    /// Later writes win
    pub fn merge(&mut self, other: WriteSet) {
        self.ops.extend(other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> {
        self.ops.iter()
    }
}

/// Committed application state
///
/// Shared between block execution and queries; readers never observe a
/// partially applied block because [`CommitStore::commit`] applies the whole
/// write set under a single write lock.
pub struct CommitStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    last_height: RwLock<u64>,
}

impl CommitStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            last_height: RwLock::new(0),
        }
    }

    /// Apply a block's writes atomically
    pub fn commit(&self, writes: WriteSet, height: u64) {
        let count = writes.len();
        {
            let mut data = self.data.write();
            for (key, op) in writes.ops {
                match op {
                    Some(value) => {
                        data.insert(key, value);
                    }
                    None => {
                        data.remove(&key);
                    }
                }
            }
        }
        *self.last_height.write() = height;
        tracing::debug!(height, writes = count, "committed block state");
    }

    /// Height of the last committed block
    pub fn last_height(&self) -> u64 {
        *self.last_height.read()
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for CommitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvRead for CommitStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    fn range(&self, start: Bound<&[u8]>, end: Bound<&[u8]>, order: Order) -> Vec<KvPair> {
        if is_empty_range(start, end) {
            return Vec::new();
        }
        let data = self.data.read();
        let entries = data
            .range::<[u8], _>((start, end))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ordered(entries, order)
    }
}

/// A write-buffering layer over a read-only parent
pub struct CacheStore<'a> {
    parent: &'a dyn KvRead,
    writes: WriteSet,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a dyn KvRead) -> Self {
        Self {
            parent,
            writes: WriteSet::new(),
        }
    }

    /// Layer a cache over the parent with writes already pending
    pub fn with_writes(parent: &'a dyn KvRead, writes: WriteSet) -> Self {
        Self { parent, writes }
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.set(key, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.writes.delete(key.to_vec());
    }

    /// Fold a child layer's writes into this one
    pub fn merge(&mut self, writes: WriteSet) {
        self.writes.merge(writes);
    }

    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    pub fn into_writes(self) -> WriteSet {
        self.writes
    }
}

impl KvRead for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => self.parent.get(key),
        }
    }

    fn range(&self, start: Bound<&[u8]>, end: Bound<&[u8]>, order: Order) -> Vec<KvPair> {
        if is_empty_range(start, end) {
            return Vec::new();
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .parent
            .range(start, end, Order::Ascending)
            .into_iter()
            .collect();
        for (key, op) in self.writes.ops.range::<[u8], _>((start, end)) {
            match op {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        ordered(merged.into_iter().collect(), order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(entries: &[(&[u8], &[u8])]) -> CommitStore {
        let store = CommitStore::new();
        let mut writes = WriteSet::new();
        for (k, v) in entries {
            writes.set(k.to_vec(), v.to_vec());
        }
        store.commit(writes, 1);
        store
    }

    #[test]
    fn test_cache_overlays_parent() {
        let store = committed(&[(b"a", b"1"), (b"b", b"2")]);
        let mut cache = CacheStore::new(&store);
        cache.set(b"c".to_vec(), b"3".to_vec());
        cache.delete(b"a");

        assert_eq!(cache.get(b"a"), None);
        assert_eq!(cache.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(cache.get(b"c"), Some(b"3".to_vec()));
        // parent untouched until commit
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_range_merges_and_orders() {
        let store = committed(&[(b"a", b"1"), (b"c", b"3"), (b"e", b"5")]);
        let mut cache = CacheStore::new(&store);
        cache.set(b"b".to_vec(), b"2".to_vec());
        cache.delete(b"c");

        let asc = cache.range(Bound::Unbounded, Bound::Unbounded, Order::Ascending);
        let keys: Vec<_> = asc.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"e".to_vec()]);

        let desc = cache.range(
            Bound::Included(b"b".as_slice()),
            Bound::Unbounded,
            Order::Descending,
        );
        let keys: Vec<_> = desc.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"e".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_empty_and_inverted_ranges() {
        let store = committed(&[(b"a", b"1")]);
        assert!(store
            .range(
                Bound::Excluded(b"a".as_slice()),
                Bound::Excluded(b"a".as_slice()),
                Order::Ascending
            )
            .is_empty());
        assert!(store
            .range(
                Bound::Included(b"z".as_slice()),
                Bound::Included(b"a".as_slice()),
                Order::Ascending
            )
            .is_empty());
    }

    #[test]
    fn test_commit_applies_deletes() {
        let store = committed(&[(b"a", b"1")]);
        let mut writes = WriteSet::new();
        writes.delete(b"a".to_vec());
        store.commit(writes, 2);
        assert!(store.is_empty());
        assert_eq!(store.last_height(), 2);
    }
}
