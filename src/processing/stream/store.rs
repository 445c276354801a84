//! Persistent-store collaborator contract.
//!
//! A store exposes transaction-scoped batch writes keyed by collection name and
//! ordered cursors with optional key-range filtering. [`MemoryStore`] is the
//! in-process implementation used by the demo binary and the tests.

use std::collections::{BTreeMap, HashMap};
use std::future::{Future, ready};
use std::ops::Bound;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use crate::utils::StoreError;

/// One key/value pair of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

/// Cursor walk direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CursorDirection {
    /// Ascending key order
    #[default]
    Next,
    /// Descending key order
    Prev,
}

/// Inclusive key bounds; a missing side is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange<K> {
    pub lower: Option<K>,
    pub upper: Option<K>,
}

impl<K> Default for KeyRange<K> {
    fn default() -> Self {
        Self { lower: None, upper: None }
    }
}

impl<K: Ord> KeyRange<K> {
    pub fn between(lower: K, upper: K) -> Self {
        Self { lower: Some(lower), upper: Some(upper) }
    }

    pub fn at_least(lower: K) -> Self {
        Self { lower: Some(lower), upper: None }
    }

    pub fn at_most(upper: K) -> Self {
        Self { lower: None, upper: Some(upper) }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lower.as_ref().is_none_or(|lower| key >= lower)
            && self.upper.as_ref().is_none_or(|upper| key <= upper)
    }

    fn bounds(&self) -> (Bound<&K>, Bound<&K>) {
        let lower = self.lower.as_ref().map_or(Bound::Unbounded, Bound::Included);
        let upper = self.upper.as_ref().map_or(Bound::Unbounded, Bound::Included);
        (lower, upper)
    }

    fn is_empty(&self) -> bool {
        matches!((&self.lower, &self.upper), (Some(lower), Some(upper)) if lower > upper)
    }
}

/// Ordered cursor inside a read transaction.
pub trait StoreCursor<K, V>: Send {
    /// Skips `count` entries without materialising them.
    fn advance(&mut self, count: usize) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Next entry in walk order, `None` once exhausted.
    fn next_entry(&mut self) -> impl Future<Output = Result<Option<Entry<K, V>>, StoreError>> + Send;

    /// Aborts the enclosing read transaction. Later calls fail with
    /// [`StoreError::Aborted`].
    fn abort(&mut self);
}

pub trait KeyValueStore: Send + Sync {
    type Key: Clone + Ord + Send + Sync;
    type Value: Clone + Send + Sync;
    type Cursor: StoreCursor<Self::Key, Self::Value>;

    /// Writes all `entries` into `collection` inside one transaction: either
    /// every entry lands or none does.
    fn write_batch(
        &self,
        collection: &str,
        entries: Vec<Entry<Self::Key, Self::Value>>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Opens a cursor over `collection`, optionally restricted to `range`.
    fn open_cursor(
        &self,
        collection: &str,
        range: Option<&KeyRange<Self::Key>>,
        direction: CursorDirection,
    ) -> impl Future<Output = Result<Self::Cursor, StoreError>> + Send;
}

/// In-memory store of ordered collections.
///
/// Collections must be created up front; writes to unknown collections fail
/// the transaction.
pub struct MemoryStore<K, V> {
    collections: Mutex<HashMap<String, BTreeMap<K, V>>>,
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Clone + Ord, V: Clone> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, name: impl Into<String>) -> Self {
        self.create_collection(name);
        self
    }

    /// Creates an empty collection; existing collections are left untouched.
    pub fn create_collection(&self, name: impl Into<String>) {
        self.collections.lock().entry(name.into()).or_default();
    }

    pub fn insert(&self, collection: &str, key: K, value: V) -> Result<(), StoreError> {
        let mut collections = self.collections.lock();
        let entries = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, collection: &str, key: &K) -> Option<V> {
        self.collections.lock().get(collection)?.get(key).cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.lock().get(collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl<K, V> KeyValueStore for MemoryStore<K, V>
where
    K: Clone + Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    type Key = K;
    type Value = V;
    type Cursor = MemoryCursor<K, V>;

    fn write_batch(
        &self,
        collection: &str,
        entries: Vec<Entry<K, V>>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let mut collections = self.collections.lock();
        let result = match collections.get_mut(collection) {
            Some(target) => {
                target.extend(entries.into_iter().map(|e| (e.key, e.value)));
                Ok(())
            }
            None => Err(StoreError::transaction(
                collection,
                format!("collection `{collection}` does not exist"),
            )),
        };
        ready(result)
    }

    fn open_cursor(
        &self,
        collection: &str,
        range: Option<&KeyRange<K>>,
        direction: CursorDirection,
    ) -> impl Future<Output = Result<MemoryCursor<K, V>, StoreError>> + Send {
        let collections = self.collections.lock();
        let result = match collections.get(collection) {
            Some(entries) => {
                let mut snapshot: Vec<Entry<K, V>> = match range {
                    Some(range) if range.is_empty() => Vec::new(),
                    Some(range) => entries
                        .range::<K, _>(range.bounds())
                        .map(|(k, v)| Entry::new(k.clone(), v.clone()))
                        .collect(),
                    None => entries
                        .iter()
                        .map(|(k, v)| Entry::new(k.clone(), v.clone()))
                        .collect(),
                };
                if direction == CursorDirection::Prev {
                    snapshot.reverse();
                }
                Ok(MemoryCursor {
                    entries: snapshot.into_iter(),
                    aborted: false,
                })
            }
            None => Err(StoreError::UnknownCollection(collection.to_string())),
        };
        ready(result)
    }
}

/// Cursor over a point-in-time snapshot of a [`MemoryStore`] collection.
pub struct MemoryCursor<K, V> {
    entries: std::vec::IntoIter<Entry<K, V>>,
    aborted: bool,
}

impl<K: Send, V: Send> StoreCursor<K, V> for MemoryCursor<K, V> {
    fn advance(&mut self, count: usize) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = if self.aborted {
            Err(StoreError::Aborted)
        } else {
            if count > 0 {
                self.entries.nth(count - 1);
            }
            Ok(())
        };
        ready(result)
    }

    fn next_entry(&mut self) -> impl Future<Output = Result<Option<Entry<K, V>>, StoreError>> + Send {
        let result = if self.aborted {
            Err(StoreError::Aborted)
        } else {
            Ok(self.entries.next())
        };
        ready(result)
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore<u32, String> {
        let store = MemoryStore::new().with_collection("items");
        for key in 0..10 {
            store.insert("items", key, format!("v{key}")).unwrap();
        }
        store
    }

    async fn drain(cursor: &mut MemoryCursor<u32, String>) -> Vec<u32> {
        let mut keys = Vec::new();
        while let Some(entry) = cursor.next_entry().await.unwrap() {
            keys.push(entry.key);
        }
        keys
    }

    #[test]
    fn key_range_is_inclusive() {
        let range = KeyRange::between(3, 5);
        assert!(range.contains(&3));
        assert!(range.contains(&5));
        assert!(!range.contains(&6));
        assert!(KeyRange::at_least(4).contains(&100));
        assert!(!KeyRange::at_most(4).contains(&5));
        assert!(KeyRange::<u32>::default().contains(&0));
    }

    #[tokio::test]
    async fn cursor_walks_in_both_directions_within_range() {
        let store = store();
        let range = KeyRange::between(2, 5);

        let mut forward = store.open_cursor("items", Some(&range), CursorDirection::Next).await.unwrap();
        assert_eq!(drain(&mut forward).await, vec![2, 3, 4, 5]);

        let mut backward = store.open_cursor("items", Some(&range), CursorDirection::Prev).await.unwrap();
        assert_eq!(drain(&mut backward).await, vec![5, 4, 3, 2]);

        let inverted = KeyRange::between(7, 1);
        let mut empty = store.open_cursor("items", Some(&inverted), CursorDirection::Next).await.unwrap();
        assert!(drain(&mut empty).await.is_empty());
    }

    #[tokio::test]
    async fn advance_skips_and_abort_poisons_the_cursor() {
        let store = store();
        let mut cursor = store.open_cursor("items", None, CursorDirection::Next).await.unwrap();
        cursor.advance(7).await.unwrap();
        assert_eq!(cursor.next_entry().await.unwrap().map(|e| e.key), Some(7));

        cursor.abort();
        assert_eq!(cursor.next_entry().await, Err(StoreError::Aborted));
        assert_eq!(cursor.advance(1).await, Err(StoreError::Aborted));
    }

    #[tokio::test]
    async fn writes_require_an_existing_collection() {
        let store = store();
        store
            .write_batch("items", vec![Entry::new(42, "answer".to_string())])
            .await
            .unwrap();
        assert_eq!(store.get("items", &42).as_deref(), Some("answer"));
        assert_eq!(store.len("items"), 11);

        let err = store.write_batch("missing", vec![Entry::new(1, "x".to_string())]).await;
        assert!(matches!(err, Err(StoreError::Transaction { .. })));
        assert!(matches!(
            store.open_cursor("missing", None, CursorDirection::Next).await,
            Err(StoreError::UnknownCollection(_))
        ));
    }
}
