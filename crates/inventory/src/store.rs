//! Persistence ports and in-memory implementations.
//!
//! Each component owns its store and receives it at construction:
//! - [`StockStore`]: the ledger's per-item record sets
//! - [`Store`]`<ReservationId, Reservation>`: reservation history (all states)
//! - [`Store`]`<RuleKey, ReorderRule>`: reorder rules
//!
//! Stores must be strongly consistent per key. The ledger only ever writes an
//! item's record set while holding that item's exclusion scope.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use stockhold_core::ItemId;

use crate::record::StockRecord;

/// Persistence collaborator failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Keyed entity store.
pub trait Store<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, StoreError>;
    fn upsert(&self, key: K, value: V) -> Result<(), StoreError>;
    fn remove(&self, key: &K) -> Result<Option<V>, StoreError>;
    fn list(&self) -> Result<Vec<V>, StoreError>;
}

impl<K, V, S> Store<K, V> for Arc<S>
where
    S: Store<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(key, value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).remove(key)
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        (**self).list()
    }
}

/// In-memory keyed store for tests/dev.
#[derive(Debug)]
pub struct InMemoryStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Store<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<Option<V>, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        Ok(map.remove(key))
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }
}

/// Storage for the ledger: one record set per item, one record per location.
pub trait StockStore: Send + Sync {
    /// All records of an item, ordered by location id. Empty if unknown.
    fn load(&self, item_id: &ItemId) -> Result<Vec<StockRecord>, StoreError>;

    /// Replace the item's record set atomically.
    fn save(&self, item_id: &ItemId, records: &[StockRecord]) -> Result<(), StoreError>;

    /// Every item with at least one record, in id order.
    fn items(&self) -> Result<Vec<ItemId>, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn load(&self, item_id: &ItemId) -> Result<Vec<StockRecord>, StoreError> {
        (**self).load(item_id)
    }

    fn save(&self, item_id: &ItemId, records: &[StockRecord]) -> Result<(), StoreError> {
        (**self).save(item_id, records)
    }

    fn items(&self) -> Result<Vec<ItemId>, StoreError> {
        (**self).items()
    }
}

/// In-memory stock store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    inner: RwLock<BTreeMap<ItemId, Vec<StockRecord>>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockStore for InMemoryStockStore {
    fn load(&self, item_id: &ItemId) -> Result<Vec<StockRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(item_id).cloned().unwrap_or_default())
    }

    fn save(&self, item_id: &ItemId, records: &[StockRecord]) -> Result<(), StoreError> {
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| a.location_id.cmp(&b.location_id));

        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if sorted.is_empty() {
            map.remove(item_id);
        } else {
            map.insert(item_id.clone(), sorted);
        }
        Ok(())
    }

    fn items(&self) -> Result<Vec<ItemId>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockhold_core::LocationId;

    use crate::record::StockSettings;

    fn rec(item: &str, loc: &str) -> StockRecord {
        StockRecord::provisioned(
            ItemId::new(item),
            LocationId::new(loc),
            &StockSettings::new(5),
            Utc::now(),
        )
    }

    #[test]
    fn stock_store_keeps_location_order() {
        let store = InMemoryStockStore::new();
        let item = ItemId::new("SKU-1");

        store
            .save(&item, &[rec("SKU-1", "WH-B"), rec("SKU-1", "WH-A")])
            .unwrap();

        let loaded = store.load(&item).unwrap();
        let locs: Vec<_> = loaded.iter().map(|r| r.location_id.as_str()).collect();
        assert_eq!(locs, vec!["WH-A", "WH-B"]);
    }

    #[test]
    fn unknown_item_loads_empty() {
        let store = InMemoryStockStore::new();
        assert!(store.load(&ItemId::new("nope")).unwrap().is_empty());
        assert!(store.items().unwrap().is_empty());
    }

    #[test]
    fn keyed_store_round_trip() {
        let store: InMemoryStore<u32, String> = InMemoryStore::new();
        store.upsert(1, "one".to_string()).unwrap();
        store.upsert(1, "uno".to_string()).unwrap();

        assert_eq!(store.get(&1).unwrap().as_deref(), Some("uno"));
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.remove(&1).unwrap().as_deref(), Some("uno"));
        assert!(store.get(&1).unwrap().is_none());
    }
}
