//! Key-value store seam: single and batch puts of JSON items under a
//! partition key and an optional sort key.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("item {0} has a payload that is not a JSON object")]
    Payload(String),
    #[error("item has an empty partition key")]
    EmptyKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn with_sort(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}#{}", self.partition, sort),
            None => write!(f, "{}", self.partition),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub attributes: Map<String, Value>,
}

impl Item {
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            attributes: Map::new(),
        }
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Inserts or replaces one item.
    async fn put_item(&self, table: &str, item: &Item) -> Result<(), StoreError>;

    /// Inserts or replaces many items at once, returning how many were written.
    async fn batch_put(&self, table: &str, items: &[Item]) -> Result<usize, StoreError>;

    async fn get_item(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError>;
}

/// Store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, BTreeMap<ItemKey, Item>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of `table` in key order.
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put_item(&self, table: &str, item: &Item) -> Result<(), StoreError> {
        if item.key.partition.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(item.key.clone(), item.clone());
        Ok(())
    }

    async fn batch_put(&self, table: &str, items: &[Item]) -> Result<usize, StoreError> {
        if items.iter().any(|i| i.key.partition.is_empty()) {
            return Err(StoreError::EmptyKey);
        }
        let mut tables = self.tables.lock();
        let entries = tables.entry(table.to_string()).or_default();
        for item in items {
            entries.insert(item.key.clone(), item.clone());
        }
        Ok(items.len())
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        Ok(self
            .tables
            .lock()
            .get(table)
            .and_then(|t| t.get(key))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_replaces_existing_item() {
        let store = MemoryStore::new();
        let key = ItemKey::new("CL FOP (LO) Feb'19 40 CALL @NYMEX");
        store.put_item("instruments", &Item::new(key.clone()).with("conid", 1)).await.unwrap();
        store.put_item("instruments", &Item::new(key.clone()).with("conid", 2)).await.unwrap();

        let item = store.get_item("instruments", &key).await.unwrap().unwrap();
        assert_eq!(item.get("conid"), Some(&Value::from(2)));
        assert_eq!(store.items("instruments").len(), 1);
    }

    #[tokio::test]
    async fn batch_put_rejects_empty_keys() {
        let store = MemoryStore::new();
        let items = vec![Item::new(ItemKey::new("a")), Item::new(ItemKey::new(""))];
        assert!(matches!(
            store.batch_put("instruments", &items).await,
            Err(StoreError::EmptyKey)
        ));
        assert!(store.items("instruments").is_empty());
    }

    #[test]
    fn key_display_joins_sort_key() {
        assert_eq!(ItemKey::with_sort("CL", "181211093000").to_string(), "CL#181211093000");
    }
}
