//! In-memory storage, used for previews and tests

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{check_key, Storage, StorageError};

/// A storage backend that keeps everything in process memory
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-loaded entries
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// A copy of everything currently stored
    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        check_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        check_key(key)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn all_with_prefix(&self, prefix: &str) -> Result<Map<String, Value>, StorageError> {
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_prefix_scan_is_bounded() {
        let storage = MemoryStorage::with_entries([
            ("completed", json!(true)),
            ("response-1-1", json!({})),
            ("response-2-9", json!({})),
            ("start", json!(0)),
        ]);

        let responses = storage.all_with_prefix("response").await.unwrap();
        assert_eq!(responses.len(), 2);
        assert!(storage.all_with_prefix("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let storage = MemoryStorage::with_entries([("a", json!(1)), ("b", json!(2)), ("c", json!(3))]);
        storage.remove_all(&["a", "b", "missing"]).await.unwrap();
        let left: Vec<_> = storage.snapshot().await.into_keys().collect();
        assert_eq!(left, vec!["c"]);
    }
}
