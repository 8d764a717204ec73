//! Local file system storage for Survana
//!
//! Each key is stored as `{key}.json` in a base directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs as tokio_fs;
use tokio::io::AsyncWriteExt;

use super::{check_key, Storage, StorageError};

const EXTENSION: &str = "json";

/// A storage backend that uses the local file system
pub struct LocalStorage {
    /// Base directory for storage
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend, creating the directory if needed
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_dir = base_dir.into();

        if !tokio_fs::try_exists(&base_dir).await? {
            tokio_fs::create_dir_all(&base_dir).await?;
        }

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the path for a specific key
    fn get_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.base_dir.join(format!("{}.{}", key, EXTENSION)))
    }

    async fn read_value(path: &Path) -> Result<Value, StorageError> {
        let data = tokio_fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.get_path(key)?;

        if !tokio_fs::try_exists(&path).await? {
            return Ok(None);
        }

        Self::read_value(&path).await.map(Some)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.get_path(key)?;
        let data = serde_json::to_vec(&value)?;

        // Write next to the target and rename, so readers never see a partial file
        let tmp = path.with_extension("tmp");
        let mut file = tokio_fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio_fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.get_path(key)?;

        match tokio_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn all_with_prefix(&self, prefix: &str) -> Result<Map<String, Value>, StorageError> {
        let mut keys = Vec::new();

        let mut entries = tokio_fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }

            if let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }

        keys.sort();

        let mut result = Map::new();
        for key in keys {
            let value = Self::read_value(&self.base_dir.join(format!("{}.{}", key, EXTENSION))).await?;
            result.insert(key, value);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("store")).await.unwrap();

        assert_eq!(storage.get("current").await.unwrap(), None);

        storage.set("current", json!(3)).await.unwrap();
        assert_eq!(storage.get("current").await.unwrap(), Some(json!(3)));

        storage.remove("current").await.unwrap();
        assert_eq!(storage.get("current").await.unwrap(), None);

        // removing twice is harmless
        storage.remove("current").await.unwrap();
    }

    #[tokio::test]
    async fn test_all_with_prefix() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage.set("response-2-7", json!({"b": ["2"]})).await.unwrap();
        storage.set("response-1-5", json!({"a": ["1"]})).await.unwrap();
        storage.set("current", json!(0)).await.unwrap();

        let responses = storage.all_with_prefix("response").await.unwrap();
        let keys: Vec<_> = responses.keys().cloned().collect();
        assert_eq!(keys, vec!["response-1-5", "response-2-7"]);
        assert_eq!(responses["response-1-5"], json!({"a": ["1"]}));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = LocalStorage::new(dir.path()).await.unwrap();
            storage.set("workflow", json!(["a.html", "b.html"])).await.unwrap();
        }

        let storage = LocalStorage::new(dir.path()).await.unwrap();
        assert_eq!(
            storage.get("workflow").await.unwrap(),
            Some(json!(["a.html", "b.html"]))
        );
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        assert!(matches!(
            storage.set("../escape", json!(1)).await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
