//! Key-value persistence for Survana
//!
//! Workflow state and queued responses survive page loads by living in a
//! key-value store. Values are JSON; every operation is asynchronous and
//! reports failures to its caller without retrying.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Error types for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Trait for key-value storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value; `None` if the key was never written or was removed
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every entry whose key starts with `prefix`, ordered by key
    async fn all_with_prefix(&self, prefix: &str) -> Result<Map<String, Value>, StorageError>;

    /// Remove several keys, stopping at the first failure
    async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Reject keys that can't be stored safely by every backend
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("response-1700000000000-42").is_ok());
        assert!(check_key("store-url").is_ok());
        assert!(check_key("").is_err());
        assert!(check_key("../etc").is_err());
        assert!(check_key("a/b").is_err());
    }
}
