//! A locally stored response queue
//!
//! Responses are written through to storage before any attempt is made to
//! transmit them, so they survive crashes and navigation. The queue is only
//! cleared when the workflow decides the local copies are no longer needed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::SurveyConfig;
use crate::deadline::{bounded, Interrupted};
use crate::storage::{Storage, StorageError};
use crate::transport::{Transport, TransportError};

/// Error types for queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Ordered record of captured responses awaiting transmission
pub struct ResponseQueue {
    entries: Map<String, Value>,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    prefix: String,
    storage_timeout: Duration,
    transport_timeout: Duration,
    cancel: CancellationToken,
}

impl ResponseQueue {
    /// Create an empty queue; call [`ResponseQueue::rehydrate`] to pick up stored entries
    pub fn new(
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        config: &SurveyConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entries: Map::new(),
            storage,
            transport,
            prefix: config.response_prefix.clone(),
            storage_timeout: config.storage_timeout(),
            transport_timeout: config.transport_timeout(),
            cancel,
        }
    }

    /// Create a queue and load every stored entry into it.
    ///
    /// In designer mode nothing is loaded.
    pub async fn load(
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        config: &SurveyConfig,
        cancel: CancellationToken,
    ) -> Result<Self, QueueError> {
        let mut queue = Self::new(storage, transport, config, cancel);
        if !config.designer_mode {
            queue.rehydrate().await?;
        }
        Ok(queue)
    }

    /// Replace the in-memory queue with every stored entry
    pub async fn rehydrate(&mut self) -> Result<usize, QueueError> {
        let entries = bounded(
            "storage scan",
            self.storage_timeout,
            &self.cancel,
            self.storage.all_with_prefix(&self.prefix),
        )
        .await??;

        log::debug!("Rehydrated {} queued responses", entries.len());
        self.entries = entries;
        Ok(self.entries.len())
    }

    /// `<prefix>-<epoch ms>-<1..=1000>`, unique within the queue
    fn next_key(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let key = format!(
                "{}-{}-{}",
                self.prefix,
                Utc::now().timestamp_millis(),
                rng.gen_range(1..=1000)
            );
            if !self.entries.contains_key(&key) {
                return key;
            }
        }
    }

    /// Append a response and write it through to storage.
    ///
    /// Completes once storage has acknowledged the write, returning the new
    /// key and the whole queue. The in-memory entry is kept even if the write
    /// fails.
    pub async fn add<R: Serialize>(
        &mut self,
        response: &R,
    ) -> Result<(String, &Map<String, Value>), QueueError> {
        let value = serde_json::to_value(response)?;
        let key = self.next_key();

        self.entries.insert(key.clone(), value.clone());

        bounded(
            "storage write",
            self.storage_timeout,
            &self.cancel,
            self.storage.set(&key, value),
        )
        .await??;

        log::debug!("Queued response {}", key);
        Ok((key, &self.entries))
    }

    /// Remove one stored entry
    pub async fn remove(&self, key: &str) -> Result<(), QueueError> {
        bounded(
            "storage remove",
            self.storage_timeout,
            &self.cancel,
            self.storage.remove(key),
        )
        .await??;
        Ok(())
    }

    /// Remove every entry from storage and memory
    pub async fn clear(&mut self) -> Result<(), QueueError> {
        let keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();

        bounded(
            "storage remove",
            self.storage_timeout,
            &self.cancel,
            self.storage.remove_all(&keys),
        )
        .await??;

        self.entries.clear();
        Ok(())
    }

    /// The current in-memory queue
    pub fn get(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// POST the entire queue as one JSON object to `url`.
    ///
    /// The queue is left as it is whether or not the send succeeds.
    pub async fn send(&self, url: &str) -> Result<(), QueueError> {
        let payload = Value::Object(self.entries.clone());

        let result = bounded(
            "transport send",
            self.transport_timeout,
            &self.cancel,
            self.transport.post_json(url, &payload),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                log::info!("Sent {} queued responses to {}", self.entries.len(), url);
                Ok(())
            }
            Ok(Err(e)) => {
                log::error!("Failed to send queue to {}: {}", url, e);
                Err(e.into())
            }
            Err(e) => {
                log::error!("Failed to send queue to {}: {}", url, e);
                Err(e.into())
            }
        }
    }
}
