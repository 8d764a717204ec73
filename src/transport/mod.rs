//! Network transport for Survana
//!
//! Completed responses leave the browser as one JSON POST. Transports never
//! retry; the caller decides what a failed delivery means.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpTransport;

/// Error types for transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server rejected payload with status {0}")]
    Rejected(u16),

    #[error("No endpoint configured")]
    NoEndpoint,
}

/// Trait for delivering JSON payloads to a server
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `payload` as JSON to `url`
    async fn post_json(&self, url: &str, payload: &Value) -> Result<(), TransportError>;
}
