//! HTTP transport backed by reqwest

use async_trait::async_trait;
use serde_json::Value;

use super::{Transport, TransportError};

/// Posts payloads over HTTP(S)
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS roots, default headers)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<(), TransportError> {
        if url.is_empty() {
            return Err(TransportError::NoEndpoint);
        }

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }

        log::debug!("Delivered payload to {} ({})", url, status);
        Ok(())
    }
}
