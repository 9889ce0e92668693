//! The RTMP forwarder (`vidforward`) capability.
//!
//! The forwarder sits between the camera's RTMP push and the platform
//! ingest of a permanent broadcast. In `stream` mode it re-multiplexes the
//! camera feed onto the permanent broadcast; in `slate` mode it emits a
//! standing image so the permanent broadcast survives a camera outage.

use async_trait::async_trait;
use oceanbench_types::{BroadcastConfig, ForwarderMode};
use serde::Serialize;

use crate::error::AdapterError;

/// The slate-capable RTMP forwarder capability.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Command the forwarder to forward the camera feed to the
    /// broadcast's RTMP ingest.
    async fn stream(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError>;

    /// Command the forwarder to emit the standing slate.
    async fn slate(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError>;

    /// Replace the slate media for this broadcast.
    async fn upload_slate(
        &self,
        cfg: &BroadcastConfig,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AdapterError>;
}

#[derive(Debug, Serialize)]
struct ControlRequest<'a> {
    mac: String,
    mode: ForwarderMode,
    stream_name: &'a str,
    rtmp_key: &'a str,
}

/// [`Forwarder`] over the vidforward control API.
pub struct HttpForwarder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpForwarder {
    /// Create a forwarder adapter talking to `base_url` with the given
    /// per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config(format!("forwarder client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn control(
        &self,
        cfg: &BroadcastConfig,
        mode: ForwarderMode,
    ) -> Result<(), AdapterError> {
        let url = format!("{}/control", self.base_url);
        let body = ControlRequest {
            mac: cfg.camera_mac.to_string(),
            mode,
            stream_name: &cfg.stream_name,
            rtmp_key: &cfg.rtmp_key,
        };

        let response = self.client.put(&url).json(&body).send().await?;
        if response.status().is_success() {
            tracing::debug!(mac = %cfg.camera_mac, ?mode, "Forwarder mode commanded");
            Ok(())
        } else {
            Err(AdapterError::from_response(response).await)
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn stream(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        self.control(cfg, ForwarderMode::Stream).await
    }

    async fn slate(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        self.control(cfg, ForwarderMode::Slate).await
    }

    async fn upload_slate(
        &self,
        cfg: &BroadcastConfig,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AdapterError> {
        let url = format!("{}/slate", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("mac", cfg.camera_mac.to_string()), ("name", name.to_owned())])
            .body(bytes)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::from_response(response).await)
        }
    }
}
