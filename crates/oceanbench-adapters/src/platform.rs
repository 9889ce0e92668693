//! The video platform capability.
//!
//! The orchestrator talks to the platform (a YouTube-style live service)
//! through a thin adapter service addressed by `--tvurl`. The capability
//! surface is exactly what the state machines need: idempotent creation,
//! start/stop, lifecycle status, ingest health, chat, and privacy.

use async_trait::async_trait;
use oceanbench_types::{
    BroadcastConfig, BroadcastLifecycle, IssueSeverity, Privacy, StreamHealth,
};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Identifiers handed back by broadcast creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastHandles {
    /// Platform broadcast object ID.
    pub broadcast_id: String,
    /// Platform ingest stream ID.
    pub stream_id: String,
    /// Live chat ID.
    pub chat_id: String,
    /// Platform stream name.
    pub stream_name: String,
    /// RTMP ingest key.
    pub rtmp_key: String,
    /// Full RTMP ingestion address (scheme, host, application).
    pub ingestion_address: String,
}

impl BroadcastHandles {
    /// The complete RTMP push URL (address plus key).
    pub fn rtmp_url(&self) -> String {
        format!("{}/{}", self.ingestion_address, self.rtmp_key)
    }
}

/// One stream configuration issue reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    /// How serious the platform considers it.
    pub severity: IssueSeverity,
    /// Machine-readable issue type.
    pub kind: String,
    /// Human-readable description.
    pub description: String,
}

/// The result of one ingest health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall stream health status.
    pub status: StreamHealth,
    /// Outstanding configuration issues.
    pub issues: Vec<ConfigIssue>,
}

impl HealthReport {
    /// Whether this probe counts against the broadcast: any
    /// error-severity issue, or a `noData`/`revoked` status.
    pub fn counts_as_issue(&self) -> bool {
        self.status.is_unreceiving()
            || self
                .issues
                .iter()
                .any(|i| i.severity == IssueSeverity::Error)
    }
}

/// The live-streaming platform capability.
///
/// Creation must be idempotent on `(uuid, name)`: creating an existing
/// broadcast returns its current handles rather than a duplicate.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Create (or find) the platform broadcast for a config.
    async fn create_broadcast(
        &self,
        cfg: &BroadcastConfig,
    ) -> Result<BroadcastHandles, AdapterError>;

    /// Transition the platform broadcast to live.
    async fn start_broadcast(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError>;

    /// End the platform broadcast.
    async fn stop_broadcast(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError>;

    /// Lifecycle status of a broadcast object.
    async fn broadcast_status(
        &self,
        broadcast_id: &str,
    ) -> Result<BroadcastLifecycle, AdapterError>;

    /// Ingest health of a stream.
    async fn health_status(&self, stream_id: &str) -> Result<HealthReport, AdapterError>;

    /// Post a message to a live chat.
    async fn post_chat(&self, chat_id: &str, msg: &str) -> Result<(), AdapterError>;

    /// Set the privacy of a broadcast object.
    async fn set_privacy(
        &self,
        broadcast_id: &str,
        privacy: Privacy,
    ) -> Result<(), AdapterError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    uuid: String,
    name: &'a str,
    account: &'a str,
    resolution: &'a str,
    description: &'a str,
    privacy: Privacy,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: BroadcastLifecycle,
}

/// [`VideoPlatform`] over the platform adapter service.
pub struct HttpVideoPlatform {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVideoPlatform {
    /// Create a platform adapter talking to `base_url` with the given
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
            .map_err(|e| AdapterError::Config(format!("platform client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(AdapterError::from_response(response).await)
        }
    }
}

#[async_trait]
impl VideoPlatform for HttpVideoPlatform {
    async fn create_broadcast(
        &self,
        cfg: &BroadcastConfig,
    ) -> Result<BroadcastHandles, AdapterError> {
        let url = format!("{}/api/broadcasts", self.base_url);
        let body = CreateRequest {
            uuid: cfg.uuid.to_string(),
            name: &cfg.name,
            account: &cfg.account,
            resolution: &cfg.resolution,
            description: &cfg.description,
            privacy: cfg.live_privacy,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let response = Self::expect_success(response).await?;
        response
            .json::<BroadcastHandles>()
            .await
            .map_err(|e| AdapterError::Decode(format!("create response: {e}")))
    }

    async fn start_broadcast(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        if cfg.broadcast_id.is_empty() {
            return Err(AdapterError::MissingBinding(String::from("broadcast_id")));
        }
        let url = format!(
            "{}/api/broadcasts/{}/start",
            self.base_url, cfg.broadcast_id
        );
        let body = serde_json::json!({ "stream_id": cfg.stream_id });
        let response = self.client.post(&url).json(&body).send().await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn stop_broadcast(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        if cfg.broadcast_id.is_empty() {
            return Err(AdapterError::MissingBinding(String::from("broadcast_id")));
        }
        let url = format!(
            "{}/api/broadcasts/{}/stop",
            self.base_url, cfg.broadcast_id
        );
        let response = self.client.post(&url).send().await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn broadcast_status(
        &self,
        broadcast_id: &str,
    ) -> Result<BroadcastLifecycle, AdapterError> {
        let url = format!("{}/api/broadcasts/{broadcast_id}/status", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = Self::expect_success(response).await?;
        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(format!("status response: {e}")))?;
        Ok(status.status)
    }

    async fn health_status(&self, stream_id: &str) -> Result<HealthReport, AdapterError> {
        let url = format!("{}/api/streams/{stream_id}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = Self::expect_success(response).await?;
        response
            .json::<HealthReport>()
            .await
            .map_err(|e| AdapterError::Decode(format!("health response: {e}")))
    }

    async fn post_chat(&self, chat_id: &str, msg: &str) -> Result<(), AdapterError> {
        if chat_id.is_empty() {
            return Err(AdapterError::MissingBinding(String::from("chat_id")));
        }
        let url = format!("{}/api/chats/{chat_id}/messages", self.base_url);
        let body = serde_json::json!({ "text": msg });
        let response = self.client.post(&url).json(&body).send().await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn set_privacy(
        &self,
        broadcast_id: &str,
        privacy: Privacy,
    ) -> Result<(), AdapterError> {
        let url = format!("{}/api/broadcasts/{broadcast_id}/privacy", self.base_url);
        let body = serde_json::json!({ "privacy": privacy });
        let response = self.client.post(&url).json(&body).send().await?;
        Self::expect_success(response).await.map(|_| ())
    }
}
