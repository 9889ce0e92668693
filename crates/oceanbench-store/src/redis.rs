//! Redis-compatible store for cloud deployments.
//!
//! Wraps a [`fred`] client and lays records out under the key patterns in
//! the crate docs. Listing is served from a per-site membership index
//! (`"<site>:Broadcast.index"`) maintained on every config write, which
//! keeps the tick driver off `SCAN`.

use async_trait::async_trait;
use chrono::Utc;
use fred::prelude::*;
use oceanbench_types::{broadcast_key, BroadcastConfig, Mac, SiteKey};
use uuid::Uuid;

use crate::config_store::{ConfigMutator, ConfigStore};
use crate::error::StoreError;
use crate::locks::KeyLocks;
use crate::vars::{scalar_name, Scalar, VarRecord, VarStore};

/// Connection handle to a Redis-compatible datastore.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    locks: std::sync::Arc<KeyLocks>,
}

impl RedisStore {
    /// Connect to the datastore at the given URL.
    ///
    /// The URL follows the Redis URL scheme: `redis://host:port` or
    /// `redis://host:port/db`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed and
    /// [`StoreError::Redis`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("invalid datastore URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to datastore");
        Ok(Self {
            client,
            locks: std::sync::Arc::new(KeyLocks::default()),
        })
    }

    fn index_key(site: SiteKey) -> String {
        format!("{site}:Broadcast.index")
    }

    async fn read(&self, key: &str) -> Result<String, StoreError> {
        let value: Option<String> = self.client.get(key).await?;
        value.ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))
    }

    async fn write(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        let _: () = self.client.set(key, blob, None, None, false).await?;
        Ok(())
    }

    fn parse_config(key: &str, blob: &str) -> Result<BroadcastConfig, StoreError> {
        serde_json::from_str(blob).map_err(|e| StoreError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ConfigStore for RedisStore {
    async fn get_config(&self, site: SiteKey, uuid: Uuid) -> Result<BroadcastConfig, StoreError> {
        let key = broadcast_key(site, uuid);
        let blob = self.read(&key).await?;
        Self::parse_config(&key, &blob)
    }

    async fn put_config(&self, cfg: &BroadcastConfig) -> Result<(), StoreError> {
        let blob = serde_json::to_string(cfg)?;
        self.write(&cfg.key(), &blob).await?;
        let _: u64 = self
            .client
            .sadd(Self::index_key(cfg.site_key), cfg.uuid.to_string())
            .await?;
        Ok(())
    }

    async fn list_configs(&self, site: SiteKey) -> Result<Vec<BroadcastConfig>, StoreError> {
        let members: Vec<String> = self.client.smembers(Self::index_key(site)).await?;

        let mut configs = Vec::new();
        for member in members {
            let Ok(uuid) = member.parse::<Uuid>() else {
                tracing::warn!(site = %site, %member, "Dropping malformed index member");
                continue;
            };
            match self.get_config(site, uuid).await {
                Ok(cfg) => configs.push(cfg),
                Err(e) => {
                    tracing::warn!(site = %site, %uuid, error = %e, "Skipping unreadable config record");
                }
            }
        }
        configs.sort_by_key(|c| c.uuid);
        Ok(configs)
    }

    async fn update_config(
        &self,
        site: SiteKey,
        uuid: Uuid,
        mutate: ConfigMutator,
    ) -> Result<BroadcastConfig, StoreError> {
        let key = broadcast_key(site, uuid);
        let _guard = self.locks.lock(&key).await;

        let blob = self.read(&key).await?;
        let mut cfg = Self::parse_config(&key, &blob)?;
        mutate(&mut cfg);
        cfg.updated = Utc::now();

        let blob = serde_json::to_string(&cfg)?;
        self.write(&key, &blob).await?;
        Ok(cfg)
    }
}

#[async_trait]
impl VarStore for RedisStore {
    async fn set_var(&self, site: SiteKey, name: &str, value: &str) -> Result<(), StoreError> {
        let record = VarRecord {
            value: value.to_owned(),
            updated: Utc::now(),
        };
        let blob = serde_json::to_string(&record)?;
        self.write(&format!("{site}:{name}"), &blob).await
    }

    async fn get_var(&self, site: SiteKey, name: &str) -> Result<VarRecord, StoreError> {
        let blob = self.read(&format!("{site}:{name}")).await?;
        Ok(serde_json::from_str(&blob)?)
    }

    async fn latest_scalar(
        &self,
        site: SiteKey,
        mac: &Mac,
        pin: &str,
    ) -> Result<Scalar, StoreError> {
        let blob = self
            .read(&format!("{site}:{}", scalar_name(mac, pin)))
            .await?;
        Ok(serde_json::from_str(&blob)?)
    }

    async fn put_scalar(
        &self,
        site: SiteKey,
        mac: &Mac,
        pin: &str,
        scalar: &Scalar,
    ) -> Result<(), StoreError> {
        let blob = serde_json::to_string(scalar)?;
        self.write(&format!("{site}:{}", scalar_name(mac, pin)), &blob)
            .await
    }
}
