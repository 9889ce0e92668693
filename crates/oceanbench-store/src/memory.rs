//! In-memory store used by tests and short-lived tooling.
//!
//! Backs both store surfaces with a plain map. Keeps a write counter so
//! tests can assert on commit behaviour (for example, that an idle tick
//! performs no writes).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use oceanbench_types::{broadcast_key, BroadcastConfig, Mac, SiteKey};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config_store::{ConfigMutator, ConfigStore};
use crate::error::StoreError;
use crate::locks::KeyLocks;
use crate::vars::{device_var, scalar_name, Scalar, VarRecord, VarStore};

/// An in-memory implementation of [`ConfigStore`] and [`VarStore`].
#[derive(Debug, Default)]
pub struct MemStore {
    records: RwLock<BTreeMap<String, String>>,
    locks: KeyLocks,
    writes: AtomicU64,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn read(&self, key: &str) -> Result<String, StoreError> {
        self.records
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))
    }

    async fn write(&self, key: &str, blob: String) {
        self.records.write().await.insert(key.to_owned(), blob);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn parse_config(key: &str, blob: &str) -> Result<BroadcastConfig, StoreError> {
        serde_json::from_str(blob).map_err(|e| StoreError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ConfigStore for MemStore {
    async fn get_config(&self, site: SiteKey, uuid: Uuid) -> Result<BroadcastConfig, StoreError> {
        let key = broadcast_key(site, uuid);
        let blob = self.read(&key).await?;
        Self::parse_config(&key, &blob)
    }

    async fn put_config(&self, cfg: &BroadcastConfig) -> Result<(), StoreError> {
        let blob = serde_json::to_string(cfg)?;
        self.write(&cfg.key(), blob).await;
        Ok(())
    }

    async fn list_configs(&self, site: SiteKey) -> Result<Vec<BroadcastConfig>, StoreError> {
        let prefix = format!("{site}:Broadcast.");
        let records = self.records.read().await;
        let mut configs = Vec::new();
        for (key, blob) in records.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            match Self::parse_config(key, blob) {
                Ok(cfg) => configs.push(cfg),
                Err(e) => tracing::warn!(%key, error = %e, "Skipping unreadable config record"),
            }
        }
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
        self.write(&key, blob).await;
        Ok(cfg)
    }
}

#[async_trait]
impl VarStore for MemStore {
    async fn set_var(&self, site: SiteKey, name: &str, value: &str) -> Result<(), StoreError> {
        let record = VarRecord {
            value: value.to_owned(),
            updated: Utc::now(),
        };
        let blob = serde_json::to_string(&record)?;
        self.write(&format!("{site}:{name}"), blob).await;
        Ok(())
    }

    async fn get_var(&self, site: SiteKey, name: &str) -> Result<VarRecord, StoreError> {
        let key = format!("{site}:{name}");
        let blob = self.read(&key).await?;
        Ok(serde_json::from_str(&blob)?)
    }

    async fn latest_scalar(
        &self,
        site: SiteKey,
        mac: &Mac,
        pin: &str,
    ) -> Result<Scalar, StoreError> {
        let key = format!("{site}:{}", scalar_name(mac, pin));
        let blob = self.read(&key).await?;
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
        self.write(&format!("{site}:{}", scalar_name(mac, pin)), blob)
            .await;
        Ok(())
    }
}

/// Backdate a device variable's `updated` stamp. Test-support only: lets
/// liveness-probe tests simulate a stale `uptime` without sleeping.
impl MemStore {
    /// Overwrite a variable record verbatim, including its stamp.
    pub async fn put_var_record(
        &self,
        site: SiteKey,
        name: &str,
        record: &VarRecord,
    ) -> Result<(), StoreError> {
        let blob = serde_json::to_string(record)?;
        self.write(&format!("{site}:{name}"), blob).await;
        Ok(())
    }

    /// Convenience for `put_var_record` on a device variable.
    pub async fn put_device_var(
        &self,
        site: SiteKey,
        mac: &Mac,
        var: &str,
        record: &VarRecord,
    ) -> Result<(), StoreError> {
        self.put_var_record(site, &device_var(mac, var), record).await
    }
}
