//! Local file-backed store for standalone deployments.
//!
//! Each record is one JSON file under the store root:
//!
//! ```text
//! <root>/<site>/broadcasts/<uuid>.json      config records
//! <root>/<site>/vars/<name>.json            device variables + notify stamps
//! <root>/<site>/scalars/<mac>.<pin>.json    latest sensor scalars
//! ```
//!
//! Writes go to a `.tmp` sibling followed by a rename, so a crashed write
//! never leaves a half-record behind. `update_config` holds the per-key
//! lock across the read-mutate-write cycle.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use oceanbench_types::{broadcast_key, BroadcastConfig, Mac, SiteKey};
use tokio::fs;
use uuid::Uuid;

use crate::config_store::{ConfigMutator, ConfigStore};
use crate::error::StoreError;
use crate::locks::KeyLocks;
use crate::vars::{scalar_name, Scalar, VarRecord, VarStore};

/// A file-backed implementation of [`ConfigStore`] and [`VarStore`].
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: KeyLocks,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the root cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::info!(root = %root.display(), "Opened file store");
        Ok(Self {
            root,
            locks: KeyLocks::default(),
        })
    }

    fn config_path(&self, site: SiteKey, uuid: Uuid) -> PathBuf {
        self.root
            .join(site.to_string())
            .join("broadcasts")
            .join(format!("{uuid}.json"))
    }

    fn var_path(&self, site: SiteKey, name: &str) -> PathBuf {
        self.root
            .join(site.to_string())
            .join("vars")
            .join(format!("{}.json", sanitize(name)))
    }

    fn scalar_path(&self, site: SiteKey, mac: &Mac, pin: &str) -> PathBuf {
        self.root
            .join(site.to_string())
            .join("scalars")
            .join(format!("{}.json", sanitize(&scalar_name(mac, pin))))
    }

    async fn read_file(path: &Path, key: &str) -> Result<String, StoreError> {
        match fs::read_to_string(path).await {
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::KeyNotFound(key.to_owned()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Write `blob` atomically: temp file then rename.
    async fn write_file(path: &Path, blob: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, blob).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    fn parse_config(key: &str, blob: &str) -> Result<BroadcastConfig, StoreError> {
        serde_json::from_str(blob).map_err(|e| StoreError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Replace path-hostile characters in record names (`:` in MACs).
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\', ':'], "-")
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn get_config(&self, site: SiteKey, uuid: Uuid) -> Result<BroadcastConfig, StoreError> {
        let key = broadcast_key(site, uuid);
        let blob = Self::read_file(&self.config_path(site, uuid), &key).await?;
        Self::parse_config(&key, &blob)
    }

    async fn put_config(&self, cfg: &BroadcastConfig) -> Result<(), StoreError> {
        let blob = serde_json::to_string_pretty(cfg)?;
        Self::write_file(&self.config_path(cfg.site_key, cfg.uuid), &blob).await
    }

    async fn list_configs(&self, site: SiteKey) -> Result<Vec<BroadcastConfig>, StoreError> {
        let dir = self.root.join(site.to_string()).join("broadcasts");
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut configs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let key = path.display().to_string();
            let blob = fs::read_to_string(&path).await?;
            match Self::parse_config(&key, &blob) {
                Ok(cfg) => configs.push(cfg),
                Err(e) => tracing::warn!(%key, error = %e, "Skipping unreadable config record"),
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

        let path = self.config_path(site, uuid);
        let blob = Self::read_file(&path, &key).await?;
        let mut cfg = Self::parse_config(&key, &blob)?;
        mutate(&mut cfg);
        cfg.updated = Utc::now();

        let blob = serde_json::to_string_pretty(&cfg)?;
        Self::write_file(&path, &blob).await?;
        Ok(cfg)
    }
}

#[async_trait]
impl VarStore for FileStore {
    async fn set_var(&self, site: SiteKey, name: &str, value: &str) -> Result<(), StoreError> {
        let record = VarRecord {
            value: value.to_owned(),
            updated: Utc::now(),
        };
        let blob = serde_json::to_string(&record)?;
        Self::write_file(&self.var_path(site, name), &blob).await
    }

    async fn get_var(&self, site: SiteKey, name: &str) -> Result<VarRecord, StoreError> {
        let blob = Self::read_file(&self.var_path(site, name), name).await?;
        Ok(serde_json::from_str(&blob)?)
    }

    async fn latest_scalar(
        &self,
        site: SiteKey,
        mac: &Mac,
        pin: &str,
    ) -> Result<Scalar, StoreError> {
        let name = scalar_name(mac, pin);
        let blob = Self::read_file(&self.scalar_path(site, mac, pin), &name).await?;
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
        Self::write_file(&self.scalar_path(site, mac, pin), &blob).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(site: i64, name: &str) -> BroadcastConfig {
        BroadcastConfig {
            uuid: Uuid::new_v4(),
            name: name.to_owned(),
            site_key: SiteKey(site),
            enabled: true,
            ..BroadcastConfig::default()
        }
    }

    #[tokio::test]
    async fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let cfg = config(3, "Rapid Bay");
        store.put_config(&cfg).await.unwrap();
        let got = store.get_config(SiteKey(3), cfg.uuid).await.unwrap();
        assert_eq!(got, cfg);
    }

    #[tokio::test]
    async fn missing_config_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let err = store.get_config(SiteKey(3), Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn listing_skips_unreadable_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.put_config(&config(3, "good")).await.unwrap();

        // Drop a garbage record alongside it.
        let bad = dir
            .path()
            .join("3")
            .join("broadcasts")
            .join(format!("{}.json", Uuid::new_v4()));
        fs::write(&bad, "{not json").await.unwrap();

        let listed = store.list_configs(SiteKey(3)).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn update_config_persists_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let cfg = config(3, "Rapid Bay");
        store.put_config(&cfg).await.unwrap();
        store
            .update_config(SiteKey(3), cfg.uuid, Box::new(|c| c.start_failures = 2))
            .await
            .unwrap();

        let got = store.get_config(SiteKey(3), cfg.uuid).await.unwrap();
        assert_eq!(got.start_failures, 2);
    }

    #[tokio::test]
    async fn var_names_with_macs_map_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let mac = Mac::parse("AA:BB:CC:00:11:22").unwrap();

        store
            .set_var(SiteKey(3), &crate::vars::device_var(&mac, "uptime"), "60")
            .await
            .unwrap();
        let record = store
            .get_var(SiteKey(3), &crate::vars::device_var(&mac, "uptime"))
            .await
            .unwrap();
        assert_eq!(record.value, "60");
    }
}
