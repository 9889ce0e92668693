//! The broadcast configuration store surface.
//!
//! [`ConfigStore::update_config`] is the *only* sanctioned mutation path
//! for a committed config: read record, deserialize, apply the mutator,
//! serialize, write, all under a per-key transaction. Callers that need
//! field fan-out (state tag plus projection flags plus state data) do so
//! inside one mutator so the commit is all-or-nothing.

use async_trait::async_trait;
use oceanbench_types::{BroadcastConfig, SiteKey};
use uuid::Uuid;

use crate::error::StoreError;

/// A single-use mutation applied to a config inside the transaction.
pub type ConfigMutator = Box<dyn FnOnce(&mut BroadcastConfig) + Send>;

/// Key-addressable persistence of [`BroadcastConfig`] records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read one config record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if the record does not exist,
    /// [`StoreError::Corrupt`] if it cannot be deserialized.
    async fn get_config(&self, site: SiteKey, uuid: Uuid) -> Result<BroadcastConfig, StoreError>;

    /// Write one config record, creating it if absent.
    async fn put_config(&self, cfg: &BroadcastConfig) -> Result<(), StoreError>;

    /// All config records belonging to a site.
    ///
    /// Records that exist but cannot be deserialized are skipped with a
    /// log line; one corrupt broadcast must not take down the tick for
    /// the whole site.
    async fn list_configs(&self, site: SiteKey) -> Result<Vec<BroadcastConfig>, StoreError>;

    /// Transactional read-modify-write of one record.
    ///
    /// The mutator runs against the freshly-read record; the result is
    /// committed with a bumped `updated` stamp and returned. Concurrent
    /// updates for the same key serialise here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if the record does not exist;
    /// the mutator is not invoked in that case.
    async fn update_config(
        &self,
        site: SiteKey,
        uuid: Uuid,
        mutate: ConfigMutator,
    ) -> Result<BroadcastConfig, StoreError>;
}
