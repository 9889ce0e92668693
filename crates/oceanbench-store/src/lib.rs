//! Persistence layer for Ocean Bench.
//!
//! Two key-addressable blob stores back the orchestrator:
//!
//! - a local file store for standalone deployments, and
//! - a Redis-compatible store (via [`fred`]) for cloud deployments.
//!
//! Both expose the same two surfaces: [`ConfigStore`] for broadcast
//! configuration records (`"<site>:Broadcast.<uuid>"` keyed JSON blobs,
//! mutated only through the transactional [`ConfigStore::update_config`])
//! and [`VarStore`] for device variables, notification rate-limit
//! timestamps, and latest sensor scalars.
//!
//! # Key Patterns
//!
//! | Pattern | Surface | Description |
//! |---------|---------|-------------|
//! | `<site>:Broadcast.<uuid>` | config | JSON [`BroadcastConfig`] record |
//! | `<site>:Broadcast.index` | config | membership index for listing |
//! | `<site>:_<mac>.<var>` | vars | device variable with `updated` stamp |
//! | `<site>:_<kind>.<recipient>` | vars | notification rate-limit stamp |
//! | `<site>:Scalar.<mac>.<pin>` | vars | latest sensor scalar |
//!
//! [`BroadcastConfig`]: oceanbench_types::BroadcastConfig

pub mod config_store;
pub mod error;
pub mod file;
pub mod memory;
pub mod redis;
pub mod vars;

mod locks;

// Re-export primary types for convenience.
pub use config_store::{ConfigMutator, ConfigStore};
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemStore;
pub use redis::RedisStore;
pub use vars::{device_var, notify_var, scalar_name, Scalar, VarRecord, VarStore};
