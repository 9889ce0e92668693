//! Device variables, notification stamps, and sensor scalars.
//!
//! The camera rig is controlled by writing `var=value` pairs into the
//! device-variable store; devices poll their variables and report back an
//! `uptime` variable whose `updated` stamp doubles as a liveness signal.
//! Notification rate limiting reuses the same record shape under
//! `"_<kind>.<recipient>"` names. Sensor scalars arrive through the
//! (out-of-scope) ingest pipeline; the chat handler only reads the latest
//! value per `(mac, pin)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oceanbench_types::{Mac, SiteKey};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A named variable with the instant of its last write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarRecord {
    /// The variable's value.
    pub value: String,
    /// When the value was last written.
    pub updated: DateTime<Utc>,
}

/// The latest reading of one sensor pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    /// Raw scalar value as ingested.
    pub value: f64,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}

/// Key-addressable persistence of device variables and scalars.
#[async_trait]
pub trait VarStore: Send + Sync {
    /// Write a variable, stamping `updated` with the current instant.
    async fn set_var(&self, site: SiteKey, name: &str, value: &str) -> Result<(), StoreError>;

    /// Read a variable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if it has never been written.
    async fn get_var(&self, site: SiteKey, name: &str) -> Result<VarRecord, StoreError>;

    /// The latest scalar for a device pin.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if no reading exists.
    async fn latest_scalar(
        &self,
        site: SiteKey,
        mac: &Mac,
        pin: &str,
    ) -> Result<Scalar, StoreError>;

    /// Record a scalar reading. Production writes come from the ingest
    /// pipeline; this surface exists for standalone tooling and tests.
    async fn put_scalar(
        &self,
        site: SiteKey,
        mac: &Mac,
        pin: &str,
        scalar: &Scalar,
    ) -> Result<(), StoreError>;
}

/// Device-variable name for a MAC-addressed variable (`"_<mac>.<var>"`).
pub fn device_var(mac: &Mac, var: &str) -> String {
    format!("_{mac}.{var}")
}

/// Notification rate-limit record name (`"_<kind>.<recipient>"`).
pub fn notify_var(kind: &str, recipient: &str) -> String {
    format!("_{kind}.{recipient}")
}

/// Scalar record name for a device pin.
pub fn scalar_name(mac: &Mac, pin: &str) -> String {
    format!("Scalar.{mac}.{pin}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_key_patterns() {
        let mac = Mac::parse("AA:BB:CC:00:11:22").unwrap();
        assert_eq!(device_var(&mac, "uptime"), "_AA:BB:CC:00:11:22.uptime");
        assert_eq!(notify_var("health", "ops"), "_health.ops");
        assert_eq!(scalar_name(&mac, "A0"), "Scalar.AA:BB:CC:00:11:22.A0");
    }
}
