//! Identifier newtypes shared across the workspace.
//!
//! A broadcast is keyed by `(SiteKey, Uuid)`; camera rigs and their
//! controllers are addressed by MAC. Both wrappers exist to prevent
//! accidental mixing of identifiers at compile time and to pin down the
//! string forms used in datastore keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric key identifying a site (one deployment of rigs and broadcasts).
///
/// Site keys appear in datastore keys (`"<site>:Broadcast.<uuid>"`) and in
/// the `skey` claim of cron-service JWTs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SiteKey(pub i64);

impl SiteKey {
    /// Return the inner numeric key.
    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SiteKey {
    fn from(key: i64) -> Self {
        Self(key)
    }
}

impl FromStr for SiteKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

/// A device MAC address in colon-separated hex form (`AA:BB:CC:DD:EE:FF`).
///
/// Stored uppercase. Device-variable records are keyed `"_<mac>.<var>"`,
/// so the MAC string form must be stable across writes. An empty MAC is
/// permitted on configs that have no hardware bound yet; callers probe
/// with [`Mac::is_empty`] before addressing the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Mac(String);

impl Mac {
    /// Parse and normalise a MAC address string.
    ///
    /// Accepts six colon-separated pairs of hex digits in either case and
    /// stores them uppercase. An empty input yields the empty MAC.
    ///
    /// # Errors
    ///
    /// Returns [`MacError`] if the input is non-empty and not a valid
    /// six-octet MAC.
    pub fn parse(s: &str) -> Result<Self, MacError> {
        if s.is_empty() {
            return Ok(Self(String::new()));
        }
        if !is_valid_mac(s) {
            return Err(MacError::Malformed(s.to_owned()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// True if no hardware is bound (the empty MAC).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The normalised string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Mac {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors from MAC address parsing.
#[derive(Debug, thiserror::Error)]
pub enum MacError {
    /// The string is not six colon-separated hex octets.
    #[error("malformed MAC address: {0:?}")]
    Malformed(String),
}

/// Validate the `XX:XX:XX:XX:XX:XX` shape without allocating.
fn is_valid_mac(s: &str) -> bool {
    let mut octets = 0usize;
    for part in s.split(':') {
        if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }
        octets = octets.saturating_add(1);
    }
    octets == 6
}
