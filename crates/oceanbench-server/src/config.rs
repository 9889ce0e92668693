//! Service configuration loading.
//!
//! The canonical configuration lives in `oceanbench.yaml`. This module
//! defines strongly-typed structs mirroring the YAML structure, a loader,
//! and the env overrides used in deployment:
//!
//! - `DATASTORE_URL` overrides `datastore.url`
//! - `OCEANBENCH_CRON_SECRET` overrides `cron.secret`
//! - `OPS_PERIOD` (minutes) overrides `notify.period_minutes`

use std::path::Path;

use chrono::TimeDelta;
use oceanbench_orchestrator::OrchestratorSettings;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yml::Error),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Network settings.
    pub server: ServerSection,
    /// Datastore connection settings.
    pub datastore: DatastoreSection,
    /// Video platform adapter settings.
    pub platform: PlatformSection,
    /// Cron service settings.
    pub cron: CronSection,
    /// Forwarder settings.
    pub forwarder: ForwarderSection,
    /// Operations notification settings.
    pub notify: NotifySection,
    /// Orchestrator timing policy.
    pub orchestrator: OrchestratorSection,
}

/// Network settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

/// Datastore connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatastoreSection {
    /// Redis-compatible URL for cloud mode.
    pub url: String,
    /// Root directory for the standalone file store.
    pub file_root: String,
}

impl Default for DatastoreSection {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            file_root: String::from("./oceanbench-data"),
        }
    }
}

/// Video platform adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct PlatformSection {
    /// Base URL of the platform adapter service (`--tvurl`).
    pub tvurl: String,
}

/// Cron service settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CronSection {
    /// Base URL of the cron service (`--cronurl`).
    pub url: String,
    /// Service account expected as the token issuer.
    pub account: String,
    /// Shared HMAC secret; deployments set `OCEANBENCH_CRON_SECRET`.
    pub secret: String,
}

impl Default for CronSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            account: String::from("cron@oceanbench"),
            secret: String::new(),
        }
    }
}

/// Forwarder settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct ForwarderSection {
    /// Base URL of the vidforward control API.
    pub url: String,
}

/// Operations notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// Webhook that receives notifications; empty means log-only.
    pub endpoint: String,
    /// Recipient identity used in the rate-limit key.
    pub recipient: String,
    /// Suppression window in minutes.
    pub period_minutes: u64,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            recipient: String::from("ops"),
            period_minutes: 60,
        }
    }
}

/// Orchestrator timing policy, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Interval between platform status checks.
    pub status_interval_secs: u64,
    /// Interval between sensor chat messages.
    pub chat_interval_secs: u64,
    /// Interval between health probes.
    pub health_interval_secs: u64,
    /// Debounce for unhealthy-state recovery.
    pub reset_interval_secs: u64,
    /// Residency bound for transient broadcast states.
    pub transient_timeout_secs: u64,
    /// Residency bound for transient hardware states.
    pub hardware_timeout_secs: u64,
    /// Camera reporting interval.
    pub monitor_period_secs: u64,
    /// Consecutive start failures before disablement.
    pub max_start_failures: u32,
    /// Per-call adapter timeout.
    pub op_timeout_secs: u64,
    /// Wall-clock budget per broadcast tick.
    pub tick_budget_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            status_interval_secs: 600,
            chat_interval_secs: 1800,
            health_interval_secs: 600,
            reset_interval_secs: 300,
            transient_timeout_secs: 300,
            hardware_timeout_secs: 300,
            monitor_period_secs: 60,
            max_start_failures: 3,
            op_timeout_secs: 20,
            tick_budget_secs: 55,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the deployment env overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATASTORE_URL") {
            self.datastore.url = url;
        }
        if let Ok(secret) = std::env::var("OCEANBENCH_CRON_SECRET") {
            self.cron.secret = secret;
        }
        if let Ok(minutes) = std::env::var("OPS_PERIOD")
            && let Ok(minutes) = minutes.parse::<u64>()
        {
            self.notify.period_minutes = minutes;
        }
    }

    /// Translate the timing section into orchestrator settings.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let section = &self.orchestrator;
        let secs = |s: u64| TimeDelta::seconds(i64::try_from(s).unwrap_or(i64::MAX));
        OrchestratorSettings {
            status_interval: secs(section.status_interval_secs),
            chat_interval: secs(section.chat_interval_secs),
            health_interval: secs(section.health_interval_secs),
            reset_interval: secs(section.reset_interval_secs),
            transient_timeout: secs(section.transient_timeout_secs),
            hardware_timeout: secs(section.hardware_timeout_secs),
            monitor_period: secs(section.monitor_period_secs),
            max_start_failures: section.max_start_failures,
            op_timeout: std::time::Duration::from_secs(section.op_timeout_secs),
            tick_budget: std::time::Duration::from_secs(section.tick_budget_secs),
        }
    }

    /// The notification suppression window.
    pub fn notify_period(&self) -> TimeDelta {
        TimeDelta::minutes(i64::try_from(self.notify.period_minutes).unwrap_or(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_production_policy() {
        let config = ServiceConfig::default();
        assert_eq!(config.orchestrator.status_interval_secs, 600);
        assert_eq!(config.orchestrator.chat_interval_secs, 1800);
        assert_eq!(config.orchestrator.max_start_failures, 3);
        assert_eq!(config.notify.period_minutes, 60);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let config = ServiceConfig::parse(
            r"
server:
  port: 9090
platform:
  tvurl: http://tv.internal:8000
orchestrator:
  chat_interval_secs: 60
",
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.platform.tvurl, "http://tv.internal:8000");
        let settings = config.orchestrator_settings();
        assert_eq!(settings.chat_interval, TimeDelta::seconds(60));
        // Untouched sections keep their defaults.
        assert_eq!(settings.max_start_failures, 3);
    }
}
