//! Camera rig control over the device-variable store.
//!
//! The rig is not called directly: power control writes comma-separated
//! `var=value` actions into the device-variable store, which the
//! controller polls and applies. Liveness flows the other way -- the
//! camera refreshes an `uptime` variable, and a reading younger than
//! `2 x monitor_period` means the camera is alive.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use oceanbench_types::{BroadcastConfig, Event, Mac, SiteKey};
use oceanbench_store::{device_var, VarStore};

use crate::error::AdapterError;

/// Device variable refreshed by a live camera.
const UPTIME_VAR: &str = "uptime";

/// Device variable reporting the rig battery voltage.
const VOLTAGE_VAR: &str = "batteryVoltage";

/// Camera power control and liveness probing.
pub struct CameraControl {
    vars: Arc<dyn VarStore>,
    monitor_period: TimeDelta,
}

impl CameraControl {
    /// Create a control handle over the device-variable store.
    ///
    /// `monitor_period` is the rig's reporting interval; the liveness
    /// window is twice that.
    pub fn new(vars: Arc<dyn VarStore>, monitor_period: TimeDelta) -> Self {
        Self {
            vars,
            monitor_period,
        }
    }

    /// Power the camera on by writing the config's on-actions.
    pub async fn start(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        tracing::info!(mac = %cfg.camera_mac, "Writing camera power-on actions");
        self.write_actions(cfg, &cfg.on_actions).await
    }

    /// Power the camera off by writing the config's off-actions.
    pub async fn stop(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        tracing::info!(mac = %cfg.camera_mac, "Writing camera power-off actions");
        self.write_actions(cfg, &cfg.off_actions).await
    }

    /// Full rig shutdown.
    pub async fn shutdown(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        self.write_actions(cfg, &cfg.shutdown_actions).await
    }

    /// Whether the camera's `uptime` variable is fresh.
    ///
    /// A missing variable reads as dead, not as an error: a rig that has
    /// never reported is not alive.
    pub async fn is_alive(&self, site: SiteKey, mac: &Mac) -> Result<bool, AdapterError> {
        match self.vars.get_var(site, &device_var(mac, UPTIME_VAR)).await {
            Ok(record) => {
                let age = Utc::now().signed_duration_since(record.updated);
                Ok(age <= self.monitor_period.checked_mul(2).unwrap_or(self.monitor_period))
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(AdapterError::Store(e)),
        }
    }

    /// Return `event` iff the camera's liveness matches `expected`.
    ///
    /// This is the probe the hardware machine runs on each `time` event
    /// while in a transient state.
    pub async fn event_if_status(
        &self,
        site: SiteKey,
        mac: &Mac,
        event: Event,
        expected: bool,
    ) -> Result<Option<Event>, AdapterError> {
        let alive = self.is_alive(site, mac).await?;
        Ok((alive == expected).then_some(event))
    }

    /// The rig battery voltage, if the controller reports one.
    ///
    /// Rigs without a voltage sensor return `None`; callers must not
    /// block a start on an absent reading.
    pub async fn battery_voltage(
        &self,
        site: SiteKey,
        mac: &Mac,
    ) -> Result<Option<f64>, AdapterError> {
        if mac.is_empty() {
            return Ok(None);
        }
        match self.vars.get_var(site, &device_var(mac, VOLTAGE_VAR)).await {
            Ok(record) => Ok(record.value.parse::<f64>().ok()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(AdapterError::Store(e)),
        }
    }

    /// Write one comma-separated `var=value` action list.
    ///
    /// Bare variable names are scoped to the controller MAC
    /// (`"<mac>.<var>"`); names already containing a `.` are taken as
    /// fully qualified.
    async fn write_actions(
        &self,
        cfg: &BroadcastConfig,
        actions: &str,
    ) -> Result<(), AdapterError> {
        for action in actions.split(',') {
            let action = action.trim();
            if action.is_empty() {
                continue;
            }
            let Some((var, value)) = action.split_once('=') else {
                tracing::warn!(mac = %cfg.camera_mac, %action, "Dropping malformed action");
                continue;
            };
            let name = if var.contains('.') {
                var.to_owned()
            } else {
                format!("{}.{var}", cfg.controller_mac)
            };
            self.vars.set_var(cfg.site_key, &name, value).await?;
        }
        Ok(())
    }
}
