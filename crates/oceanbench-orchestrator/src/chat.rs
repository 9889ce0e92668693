//! The chat handler.
//!
//! On `chatMessageDue`, reads the latest scalar for every sensor the
//! config marks `send_msg`, applies each sensor's linear transform, and
//! posts one aggregated message to the broadcast's live chat. Sensors
//! with no reading yet are skipped; an empty message is not posted.

use async_trait::async_trait;
use oceanbench_types::Event;

use crate::bus::EventHandler;
use crate::context::TickContext;
use crate::error::OrchestratorError;

/// Posts periodic sensor summaries to the live chat.
#[derive(Debug, Default)]
pub struct ChatHandler;

impl ChatHandler {
    /// A new handler.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for ChatHandler {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn handle(
        &mut self,
        ctx: &mut TickContext,
        event: &Event,
    ) -> Result<Vec<Event>, OrchestratorError> {
        if !matches!(event, Event::ChatMessageDue) {
            return Ok(Vec::new());
        }
        if ctx.cfg.chat_id.is_empty() {
            tracing::debug!(uuid = %ctx.cfg.uuid, "No chat bound; skipping sensor message");
            return Ok(Vec::new());
        }

        let mut parts = Vec::new();
        for sensor in ctx.cfg.sensors.iter().filter(|s| s.send_msg) {
            match ctx
                .vars
                .latest_scalar(ctx.cfg.site_key, &ctx.cfg.camera_mac, &sensor.pin)
                .await
            {
                Ok(scalar) => {
                    let value = sensor.transform(scalar.value);
                    parts.push(format!("{}: {value:.1}{}", sensor.name, sensor.units));
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        uuid = %ctx.cfg.uuid,
                        sensor = %sensor.name,
                        "No reading yet; skipping sensor"
                    );
                }
                Err(e) => {
                    tracing::warn!(uuid = %ctx.cfg.uuid, sensor = %sensor.name, error = %e, "Scalar read failed");
                }
            }
        }

        if parts.is_empty() {
            return Ok(Vec::new());
        }

        let message = parts.join(", ");
        if let Err(e) = ctx.platform.post_chat(&ctx.cfg.chat_id, &message).await {
            tracing::warn!(uuid = %ctx.cfg.uuid, error = %e, "Chat post failed");
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OrchestratorSettings;
    use chrono::{TimeDelta, Utc};
    use oceanbench_adapters::{CameraControl, FakeForwarder, FakeNotifier, FakePlatform};
    use oceanbench_store::{ConfigStore, MemStore, Scalar, VarStore};
    use oceanbench_types::{BroadcastConfig, Mac, SensorEntry, SiteKey};
    use std::sync::Arc;

    fn sensor(name: &str, pin: &str, units: &str, scale: f64) -> SensorEntry {
        SensorEntry {
            name: name.to_owned(),
            pin: pin.to_owned(),
            units: units.to_owned(),
            send_msg: true,
            scale_factor: scale,
            offset: 0.0,
        }
    }

    async fn context_with(platform: Arc<FakePlatform>, store: Arc<MemStore>) -> TickContext {
        let cfg = BroadcastConfig {
            uuid: uuid::Uuid::new_v4(),
            site_key: SiteKey(3),
            chat_id: String::from("C1"),
            camera_mac: Mac::parse("AA:BB:CC:00:11:22").unwrap(),
            sensors: vec![
                sensor("water temp", "A0", "C", 0.1),
                sensor("salinity", "A1", "ppt", 1.0),
                SensorEntry {
                    send_msg: false,
                    ..sensor("internal", "A2", "V", 1.0)
                },
            ],
            ..BroadcastConfig::default()
        };
        store.put_config(&cfg).await.unwrap();
        TickContext::new(
            Utc::now(),
            cfg,
            Arc::new(OrchestratorSettings::default()),
            store.clone(),
            store.clone(),
            platform,
            Arc::new(FakeForwarder::new()),
            Arc::new(CameraControl::new(store, TimeDelta::seconds(60))),
            Arc::new(FakeNotifier::new()),
            None,
        )
    }

    #[tokio::test]
    async fn aggregates_transformed_readings_into_one_message() {
        let store = Arc::new(MemStore::new());
        let platform = Arc::new(FakePlatform::new());
        let mac = Mac::parse("AA:BB:CC:00:11:22").unwrap();
        store
            .put_scalar(
                SiteKey(3),
                &mac,
                "A0",
                &Scalar {
                    value: 215.0,
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();
        store
            .put_scalar(
                SiteKey(3),
                &mac,
                "A1",
                &Scalar {
                    value: 35.2,
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();

        let mut ctx = context_with(platform.clone(), store).await;
        let mut handler = ChatHandler::new();
        handler.handle(&mut ctx, &Event::ChatMessageDue).await.unwrap();

        let messages = platform.chat_messages();
        assert_eq!(messages.len(), 1);
        let (chat_id, text) = &messages[0];
        assert_eq!(chat_id, "C1");
        assert_eq!(text, "water temp: 21.5C, salinity: 35.2ppt");
    }

    #[tokio::test]
    async fn no_readings_means_no_message() {
        let store = Arc::new(MemStore::new());
        let platform = Arc::new(FakePlatform::new());
        let mut ctx = context_with(platform.clone(), store).await;
        let mut handler = ChatHandler::new();

        handler.handle(&mut ctx, &Event::ChatMessageDue).await.unwrap();
        assert!(platform.chat_messages().is_empty());
    }
}
