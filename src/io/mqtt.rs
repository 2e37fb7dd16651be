//! MQTT ingestion of camera enter/exit events
//!
//! Cameras publish either one event object or an array of them:
//! `{"type":"enter","event_id":"..","timestamp":1700000000,"tracking_id":"..","camera_id":".."}`.
//! The timestamp may also be an RFC 3339 string; it is truncated to whole
//! seconds.

use crate::domain::types::{CameraMessage, Event, EventPayload, TimestampValue};
use crate::infra::config::Config;
use crate::services::event_store::{EventLog, StoreError};
use crate::services::timeline_service::TimelineService;
use rumqttc::{AsyncClient, Event as MqttEvent, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why a camera payload was rejected
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid camera message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CameraPayload {
    Batch(Vec<CameraMessage>),
    Single(CameraMessage),
}

/// Parse RFC 3339 to unix seconds
fn parse_iso_time(time_str: &str) -> Option<i64> {
    OffsetDateTime::parse(time_str, &Rfc3339).ok().map(|dt| dt.unix_timestamp())
}

fn timestamp_to_epoch_secs(ts: &TimestampValue) -> Result<i64, MessageError> {
    match ts {
        TimestampValue::EpochSecs(secs) => Ok(*secs),
        TimestampValue::IsoString(s) => {
            parse_iso_time(s).ok_or_else(|| MessageError::Timestamp(s.clone()))
        }
    }
}

impl CameraMessage {
    pub fn into_event(self) -> Result<Event, MessageError> {
        let timestamp = timestamp_to_epoch_secs(&self.timestamp)?;
        let payload = EventPayload {
            event_id: self.event_id,
            timestamp,
            tracking_id: self.tracking_id,
            camera_id: self.camera_id,
        };
        Ok(payload.into_event(self.kind))
    }
}

/// Parse an MQTT payload into events. All-or-nothing per payload.
pub fn parse_camera_message(payload: &[u8]) -> Result<Vec<Event>, MessageError> {
    let json_str = std::str::from_utf8(payload)?;
    let messages = match serde_json::from_str(json_str)? {
        CameraPayload::Batch(messages) => messages,
        CameraPayload::Single(message) => vec![message],
    };
    messages.into_iter().map(CameraMessage::into_event).collect()
}

/// Subscribe to camera events and record them until shutdown
pub async fn start_mqtt_ingest<L: EventLog + 'static>(
    config: &Config,
    service: Arc<TimelineService<L>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions = MqttOptions::new("timeline-api", config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_topic(), QoS::AtLeastOnce).await?;

    info!(
        topic = %config.mqtt_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_ingest_subscribed"
    );

    // Rate-limit store failure warnings to 1 per second
    let mut last_store_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // a dropped sender also stops the loop
                if changed.is_err() || *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                        let events = match parse_camera_message(&publish.payload) {
                            Ok(events) => events,
                            Err(e) => {
                                service.metrics().record_mqtt_invalid();
                                warn!(topic = %publish.topic, error = %e, "mqtt_payload_invalid");
                                continue;
                            }
                        };

                        debug!(topic = %publish.topic, event_count = %events.len(), "mqtt_message");
                        for event in events {
                            service.metrics().record_mqtt_message();
                            if let Err(StoreError::Unavailable(e)) = service.record(event) {
                                if last_store_warn.elapsed() > Duration::from_secs(1) {
                                    warn!(error = %e, "mqtt_event_not_stored");
                                    last_store_warn = Instant::now();
                                }
                            }
                        }
                    }
                    Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::EventKind;

    #[test]
    fn test_parse_single_message() {
        let json = br#"{"type":"enter","event_id":"e1","timestamp":1700000000,"tracking_id":"T","camera_id":"1"}"#;
        let events = parse_camera_message(json).unwrap();
        assert_eq!(events, vec![Event::enter("e1", 1_700_000_000, "T", "1")]);
    }

    #[test]
    fn test_parse_batch() {
        let json = br#"[
            {"type":"enter","event_id":"e1","timestamp":100,"tracking_id":"T","camera_id":"1"},
            {"type":"exit_event","event_id":"e2","timestamp":130,"tracking_id":"T","camera_id":"1"}
        ]"#;
        let events = parse_camera_message(json).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Exit);
        assert_eq!(events[1].timestamp, 130);
    }

    #[test]
    fn test_parse_iso_timestamp() {
        let json = br#"{"type":"exit","event_id":"e1","timestamp":"2026-01-05T17:41:30.048+01:00","tracking_id":"T","camera_id":"1"}"#;
        let events = parse_camera_message(json).unwrap();
        assert_eq!(events[0].timestamp, 1_767_631_290);
    }

    #[test]
    fn test_parse_invalid_payloads() {
        assert!(matches!(parse_camera_message(b"not json"), Err(MessageError::Json(_))));
        assert!(matches!(parse_camera_message(&[0xff, 0xfe]), Err(MessageError::Utf8(_))));
        assert!(parse_camera_message(
            br#"{"type":"wave","event_id":"e1","timestamp":1,"tracking_id":"T","camera_id":"1"}"#
        )
        .is_err());

        let bad_time = br#"{"type":"enter","event_id":"e1","timestamp":"yesterday","tracking_id":"T","camera_id":"1"}"#;
        assert!(matches!(parse_camera_message(bad_time), Err(MessageError::Timestamp(_))));
    }

    #[test]
    fn test_parse_empty_batch() {
        assert!(parse_camera_message(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_iso_time() {
        assert_eq!(parse_iso_time("2026-01-05T16:41:30Z"), Some(1_767_631_290));
        assert!(parse_iso_time("not a timestamp").is_none());
        assert!(parse_iso_time("").is_none());
    }
}
