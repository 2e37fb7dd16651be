//! Shared types for the timeline service

use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for tracking IDs (one tracked subject across cameras)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(pub String);

impl std::fmt::Display for TrackingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Newtype wrapper for camera IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub String);

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CameraId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Newtype wrapper for event IDs (idempotency key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Field-of-view transition reported by a camera.
///
/// `Enter` sorts before `Exit`; pairing uses this order for events sharing
/// a timestamp when no enter is open on the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[serde(alias = "enter_event")]
    Enter,
    #[serde(alias = "exit_event")]
    Exit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Exit => "exit",
        }
    }
}

/// A recorded enter/exit event. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub kind: EventKind,
    /// Unix seconds
    pub timestamp: i64,
    pub tracking_id: TrackingId,
    pub camera_id: CameraId,
}

impl Event {
    pub fn new(
        kind: EventKind,
        event_id: impl Into<EventId>,
        timestamp: i64,
        tracking_id: impl Into<TrackingId>,
        camera_id: impl Into<CameraId>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            kind,
            timestamp,
            tracking_id: tracking_id.into(),
            camera_id: camera_id.into(),
        }
    }

    pub fn enter(
        event_id: impl Into<EventId>,
        timestamp: i64,
        tracking_id: impl Into<TrackingId>,
        camera_id: impl Into<CameraId>,
    ) -> Self {
        Self::new(EventKind::Enter, event_id, timestamp, tracking_id, camera_id)
    }

    pub fn exit(
        event_id: impl Into<EventId>,
        timestamp: i64,
        tracking_id: impl Into<TrackingId>,
        camera_id: impl Into<CameraId>,
    ) -> Self {
        Self::new(EventKind::Exit, event_id, timestamp, tracking_id, camera_id)
    }
}

/// HTTP request body for `/enter_event` and `/exit_event`.
/// The kind comes from the route.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event_id: String,
    pub timestamp: i64,
    pub tracking_id: String,
    pub camera_id: String,
}

impl EventPayload {
    pub fn into_event(self, kind: EventKind) -> Event {
        Event {
            event_id: EventId(self.event_id),
            kind,
            timestamp: self.timestamp,
            tracking_id: TrackingId(self.tracking_id),
            camera_id: CameraId(self.camera_id),
        }
    }
}

/// Camera message as published over MQTT: the event plus its kind.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub event_id: String,
    /// Unix seconds, or an RFC 3339 string
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: TimestampValue,
    pub tracking_id: String,
    pub camera_id: String,
}

/// Timestamp that can be either unix seconds or an RFC 3339 string
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampValue {
    IsoString(String),
    EpochSecs(i64),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map(TimestampValue::EpochSecs)
                .map_err(|_| E::custom("timestamp out of range"))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochSecs(value))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_sorts_before_exit() {
        assert!(EventKind::Enter < EventKind::Exit);
        assert!((10, EventKind::Enter) < (10, EventKind::Exit));
    }

    #[test]
    fn test_payload_into_event() {
        let payload: EventPayload = serde_json::from_str(
            r#"{"event_id":"e1","timestamp":1700000000,"tracking_id":"T","camera_id":"1"}"#,
        )
        .unwrap();
        let event = payload.into_event(EventKind::Exit);
        assert_eq!(event, Event::exit("e1", 1_700_000_000, "T", "1"));
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::enter("e1", 5, "T", "cam");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "enter");
        assert_eq!(json["tracking_id"], "T");
        assert_eq!(json["camera_id"], "cam");
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_camera_message_timestamp_forms() {
        let numeric: CameraMessage = serde_json::from_str(
            r#"{"type":"enter","event_id":"a","timestamp":42,"tracking_id":"T","camera_id":"1"}"#,
        )
        .unwrap();
        assert_eq!(numeric.kind, EventKind::Enter);
        assert_eq!(numeric.timestamp, TimestampValue::EpochSecs(42));

        let iso: CameraMessage = serde_json::from_str(
            r#"{"type":"exit","event_id":"b","timestamp":"2026-01-05T16:41:30+00:00","tracking_id":"T","camera_id":"1"}"#,
        )
        .unwrap();
        assert_eq!(iso.kind, EventKind::Exit);
        assert!(matches!(iso.timestamp, TimestampValue::IsoString(_)));
    }
}
