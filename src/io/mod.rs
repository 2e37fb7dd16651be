//! IO modules - external system interfaces
//!
//! - `http` - Timeline HTTP API (hyper)
//! - `mqtt` - MQTT ingestion of camera events
//! - `journal` - JSONL event journal backing the store
//! - `prometheus` - Prometheus text formatting for `/metrics`

pub mod http;
pub mod journal;
pub mod mqtt;
pub mod prometheus;

// Re-export commonly used types
pub use http::{serve, start_api_server, ApiState};
pub use mqtt::start_mqtt_ingest;
