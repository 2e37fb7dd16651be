//! Services - business logic and state management
//!
//! - `event_store` - Append-only, idempotent event log per tracking id
//! - `compiler` - Pure enter/exit events -> timeline compilation
//! - `timeline_cache` - Version-keyed cache of compiled timelines
//! - `timeline_service` - Ingestion and query operations

pub mod compiler;
pub mod event_store;
pub mod timeline_cache;
pub mod timeline_service;

// Re-export commonly used types
pub use event_store::{EventLog, EventStore, RecordOutcome, StoreError};
pub use timeline_service::{TimelineLookup, TimelineService};
