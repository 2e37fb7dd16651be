//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Event` - an enter/exit observation of a tracked subject by one camera
//! - `TrackingId`, `CameraId`, `EventId` - typed identifiers
//! - `Session` - a matched enter/exit pair for one camera
//! - `TimelineEntry` - an interval of the compiled presence timeline

pub mod timeline;
pub mod types;

pub use timeline::{CameraIds, Session, TimelineEntry};
pub use types::{CameraId, Event, EventId, EventKind, EventPayload, TrackingId};
