//! Derived timeline model: per-camera sessions and merged timeline entries

use crate::domain::types::CameraId;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use std::cmp::Ordering;

/// Camera ids attached to a timeline entry, in first-contribution order.
/// Two inline slots cover the single-camera and handoff cases.
pub type CameraIds = SmallVec<[CameraId; 2]>;

/// A matched enter/exit pair for one camera. Always `start_ts <= end_ts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub camera_id: CameraId,
    pub start_ts: i64,
    pub end_ts: i64,
}

impl Session {
    /// Build a session from an enter and exit timestamp in either order
    pub fn from_pair(camera_id: CameraId, enter_ts: i64, exit_ts: i64) -> Self {
        Self { camera_id, start_ts: enter_ts.min(exit_ts), end_ts: enter_ts.max(exit_ts) }
    }

    /// Merge order: start, then end, then camera id
    pub fn merge_order(&self, other: &Self) -> Ordering {
        self.start_ts
            .cmp(&other.start_ts)
            .then(self.end_ts.cmp(&other.end_ts))
            .then_with(|| self.camera_id.cmp(&other.camera_id))
    }
}

/// One interval of a compiled timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub start_ts: i64,
    pub end_ts: i64,
    pub camera_ids: CameraIds,
}

impl TimelineEntry {
    pub fn new(start_ts: i64, end_ts: i64, camera_id: CameraId) -> Self {
        Self { start_ts, end_ts, camera_ids: smallvec![camera_id] }
    }

    /// True if both entries are labelled by the same set of cameras
    pub fn has_same_cameras(&self, cameras: &[CameraId]) -> bool {
        self.camera_ids.len() == cameras.len()
            && cameras.iter().all(|c| self.camera_ids.contains(c))
    }
}
