//! Compiled timeline cache keyed by (tracking id, log version)
//!
//! A cached timeline is only served when the event log version it was
//! compiled from is still current. Entries are replaced, never mutated.

use crate::domain::timeline::TimelineEntry;
use crate::domain::types::TrackingId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared, immutable compiled timeline
pub type Timeline = Arc<Vec<TimelineEntry>>;

struct CachedTimeline {
    version: u64,
    timeline: Timeline,
}

pub struct TimelineCache {
    entries: Mutex<FxHashMap<TrackingId, CachedTimeline>>,
    max_entries: usize,
}

impl TimelineCache {
    pub fn new(max_entries: usize) -> Self {
        Self { entries: Mutex::new(FxHashMap::default()), max_entries: max_entries.max(1) }
    }

    /// Cached timeline if it was compiled from exactly `version`
    pub fn get(&self, tracking_id: &TrackingId, version: u64) -> Option<Timeline> {
        let entries = self.entries.lock();
        entries
            .get(tracking_id)
            .filter(|cached| cached.version == version)
            .map(|cached| cached.timeline.clone())
    }

    pub fn insert(&self, tracking_id: TrackingId, version: u64, timeline: Timeline) {
        let mut entries = self.entries.lock();

        // An older snapshot must not overwrite a newer one
        if entries.get(&tracking_id).is_some_and(|cached| cached.version > version) {
            return;
        }

        if entries.len() >= self.max_entries && !entries.contains_key(&tracking_id) {
            debug!(evicted = %entries.len(), "timeline_cache_cleared");
            entries.clear();
        }
        entries.insert(tracking_id, CachedTimeline { version, timeline });
    }

    pub fn invalidate(&self, tracking_id: &TrackingId) {
        self.entries.lock().remove(tracking_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CameraId;

    fn timeline(start: i64) -> Timeline {
        Arc::new(vec![TimelineEntry::new(start, start + 10, CameraId::from("1"))])
    }

    #[test]
    fn test_hit_only_on_matching_version() {
        let cache = TimelineCache::new(16);
        let id = TrackingId::from("T");
        cache.insert(id.clone(), 2, timeline(0));

        assert!(cache.get(&id, 2).is_some());
        assert!(cache.get(&id, 3).is_none());
        assert!(cache.get(&TrackingId::from("other"), 2).is_none());
    }

    #[test]
    fn test_stale_insert_is_ignored() {
        let cache = TimelineCache::new(16);
        let id = TrackingId::from("T");
        cache.insert(id.clone(), 5, timeline(50));
        cache.insert(id.clone(), 4, timeline(40));

        let cached = cache.get(&id, 5).unwrap();
        assert_eq!(cached[0].start_ts, 50);
    }

    #[test]
    fn test_invalidate() {
        let cache = TimelineCache::new(16);
        let id = TrackingId::from("T");
        cache.insert(id.clone(), 1, timeline(0));
        cache.invalidate(&id);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clears_when_full() {
        let cache = TimelineCache::new(2);
        cache.insert(TrackingId::from("a"), 1, timeline(0));
        cache.insert(TrackingId::from("b"), 1, timeline(0));
        assert_eq!(cache.len(), 2);

        // Replacing an existing key does not evict
        cache.insert(TrackingId::from("b"), 2, timeline(0));
        assert_eq!(cache.len(), 2);

        cache.insert(TrackingId::from("c"), 1, timeline(0));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&TrackingId::from("c"), 1).is_some());
    }
}
