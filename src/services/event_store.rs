//! Append-only, idempotent event log keyed by tracking id
//!
//! Writers serialize per tracking id: the outer map is only write-locked to
//! create a new key, and each key's log has its own mutex. Readers copy a
//! point-in-time snapshot under the per-key mutex and never hold it while
//! compiling.

use crate::domain::types::{Event, EventId, TrackingId};
use crate::io::journal::Journal;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Storage failure surfaced unchanged to the caller
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
}

/// Result of recording an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The event id was already stored for this tracking id; nothing changed
    Duplicate,
}

/// Point-in-time copy of one tracking id's events
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    /// Number of events recorded for the tracking id at snapshot time
    pub version: u64,
    /// Events in timestamp order, ties in insertion order
    pub events: Vec<Event>,
}

/// Narrow read/append interface over the event log
pub trait EventLog: Send + Sync {
    /// Insert an event. Re-recording a known event id is a no-op.
    fn record(&self, event: Event) -> Result<RecordOutcome, StoreError>;

    /// All events for a tracking id, or `None` if none was ever recorded
    fn events_for(&self, tracking_id: &TrackingId) -> Result<Option<EventSnapshot>, StoreError>;

    /// Number of tracking ids with at least one event
    fn tracked_subjects(&self) -> usize;
}

/// Events of a single tracking id
#[derive(Default)]
struct TrackLog {
    events: Vec<Event>,
    seen: FxHashSet<EventId>,
    version: u64,
}

impl TrackLog {
    /// True if the event id is already stored
    fn contains(&self, event_id: &EventId) -> bool {
        self.seen.contains(event_id)
    }

    /// Insert after every event with a timestamp <= the new one
    fn insert(&mut self, event: Event) {
        let pos = self.events.partition_point(|e| e.timestamp <= event.timestamp);
        self.seen.insert(event.event_id.clone());
        self.events.insert(pos, event);
        self.version += 1;
    }

    fn snapshot(&self) -> EventSnapshot {
        EventSnapshot { version: self.version, events: self.events.clone() }
    }
}

/// In-memory event store with an optional JSONL journal
#[derive(Default)]
pub struct EventStore {
    logs: RwLock<FxHashMap<TrackingId, Arc<Mutex<TrackLog>>>>,
    /// Tracking ids holding at least one event. A key whose first insert
    /// failed stays in `logs` with version 0 and does not count.
    subjects: AtomicUsize,
    journal: Option<Journal>,
}

impl EventStore {
    /// Create an empty, memory-only store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by a journal file, replaying any existing events
    pub fn open<P: AsRef<Path>>(journal_path: P, fsync: bool) -> Result<Self, StoreError> {
        let journal = Journal::open(journal_path, fsync)?;
        let replayed = journal.replay()?;

        let store = Self::new();
        let mut restored = 0usize;
        for event in replayed {
            if store.insert(event, None)? == RecordOutcome::Recorded {
                restored += 1;
            }
        }

        info!(
            journal = %journal.path().display(),
            events = %restored,
            subjects = %store.tracked_subjects(),
            "event_store_restored"
        );

        Ok(Self { journal: Some(journal), ..store })
    }

    /// Per-key log, created on first use
    fn log_for(&self, tracking_id: &TrackingId) -> Arc<Mutex<TrackLog>> {
        if let Some(log) = self.logs.read().get(tracking_id) {
            return log.clone();
        }
        self.logs.write().entry(tracking_id.clone()).or_default().clone()
    }

    fn insert(&self, event: Event, journal: Option<&Journal>) -> Result<RecordOutcome, StoreError> {
        let log = self.log_for(&event.tracking_id);
        let mut log = log.lock();

        if log.contains(&event.event_id) {
            debug!(
                tracking_id = %event.tracking_id,
                event_id = %event.event_id,
                "event_duplicate_ignored"
            );
            return Ok(RecordOutcome::Duplicate);
        }

        if let Some(journal) = journal {
            if let Err(e) = journal.append(&event) {
                error!(
                    tracking_id = %event.tracking_id,
                    event_id = %event.event_id,
                    error = %e,
                    "journal_append_failed"
                );
                return Err(StoreError::Unavailable(e));
            }
        }

        debug!(
            tracking_id = %event.tracking_id,
            event_id = %event.event_id,
            kind = %event.kind.as_str(),
            camera_id = %event.camera_id,
            timestamp = %event.timestamp,
            "event_recorded"
        );
        if log.version == 0 {
            self.subjects.fetch_add(1, Ordering::Relaxed);
        }
        log.insert(event);
        Ok(RecordOutcome::Recorded)
    }
}

impl EventLog for EventStore {
    fn record(&self, event: Event) -> Result<RecordOutcome, StoreError> {
        self.insert(event, self.journal.as_ref())
    }

    fn events_for(&self, tracking_id: &TrackingId) -> Result<Option<EventSnapshot>, StoreError> {
        let log = self.logs.read().get(tracking_id).cloned();
        Ok(log.map(|log| log.lock().snapshot()).filter(|snapshot| snapshot.version > 0))
    }

    fn tracked_subjects(&self) -> usize {
        self.subjects.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    fn tid(s: &str) -> TrackingId {
        TrackingId::from(s)
    }

    #[test]
    fn test_unknown_tracking_id_is_none() {
        let store = EventStore::new();
        assert!(store.events_for(&tid("nobody")).unwrap().is_none());
        assert_eq!(store.tracked_subjects(), 0);
    }

    #[test]
    fn test_record_is_idempotent() {
        let store = EventStore::new();
        let event = Event::enter("e1", 100, "T", "1");

        assert_eq!(store.record(event.clone()).unwrap(), RecordOutcome::Recorded);
        assert_eq!(store.record(event).unwrap(), RecordOutcome::Duplicate);

        let snapshot = store.events_for(&tid("T")).unwrap().unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_same_event_id_on_other_tracking_id_is_distinct() {
        let store = EventStore::new();
        store.record(Event::enter("e1", 100, "A", "1")).unwrap();
        assert_eq!(
            store.record(Event::enter("e1", 100, "B", "1")).unwrap(),
            RecordOutcome::Recorded
        );
        assert_eq!(store.tracked_subjects(), 2);
    }

    #[test]
    fn test_events_ordered_by_timestamp_then_insertion() {
        let store = EventStore::new();
        store.record(Event::exit("late", 130, "T", "1")).unwrap();
        store.record(Event::enter("first_at_100", 100, "T", "1")).unwrap();
        store.record(Event::enter("second_at_100", 100, "T", "2")).unwrap();
        store.record(Event::enter("early", 50, "T", "3")).unwrap();

        let ids: Vec<String> = store
            .events_for(&tid("T"))
            .unwrap()
            .unwrap()
            .events
            .into_iter()
            .map(|e| e.event_id.0)
            .collect();
        assert_eq!(ids, vec!["early", "first_at_100", "second_at_100", "late"]);
    }

    #[test]
    fn test_version_tracks_recorded_events() {
        let store = EventStore::new();
        store.record(Event::enter("a", 1, "T", "1")).unwrap();
        let v1 = store.events_for(&tid("T")).unwrap().unwrap().version;
        store.record(Event::enter("a", 1, "T", "1")).unwrap();
        let v2 = store.events_for(&tid("T")).unwrap().unwrap().version;
        store.record(Event::exit("b", 2, "T", "1")).unwrap();
        let v3 = store.events_for(&tid("T")).unwrap().unwrap().version;
        assert_eq!((v1, v2, v3), (1, 1, 2));
    }

    #[test]
    fn test_concurrent_records() {
        let store = Arc::new(EventStore::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        // distinct ids per worker, plus one id shared by everyone
                        store.record(Event::enter(format!("w{worker}-{i}"), i, "T", "1")).unwrap();
                        store.record(Event::enter("shared", 0, "T", "1")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.events_for(&tid("T")).unwrap().unwrap();
        assert_eq!(snapshot.events.len(), 8 * 100 + 1);
        assert_eq!(snapshot.version, 801);
    }

    #[test]
    fn test_journal_roundtrip_restores_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        {
            let store = EventStore::open(&path, false).unwrap();
            store.record(Event::enter("e1", 100, "T", "1")).unwrap();
            store.record(Event::exit("e2", 130, "T", "1")).unwrap();
            store.record(Event::exit("e2", 130, "T", "1")).unwrap();
        }

        let restored = EventStore::open(&path, false).unwrap();
        let snapshot = restored.events_for(&tid("T")).unwrap().unwrap();
        assert_eq!(snapshot.events.len(), 2);

        // Replayed ids still deduplicate
        assert_eq!(
            restored.record(Event::enter("e1", 100, "T", "1")).unwrap(),
            RecordOutcome::Duplicate
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_first_record_leaves_id_unknown() {
        // every write to /dev/full fails with ENOSPC
        let store = EventStore {
            journal: Some(Journal::open("/dev/full", false).unwrap()),
            ..EventStore::new()
        };

        assert!(matches!(
            store.record(Event::enter("e1", 100, "NEW", "1")),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.events_for(&tid("NEW")).unwrap().is_none());
        assert_eq!(store.tracked_subjects(), 0);

        // the failed event was not marked as seen
        assert!(matches!(
            store.record(Event::enter("e1", 100, "NEW", "1")),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_tracked_subjects_counts_ids_with_events() {
        let store = EventStore::new();
        store.record(Event::enter("a", 1, "A", "1")).unwrap();
        store.record(Event::exit("b", 2, "A", "1")).unwrap();
        store.record(Event::enter("c", 1, "B", "1")).unwrap();
        assert_eq!(store.tracked_subjects(), 2);
    }
}
