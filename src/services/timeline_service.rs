//! Timeline service - ingestion and query operations over an event log
//!
//! Compiles on read from a snapshot of the tracking id's events. Compiled
//! timelines are cached per (tracking id, log version), so a cached result is
//! never older than the log it is served for.

use crate::domain::types::{CameraId, Event, EventId, EventKind, TrackingId};
use crate::infra::metrics::Metrics;
use crate::services::compiler::{merge_sessions, pair_sessions};
use crate::services::event_store::{EventLog, RecordOutcome, StoreError};
use crate::services::timeline_cache::{Timeline, TimelineCache};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of a timeline query
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineLookup {
    /// No event was ever recorded for the tracking id
    NotFound,
    /// Compiled timeline; may be empty when no event pairs into a session
    Found(Timeline),
}

pub struct TimelineService<L: EventLog> {
    log: Arc<L>,
    cache: Option<TimelineCache>,
    metrics: Arc<Metrics>,
}

impl<L: EventLog> TimelineService<L> {
    pub fn new(log: Arc<L>, metrics: Arc<Metrics>) -> Self {
        Self { log, cache: None, metrics }
    }

    /// Enable the compiled-timeline cache
    pub fn with_cache(mut self, max_entries: usize) -> Self {
        self.cache = Some(TimelineCache::new(max_entries));
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn tracked_subjects(&self) -> usize {
        self.log.tracked_subjects()
    }

    pub fn record_enter(
        &self,
        event_id: EventId,
        timestamp: i64,
        tracking_id: TrackingId,
        camera_id: CameraId,
    ) -> Result<RecordOutcome, StoreError> {
        self.record(Event::enter(event_id, timestamp, tracking_id, camera_id))
    }

    pub fn record_exit(
        &self,
        event_id: EventId,
        timestamp: i64,
        tracking_id: TrackingId,
        camera_id: CameraId,
    ) -> Result<RecordOutcome, StoreError> {
        self.record(Event::exit(event_id, timestamp, tracking_id, camera_id))
    }

    /// Record an event of either kind. Duplicates succeed without effect.
    pub fn record(&self, event: Event) -> Result<RecordOutcome, StoreError> {
        let kind: EventKind = event.kind;
        let tracking_id = event.tracking_id.clone();

        match self.log.record(event) {
            Ok(outcome) => {
                self.metrics.record_event(kind, outcome);
                if outcome == RecordOutcome::Recorded {
                    if let Some(cache) = &self.cache {
                        cache.invalidate(&tracking_id);
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                self.metrics.record_store_error();
                warn!(tracking_id = %tracking_id, error = %e, "event_record_failed");
                Err(e)
            }
        }
    }

    /// Compiled timeline for a tracking id
    pub fn get_timeline(&self, tracking_id: &TrackingId) -> Result<TimelineLookup, StoreError> {
        let snapshot = match self.log.events_for(tracking_id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.metrics.record_timeline_request(None);
                debug!(tracking_id = %tracking_id, "timeline_not_found");
                return Ok(TimelineLookup::NotFound);
            }
            Err(e) => {
                self.metrics.record_store_error();
                warn!(tracking_id = %tracking_id, error = %e, "timeline_read_failed");
                return Err(e);
            }
        };

        if let Some(cache) = &self.cache {
            if let Some(timeline) = cache.get(tracking_id, snapshot.version) {
                self.metrics.record_cache_hit();
                self.metrics.record_timeline_request(Some(timeline.len()));
                return Ok(TimelineLookup::Found(timeline));
            }
            self.metrics.record_cache_miss();
        }

        let started = Instant::now();
        let pairing = pair_sessions(&snapshot.events);
        let timeline: Timeline = Arc::new(merge_sessions(&pairing.sessions));
        let latency_us = started.elapsed().as_micros() as u64;

        self.metrics.record_compile(latency_us, pairing.unmatched());
        self.metrics.record_timeline_request(Some(timeline.len()));
        debug!(
            tracking_id = %tracking_id,
            events = %snapshot.events.len(),
            sessions = %pairing.sessions.len(),
            entries = %timeline.len(),
            unmatched_enters = %pairing.unmatched_enters,
            unmatched_exits = %pairing.unmatched_exits,
            latency_us = %latency_us,
            "timeline_compiled"
        );

        if let Some(cache) = &self.cache {
            cache.insert(tracking_id.clone(), snapshot.version, timeline.clone());
        }
        Ok(TimelineLookup::Found(timeline))
    }
}
