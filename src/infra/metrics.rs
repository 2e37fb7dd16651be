//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Counters are monotonic except the few "since last report" values that
//! the periodic reporter swaps to zero.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use crate::domain::types::EventKind;
use crate::services::event_store::RecordOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for compile latency (microseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Upper bounds used for percentile estimates (last bucket uses 2x the previous bound)
const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
    [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets.
/// Returns the upper bound of the bucket containing the percentile.
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Enter events stored (monotonic)
    enter_events_total: AtomicU64,
    /// Exit events stored (monotonic)
    exit_events_total: AtomicU64,
    /// Re-submitted event ids (monotonic)
    duplicate_events_total: AtomicU64,
    /// Events stored since last report (reset on report)
    events_since_report: AtomicU64,
    /// Store failures (monotonic)
    store_errors_total: AtomicU64,
    /// Timeline queries (monotonic)
    timeline_requests_total: AtomicU64,
    /// Queries for unknown tracking ids (monotonic)
    timeline_not_found_total: AtomicU64,
    /// Queries answered with an empty timeline (monotonic)
    timeline_empty_total: AtomicU64,
    /// Events left out of any session by compiles (monotonic)
    unmatched_events_total: AtomicU64,
    /// Timelines compiled (monotonic)
    compiles_total: AtomicU64,
    /// Sum of compile latencies in microseconds (monotonic)
    compile_latency_sum_us: AtomicU64,
    /// Max compile latency (reset on report)
    compile_latency_max_us: AtomicU64,
    /// Compile latency histogram buckets (monotonic)
    compile_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    cache_hits_total: AtomicU64,
    cache_misses_total: AtomicU64,
    /// MQTT camera messages received (monotonic)
    mqtt_messages_total: AtomicU64,
    /// MQTT payloads that did not parse (monotonic)
    mqtt_invalid_total: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            enter_events_total: AtomicU64::new(0),
            exit_events_total: AtomicU64::new(0),
            duplicate_events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
            timeline_requests_total: AtomicU64::new(0),
            timeline_not_found_total: AtomicU64::new(0),
            timeline_empty_total: AtomicU64::new(0),
            unmatched_events_total: AtomicU64::new(0),
            compiles_total: AtomicU64::new(0),
            compile_latency_sum_us: AtomicU64::new(0),
            compile_latency_max_us: AtomicU64::new(0),
            compile_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            cache_hits_total: AtomicU64::new(0),
            cache_misses_total: AtomicU64::new(0),
            mqtt_messages_total: AtomicU64::new(0),
            mqtt_invalid_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record the outcome of an ingestion call
    #[inline]
    pub fn record_event(&self, kind: EventKind, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Duplicate => {
                self.duplicate_events_total.fetch_add(1, Ordering::Relaxed);
            }
            RecordOutcome::Recorded => {
                let counter = match kind {
                    EventKind::Enter => &self.enter_events_total,
                    EventKind::Exit => &self.exit_events_total,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.events_since_report.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn record_store_error(&self) {
        self.store_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timeline query; `entries` is `None` for an unknown tracking id
    #[inline]
    pub fn record_timeline_request(&self, entries: Option<usize>) {
        self.timeline_requests_total.fetch_add(1, Ordering::Relaxed);
        match entries {
            None => {
                self.timeline_not_found_total.fetch_add(1, Ordering::Relaxed);
            }
            Some(0) => {
                self.timeline_empty_total.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {}
        }
    }

    /// Record one compile pass (lock-free)
    #[inline]
    pub fn record_compile(&self, latency_us: u64, unmatched_events: usize) {
        self.compiles_total.fetch_add(1, Ordering::Relaxed);
        self.compile_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.compile_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.compile_latency_max_us, latency_us);
        self.unmatched_events_total.fetch_add(unmatched_events as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cache_hit(&self) {
        self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cache_miss(&self) {
        self.cache_misses_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_mqtt_message(&self) {
        self.mqtt_messages_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_mqtt_invalid(&self) {
        self.mqtt_invalid_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total events stored (enter + exit)
    #[inline]
    pub fn events_total(&self) -> u64 {
        self.enter_events_total.load(Ordering::Relaxed)
            + self.exit_events_total.load(Ordering::Relaxed)
    }

    /// Periodic report: swaps the interval counters to zero
    pub fn report(&self, tracked_subjects: usize) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let compile_max = self.compile_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        self.summary(tracked_subjects, events_per_sec, compile_max)
    }

    /// Point-in-time view for scraping; resets nothing
    pub fn snapshot(&self, tracked_subjects: usize) -> MetricsSummary {
        let compile_max = self.compile_latency_max_us.load(Ordering::Relaxed);
        self.summary(tracked_subjects, 0.0, compile_max)
    }

    fn summary(
        &self,
        tracked_subjects: usize,
        events_per_sec: f64,
        compile_latency_max_us: u64,
    ) -> MetricsSummary {
        let compile_latency_buckets = load_buckets(&self.compile_latency_buckets);
        let compiles_total = self.compiles_total.load(Ordering::Relaxed);
        let compile_latency_sum_us = self.compile_latency_sum_us.load(Ordering::Relaxed);
        let compile_latency_avg_us =
            if compiles_total > 0 { compile_latency_sum_us / compiles_total } else { 0 };

        MetricsSummary {
            enter_events_total: self.enter_events_total.load(Ordering::Relaxed),
            exit_events_total: self.exit_events_total.load(Ordering::Relaxed),
            duplicate_events_total: self.duplicate_events_total.load(Ordering::Relaxed),
            events_per_sec,
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            timeline_requests_total: self.timeline_requests_total.load(Ordering::Relaxed),
            timeline_not_found_total: self.timeline_not_found_total.load(Ordering::Relaxed),
            timeline_empty_total: self.timeline_empty_total.load(Ordering::Relaxed),
            unmatched_events_total: self.unmatched_events_total.load(Ordering::Relaxed),
            compiles_total,
            compile_latency_buckets,
            compile_latency_sum_us,
            compile_latency_avg_us,
            compile_latency_max_us,
            compile_latency_p50_us: percentile_from_buckets(&compile_latency_buckets, 0.50),
            compile_latency_p99_us: percentile_from_buckets(&compile_latency_buckets, 0.99),
            cache_hits_total: self.cache_hits_total.load(Ordering::Relaxed),
            cache_misses_total: self.cache_misses_total.load(Ordering::Relaxed),
            mqtt_messages_total: self.mqtt_messages_total.load(Ordering::Relaxed),
            mqtt_invalid_total: self.mqtt_invalid_total.load(Ordering::Relaxed),
            tracked_subjects,
        }
    }
}

/// Summary of metrics for logging and exposition
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub enter_events_total: u64,
    pub exit_events_total: u64,
    pub duplicate_events_total: u64,
    /// Stored events per second since the previous report (0 for snapshots)
    pub events_per_sec: f64,
    pub store_errors_total: u64,
    pub timeline_requests_total: u64,
    pub timeline_not_found_total: u64,
    pub timeline_empty_total: u64,
    pub unmatched_events_total: u64,
    pub compiles_total: u64,
    /// Compile latency histogram buckets (cumulative since start)
    /// Bounds: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800 µs
    pub compile_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub compile_latency_sum_us: u64,
    pub compile_latency_avg_us: u64,
    pub compile_latency_max_us: u64,
    pub compile_latency_p50_us: u64,
    pub compile_latency_p99_us: u64,
    pub cache_hits_total: u64,
    pub cache_misses_total: u64,
    pub mqtt_messages_total: u64,
    pub mqtt_invalid_total: u64,
    pub tracked_subjects: usize,
}

impl MetricsSummary {
    pub fn events_total(&self) -> u64 {
        self.enter_events_total + self.exit_events_total
    }

    pub fn log(&self) {
        info!(
            events_total = %self.events_total(),
            events_per_sec = format!("{:.1}", self.events_per_sec),
            duplicates = %self.duplicate_events_total,
            tracked_subjects = %self.tracked_subjects,
            timeline_requests = %self.timeline_requests_total,
            not_found = %self.timeline_not_found_total,
            compiles = %self.compiles_total,
            compile_p99_us = %self.compile_latency_p99_us,
            compile_max_us = %self.compile_latency_max_us,
            cache_hits = %self.cache_hits_total,
            store_errors = %self.store_errors_total,
            "metrics"
        );
    }
}
