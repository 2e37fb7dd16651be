//! Prometheus text exposition for `/metrics`
//!
//! Served by the API server in `io::http`; reads a non-resetting snapshot so
//! scraping never disturbs the periodic log report.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; METRICS_NUM_BUCKETS - 1],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, tracked_subjects: usize) -> String {
    let summary = metrics.snapshot(tracked_subjects);
    let mut output = String::with_capacity(4096);

    write_ingest_metrics(&mut output, &summary);
    write_query_metrics(&mut output, &summary);
    write_compile_metrics(&mut output, &summary);
    write_mqtt_metrics(&mut output, &summary);

    output
}

fn write_ingest_metrics(output: &mut String, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP timeline_events_total Events stored, by kind");
    let _ = writeln!(output, "# TYPE timeline_events_total counter");
    let _ = writeln!(output, "timeline_events_total{{kind=\"enter\"}} {}", summary.enter_events_total);
    let _ = writeln!(output, "timeline_events_total{{kind=\"exit\"}} {}", summary.exit_events_total);

    write_metric(
        output,
        "timeline_duplicate_events_total",
        "Re-submitted event ids ignored",
        MetricType::Counter,
        summary.duplicate_events_total,
    );
    write_metric(
        output,
        "timeline_store_errors_total",
        "Event store failures",
        MetricType::Counter,
        summary.store_errors_total,
    );
    write_metric(
        output,
        "timeline_tracked_subjects",
        "Tracking ids with at least one event",
        MetricType::Gauge,
        summary.tracked_subjects as u64,
    );
}

fn write_query_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "timeline_requests_total",
        "Timeline queries",
        MetricType::Counter,
        summary.timeline_requests_total,
    );
    write_metric(
        output,
        "timeline_not_found_total",
        "Timeline queries for unknown tracking ids",
        MetricType::Counter,
        summary.timeline_not_found_total,
    );
    write_metric(
        output,
        "timeline_empty_total",
        "Timeline queries answered with an empty timeline",
        MetricType::Counter,
        summary.timeline_empty_total,
    );
    write_metric(
        output,
        "timeline_cache_hits_total",
        "Compiled timelines served from cache",
        MetricType::Counter,
        summary.cache_hits_total,
    );
    write_metric(
        output,
        "timeline_cache_misses_total",
        "Cache lookups that required a compile",
        MetricType::Counter,
        summary.cache_misses_total,
    );
}

fn write_compile_metrics(output: &mut String, summary: &MetricsSummary) {
    write_histogram(
        output,
        "timeline_compile_latency_us",
        "Timeline compile latency in microseconds",
        &summary.compile_latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.compile_latency_sum_us,
    );
    write_metric(
        output,
        "timeline_compile_latency_p99_us",
        "99th percentile compile latency",
        MetricType::Gauge,
        summary.compile_latency_p99_us,
    );
    write_metric(
        output,
        "timeline_unmatched_events_total",
        "Events left out of any session by compiles",
        MetricType::Counter,
        summary.unmatched_events_total,
    );
}

fn write_mqtt_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "timeline_mqtt_messages_total",
        "Camera events received over MQTT",
        MetricType::Counter,
        summary.mqtt_messages_total,
    );
    write_metric(
        output,
        "timeline_mqtt_invalid_total",
        "MQTT payloads that failed to parse",
        MetricType::Counter,
        summary.mqtt_invalid_total,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::EventKind;
    use crate::services::event_store::RecordOutcome;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_event(EventKind::Enter, RecordOutcome::Recorded);
        metrics.record_event(EventKind::Exit, RecordOutcome::Recorded);
        metrics.record_event(EventKind::Exit, RecordOutcome::Duplicate);
        metrics.record_compile(30, 1);
        metrics.record_compile(900, 0);

        let output = format_prometheus_metrics(&metrics, 3);

        assert!(output.contains("timeline_events_total{kind=\"enter\"} 1"));
        assert!(output.contains("timeline_duplicate_events_total 1"));
        assert!(output.contains("timeline_tracked_subjects 3"));
        assert!(output.contains("timeline_compile_latency_us_bucket{le=\"25\"} 0"));
        assert!(output.contains("timeline_compile_latency_us_bucket{le=\"50\"} 1"));
        assert!(output.contains("timeline_compile_latency_us_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("timeline_compile_latency_us_sum 930"));
        assert!(output.contains("timeline_compile_latency_us_count 2"));
        assert!(output.contains("timeline_unmatched_events_total 1"));
    }

    #[test]
    fn test_scrape_does_not_reset_report() {
        let metrics = Metrics::new();
        metrics.record_compile(500, 0);
        let _ = format_prometheus_metrics(&metrics, 0);
        assert_eq!(metrics.report(0).compile_latency_max_us, 500);
    }
}
