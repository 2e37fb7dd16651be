//! End-to-end timeline scenarios through the service layer

use std::sync::Arc;
use std::thread;
use timeline_api::domain::{CameraId, Event, TimelineEntry, TrackingId};
use timeline_api::infra::Metrics;
use timeline_api::services::{EventStore, RecordOutcome, TimelineLookup, TimelineService};

const T: i64 = 1_700_000_000;

/// Submits events for one tracking id with generated event ids
struct Subject {
    service: TimelineService<EventStore>,
    tracking_id: TrackingId,
    next_event: usize,
}

impl Subject {
    fn new() -> Self {
        Self::with_service(TimelineService::new(
            Arc::new(EventStore::new()),
            Arc::new(Metrics::new()),
        ))
    }

    fn with_service(service: TimelineService<EventStore>) -> Self {
        Self { service, tracking_id: TrackingId::from("T"), next_event: 0 }
    }

    fn event_id(&mut self) -> String {
        self.next_event += 1;
        format!("ev-{}", self.next_event)
    }

    fn enter(&mut self, ts: i64, camera: &str) -> &mut Self {
        let id = self.event_id();
        self.service
            .record_enter(id.into(), ts, self.tracking_id.clone(), camera.into())
            .unwrap();
        self
    }

    fn exit(&mut self, ts: i64, camera: &str) -> &mut Self {
        let id = self.event_id();
        self.service
            .record_exit(id.into(), ts, self.tracking_id.clone(), camera.into())
            .unwrap();
        self
    }

    fn visit(&mut self, camera: &str, start: i64, end: i64) -> &mut Self {
        self.enter(start, camera).exit(end, camera)
    }

    fn timeline(&self) -> Vec<TimelineEntry> {
        match self.service.get_timeline(&self.tracking_id).unwrap() {
            TimelineLookup::Found(timeline) => timeline.as_ref().clone(),
            TimelineLookup::NotFound => panic!("tracking id should be known"),
        }
    }
}

fn entry(start_ts: i64, end_ts: i64, cameras: &[&str]) -> TimelineEntry {
    TimelineEntry {
        start_ts,
        end_ts,
        camera_ids: cameras.iter().map(|c| CameraId::from(*c)).collect(),
    }
}

#[test]
fn test_simple_visit() {
    let mut subject = Subject::new();
    subject.visit("1", T, T + 30);
    assert_eq!(subject.timeline(), vec![entry(T, T + 30, &["1"])]);
}

#[test]
fn test_unmatched_cameras_give_known_empty_timeline() {
    let mut subject = Subject::new();
    subject.enter(T, "1").exit(T + 30, "2");
    assert_eq!(subject.timeline(), vec![]);
}

#[test]
fn test_dangling_enters_give_known_empty_timeline() {
    let mut subject = Subject::new();
    subject.enter(T, "1").enter(T + 10, "2");
    assert_eq!(subject.timeline(), vec![]);
}

#[test]
fn test_gap_keeps_entries_apart() {
    let mut subject = Subject::new();
    subject.visit("1", T, T + 30).visit("2", T + 35, T + 50);
    assert_eq!(subject.timeline(), vec![entry(T, T + 30, &["1"]), entry(T + 35, T + 50, &["2"])]);
}

#[test]
fn test_one_second_handoff() {
    let mut subject = Subject::new();
    subject.visit("1", T, T + 30).visit("2", T + 30, T + 45);
    assert_eq!(
        subject.timeline(),
        vec![
            entry(T, T + 29, &["1"]),
            entry(T + 30, T + 30, &["1", "2"]),
            entry(T + 31, T + 45, &["2"]),
        ]
    );
}

#[test]
fn test_same_camera_reentry_at_exit_instant_joins() {
    let mut subject = Subject::new();
    subject.visit("1", T, T + 30).visit("1", T + 30, T + 45);
    assert_eq!(subject.timeline(), vec![entry(T, T + 45, &["1"])]);
}

#[test]
fn test_three_cameras() {
    let mut subject = Subject::new();
    subject.visit("2", T, T + 30).visit("3", T + 20, T + 45).visit("5", T + 46, T + 50);
    assert_eq!(
        subject.timeline(),
        vec![
            entry(T, T + 19, &["2"]),
            entry(T + 20, T + 30, &["2", "3"]),
            entry(T + 31, T + 45, &["3"]),
            entry(T + 46, T + 50, &["5"]),
        ]
    );
}

#[test]
fn test_unknown_tracking_id_is_not_found() {
    let subject = Subject::new();
    assert_eq!(
        subject.service.get_timeline(&TrackingId::from("ghost")).unwrap(),
        TimelineLookup::NotFound
    );
}

#[test]
fn test_resubmitting_every_event_changes_nothing() {
    let store = Arc::new(EventStore::new());
    let service = TimelineService::new(store, Arc::new(Metrics::new()));
    let events = vec![
        Event::enter("a", T, "T", "1"),
        Event::exit("b", T + 30, "T", "1"),
        Event::enter("c", T + 30, "T", "2"),
        Event::exit("d", T + 45, "T", "2"),
    ];

    for event in &events {
        assert_eq!(service.record(event.clone()).unwrap(), RecordOutcome::Recorded);
    }
    let before = service.get_timeline(&TrackingId::from("T")).unwrap();

    for event in &events {
        assert_eq!(service.record(event.clone()).unwrap(), RecordOutcome::Duplicate);
    }
    assert_eq!(service.get_timeline(&TrackingId::from("T")).unwrap(), before);
}

#[test]
fn test_submission_order_does_not_matter() {
    let events = vec![
        Event::enter("a", T, "T", "1"),
        Event::exit("b", T + 30, "T", "1"),
        Event::enter("c", T + 20, "T", "2"),
        Event::exit("d", T + 40, "T", "2"),
        Event::enter("e", T + 60, "T", "1"),
        Event::exit("f", T + 70, "T", "1"),
    ];

    let compile_in = |order: &[usize]| {
        let service = TimelineService::new(Arc::new(EventStore::new()), Arc::new(Metrics::new()));
        for &i in order {
            service.record(events[i].clone()).unwrap();
        }
        service.get_timeline(&TrackingId::from("T")).unwrap()
    };

    let forward = compile_in(&[0, 1, 2, 3, 4, 5]);
    assert_eq!(forward, compile_in(&[5, 4, 3, 2, 1, 0]));
    assert_eq!(forward, compile_in(&[3, 0, 5, 1, 4, 2]));
}

#[test]
fn test_concurrent_ingest_is_fully_visible() {
    let service = Arc::new(
        TimelineService::new(Arc::new(EventStore::new()), Arc::new(Metrics::new())).with_cache(8),
    );

    let handles: Vec<_> = (0..4)
        .map(|camera| {
            let service = service.clone();
            thread::spawn(move || {
                let cam = format!("cam{camera}");
                for visit in 0..25i64 {
                    let start = T + visit * 100;
                    service
                        .record(Event::enter(format!("{cam}-in-{visit}"), start, "T", cam.as_str()))
                        .unwrap();
                    service
                        .record(Event::exit(format!("{cam}-out-{visit}"), start + 10, "T", cam.as_str()))
                        .unwrap();
                    // interleave reads with writes
                    service.get_timeline(&TrackingId::from("T")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let TimelineLookup::Found(timeline) = service.get_timeline(&TrackingId::from("T")).unwrap()
    else {
        panic!("tracking id should be known");
    };
    // every camera watched the same 25 windows
    assert_eq!(timeline.len(), 25);
    for (visit, entry) in timeline.iter().enumerate() {
        let start = T + visit as i64 * 100;
        assert_eq!((entry.start_ts, entry.end_ts), (start, start + 10));
        assert_eq!(entry.camera_ids.len(), 4);
    }
}
