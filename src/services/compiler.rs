//! Timeline compiler: raw enter/exit events -> presence timeline
//!
//! Two steps, both pure:
//! 1. `pair_sessions` matches enter/exit events per camera into sessions.
//! 2. `merge_sessions` sweeps the sessions and labels every second with the
//!    cameras observing the subject, coalescing runs with the same cameras.
//!
//! Merge rules, for the current entry `C` and the next session `S` in
//! (start, end) order:
//! - gap (`S.start > C.end + 1`): separate entries
//! - same camera touching or overlapping: one entry spanning both
//! - different camera sharing instants with `C`: `C` is cut before the
//!   first shared instant, the shared window becomes a joint entry listing
//!   both cameras, and `S` resumes after it
//! - different camera exactly adjacent (`S.start == C.end + 1`): separate entries

use crate::domain::timeline::{CameraIds, Session, TimelineEntry};
use crate::domain::types::{CameraId, Event, EventKind};
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use tracing::trace;

/// Output of the pairing step
#[derive(Debug, Default)]
pub struct Pairing {
    /// Sessions in merge order
    pub sessions: Vec<Session>,
    /// Enters superseded by a later enter, or never closed
    pub unmatched_enters: usize,
    /// Exits with no open enter on their camera
    pub unmatched_exits: usize,
}

impl Pairing {
    pub fn unmatched(&self) -> usize {
        self.unmatched_enters + self.unmatched_exits
    }
}

/// Compile the timeline for one tracking id. Never fails.
pub fn compile(events: &[Event]) -> Vec<TimelineEntry> {
    merge_sessions(&pair_sessions(events).sessions)
}

/// Pair enter/exit events into per-camera sessions.
///
/// Within a camera, events are taken in timestamp order. At most one enter
/// is open per camera: a second enter replaces the first, an exit closes the
/// open enter, and an exit with nothing open is dropped. At equal timestamps
/// enters go before exits, except that an enter still open from an earlier
/// instant is closed by the first exit before the instant's own enters open.
pub fn pair_sessions(events: &[Event]) -> Pairing {
    let mut by_camera: FxHashMap<&CameraId, Vec<&Event>> = FxHashMap::default();
    for event in events {
        by_camera.entry(&event.camera_id).or_default().push(event);
    }

    let mut pairing = Pairing { sessions: Vec::with_capacity(events.len() / 2), ..Default::default() };

    for (camera_id, mut camera_events) in by_camera {
        // stable: equal (timestamp, kind) keep insertion order
        camera_events.sort_by_key(|e| (e.timestamp, e.kind));

        let mut open: Option<&Event> = None;
        let mut i = 0;
        while i < camera_events.len() {
            let ts = camera_events[i].timestamp;
            let end = i + camera_events[i..].partition_point(|e| e.timestamp == ts);
            let group = &camera_events[i..end];
            let split = group.partition_point(|e| e.kind == EventKind::Enter);
            let mut exits = group[split..].iter();

            // An enter left open by an earlier instant is closed first
            if let Some(enter) = open {
                if let Some(exit) = exits.next() {
                    pairing.sessions.push(Session::from_pair(
                        camera_id.clone(),
                        enter.timestamp,
                        exit.timestamp,
                    ));
                    open = None;
                }
            }

            // then every enter of this instant, each replacing the last
            for &enter in &group[..split] {
                if let Some(dropped) = open.replace(enter) {
                    trace!(camera_id = %camera_id, event_id = %dropped.event_id, "enter_superseded");
                    pairing.unmatched_enters += 1;
                }
            }

            for exit in exits {
                match open.take() {
                    Some(enter) => pairing.sessions.push(Session::from_pair(
                        camera_id.clone(),
                        enter.timestamp,
                        exit.timestamp,
                    )),
                    None => {
                        trace!(camera_id = %camera_id, event_id = %exit.event_id, "exit_unmatched");
                        pairing.unmatched_exits += 1;
                    }
                }
            }
            i = end;
        }

        if let Some(dangling) = open {
            trace!(camera_id = %camera_id, event_id = %dangling.event_id, "enter_unclosed");
            pairing.unmatched_enters += 1;
        }
    }

    pairing.sessions.sort_by(Session::merge_order);
    pairing
}

/// Merge sessions from any number of cameras into an ordered timeline
pub fn merge_sessions(sessions: &[Session]) -> Vec<TimelineEntry> {
    if sessions.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&Session> = sessions.iter().collect();
    sorted.sort_by(|a, b| a.merge_order(b));

    // Every point where the set of observing cameras can change.
    // i128 so that `end + 1` cannot overflow.
    let mut bounds: Vec<i128> = Vec::with_capacity(sorted.len() * 2);
    for session in &sorted {
        bounds.push(i128::from(session.start_ts));
        bounds.push(i128::from(session.end_ts) + 1);
    }
    bounds.sort_unstable();
    bounds.dedup();

    let mut entries: Vec<TimelineEntry> = Vec::with_capacity(sorted.len());

    // Sessions covering the current window, by merge-order index
    let mut active: BTreeSet<usize> = BTreeSet::new();
    let mut expiring: BinaryHeap<Reverse<(i64, usize)>> = BinaryHeap::new();
    let mut next = 0;

    for window in bounds.windows(2) {
        // No session starts or ends strictly inside [from, to]
        let from = window[0] as i64;
        let to = (window[1] - 1) as i64;

        while next < sorted.len() && sorted[next].start_ts <= from {
            active.insert(next);
            expiring.push(Reverse((sorted[next].end_ts, next)));
            next += 1;
        }
        while let Some(&Reverse((end_ts, idx))) = expiring.peek() {
            if end_ts >= from {
                break;
            }
            expiring.pop();
            active.remove(&idx);
        }

        // merge order, first session per camera wins
        let mut cameras = CameraIds::new();
        for &idx in &active {
            let camera_id = &sorted[idx].camera_id;
            if !cameras.contains(camera_id) {
                cameras.push(camera_id.clone());
            }
        }
        if cameras.is_empty() {
            continue;
        }

        match entries.last_mut() {
            // last.end_ts < from, so the + 1 cannot overflow
            Some(last) if last.end_ts + 1 == from && last.has_same_cameras(&cameras) => {
                last.end_ts = to;
            }
            _ => entries.push(TimelineEntry { start_ts: from, end_ts: to, camera_ids: cameras }),
        }
    }

    entries
}
