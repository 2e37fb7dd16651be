//! Event journal - append-only JSONL mirror of accepted events
//!
//! Each accepted event is written as one JSON object per line before it
//! becomes visible in the in-memory store. On startup the journal is
//! replayed to rebuild the store.

use crate::domain::types::Event;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Append-only writer for recorded events
pub struct Journal {
    file_path: PathBuf,
    file: Mutex<File>,
    fsync: bool,
}

impl Journal {
    /// Open (or create) the journal file in append mode
    pub fn open<P: AsRef<Path>>(path: P, fsync: bool) -> io::Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(file_path = %path.display(), fsync = %fsync, "journal_opened");

        Ok(Self { file_path: path.to_path_buf(), file: Mutex::new(file), fsync })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Read back every event in the journal, in write order.
    /// Lines that do not parse are skipped.
    pub fn replay(&self) -> io::Result<Vec<Event>> {
        let file = File::open(&self.file_path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped += 1;
                    warn!(line = %(line_no + 1), error = %e, "journal_line_skipped");
                }
            }
        }

        info!(
            file_path = %self.file_path.display(),
            events = %events.len(),
            skipped = %skipped,
            "journal_replayed"
        );
        Ok(events)
    }

    /// Append one event. Returns once the line is handed to the OS
    /// (or synced to disk when fsync is enabled).
    pub fn append(&self, event: &Event) -> io::Result<()> {
        let line = serde_json::to_string(event).map_err(io::Error::other)?;

        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        file.flush()?;
        if self.fsync {
            file.sync_data()?;
        }
        debug!(event_id = %event.event_id, bytes = %line.len(), "journal_written");

        Ok(())
    }
}
