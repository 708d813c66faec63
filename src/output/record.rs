//! Thread-safe, append-only record of captured lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use super::line::{CapturedLine, StreamKind};

/// Ordered log of captured lines split into an output set and an error set.
///
/// Entries are keyed by a per-record sequence number taken at insertion, so
/// two lines arriving within the same clock tick still have a total order.
/// Sequence numbers and timestamps are assigned together, so timestamps
/// never decrease in sequence order. Error lines land in both sets under
/// the same key.
#[derive(Debug, Default)]
pub struct CaptureRecord {
    clock: Mutex<Clock>,
    output: RwLock<BTreeMap<u64, CapturedLine>>,
    errors: RwLock<BTreeMap<u64, CapturedLine>>,
}

/// Source of sequence numbers and timestamps.
#[derive(Debug, Default)]
struct Clock {
    next_seq: u64,
    last: Option<DateTime<Utc>>,
}

impl Clock {
    /// Next sequence number and a timestamp no earlier than the last one,
    /// even if the system clock steps back.
    fn tick(&mut self) -> (u64, DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let now = Utc::now();
        let at = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(at);
        (seq, at)
    }
}

impl CaptureRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line. Empty lines are dropped and `None` is returned.
    pub fn push(&self, stream: StreamKind, text: &str) -> Option<CapturedLine> {
        if text.is_empty() {
            return None;
        }

        let (seq, at) = self.clock.lock().tick();

        let line = CapturedLine {
            seq,
            at,
            text: text.to_string(),
            stream,
        };

        if stream == StreamKind::Stderr {
            self.errors.write().insert(line.seq, line.clone());
        }
        self.output.write().insert(line.seq, line.clone());

        Some(line)
    }

    /// Snapshot of every line, stderr included, in arrival order.
    pub fn output(&self) -> Vec<CapturedLine> {
        self.output.read().values().cloned().collect()
    }

    /// Snapshot of stderr lines in arrival order.
    pub fn errors(&self) -> Vec<CapturedLine> {
        self.errors.read().values().cloned().collect()
    }

    /// Number of lines in the output set.
    pub fn len(&self) -> usize {
        self.output.read().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.output.read().is_empty()
    }

    /// Whether any stderr line has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.read().is_empty()
    }
}
