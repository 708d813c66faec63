//! Captured line types.

use std::fmt;

use chrono::{DateTime, Timelike, Utc};

/// Line separator of the host platform.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
/// Line separator of the host platform.
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Which standard stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Notification delivered to process output listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent<'a> {
    /// One line, without its terminator. May be empty.
    Line(&'a str),
    /// The stream reached end of file.
    Closed,
}

/// A single non-empty line recorded by an output reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLine {
    /// Arrival order within the owning record.
    pub seq: u64,
    /// Wall-clock arrival time, used for display only.
    pub at: DateTime<Utc>,
    /// Line text.
    pub text: String,
    /// Originating stream.
    pub stream: StreamKind,
}

impl CapturedLine {
    /// Render as `HH:MM:SS.ffff | text`.
    pub fn format(&self) -> String {
        format!("{} | {}", format_time(&self.at), self.text)
    }
}

impl fmt::Display for CapturedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", format_time(&self.at), self.text)
    }
}

/// `HH:MM:SS` followed by four fractional digits (1/10000 s).
fn format_time(at: &DateTime<Utc>) -> String {
    let ten_thousandths = (at.nanosecond() % 1_000_000_000) / 100_000;
    format!("{}.{:04}", at.format("%H:%M:%S"), ten_thousandths)
}
