//! Process output capture.
//!
//! A [`ProcessOutput`] pumps a child's stdout and stderr line by line to
//! registered listeners. Readers are listeners that keep their own record:
//! - [`BufferedReader`] accumulates everything and renders it as text
//! - [`StreamingReader`] exposes lines as an async stream while they arrive
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use script_builder::output::{BufferedReader, Output, ProcessOutput, ProcessOutputReader};
//!
//! let stdout = Cursor::new(b"hello\n\nworld\n".to_vec());
//! let process = ProcessOutput::new("demo", Some(Box::new(stdout)), None);
//!
//! let output = BufferedReader::new().read(&process).unwrap();
//! process.wait_for_drain();
//!
//! assert_eq!(output.output().len(), 2);
//! ```

mod buffered;
mod handle;
mod line;
mod record;
mod streaming;

pub use buffered::{BufferedOutput, BufferedReader, ERRORS_HEADER};
pub use handle::{AsyncSource, BlockingSource, Listener, ListenerId, ProcessOutput};
pub use line::{CapturedLine, StreamEvent, StreamKind, LINE_SEPARATOR};
pub use record::CaptureRecord;
pub use streaming::{StreamingOutput, StreamingReader};

use futures_util::stream::BoxStream;

use crate::Result;

/// Stream of formatted output lines.
pub type LineStream = BoxStream<'static, String>;

/// Attaches to a [`ProcessOutput`] and starts its pumps.
///
/// Implementations must subscribe before starting redirection so that the
/// first line is not missed.
pub trait ProcessOutputReader {
    /// Handle through which the captured output is read.
    type Output;

    /// Subscribe to `process` and start pumping its redirected streams.
    fn read(&self, process: &ProcessOutput) -> Result<Self::Output>;
}

/// Snapshot access to captured output.
pub trait Output {
    /// Formatted `HH:MM:SS.ffff | line` records in arrival order.
    fn output(&self) -> Vec<String>;
}

/// Incremental access to captured output.
pub trait AsyncOutput {
    /// A fresh stream over the output; see [`StreamingOutput`].
    fn output_stream(&self) -> LineStream;
}
