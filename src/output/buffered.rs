//! Buffered reader: accumulates the full capture and renders it as text.

use std::fmt;
use std::sync::Arc;

use super::handle::{ListenerId, ProcessOutput};
use super::line::{CapturedLine, StreamEvent, StreamKind, LINE_SEPARATOR};
use super::record::CaptureRecord;
use super::{Output, ProcessOutputReader};
use crate::Result;

/// Header of the trailing error section in rendered output.
pub const ERRORS_HEADER: &str = "Errors: ";

/// Reader that keeps every line until asked for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferedReader;

impl BufferedReader {
    /// Create a buffered reader.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessOutputReader for BufferedReader {
    type Output = BufferedOutput;

    fn read(&self, process: &ProcessOutput) -> Result<BufferedOutput> {
        let output = BufferedOutput::subscribe(process);
        if process.is_output_redirected() {
            process.start_output_redirect()?;
        }
        if process.is_error_redirected() {
            process.start_error_redirect()?;
        }
        Ok(output)
    }
}

/// Captured output of one process.
///
/// Safe to read at any time, including while the process is still writing.
/// Dropping it removes its listeners but leaves the pumps and the process
/// alone.
pub struct BufferedOutput {
    process: ProcessOutput,
    record: Arc<CaptureRecord>,
    subscriptions: Vec<(StreamKind, ListenerId)>,
}

impl BufferedOutput {
    fn subscribe(process: &ProcessOutput) -> Self {
        let record = Arc::new(CaptureRecord::new());
        let mut subscriptions = Vec::new();

        for kind in [StreamKind::Stdout, StreamKind::Stderr] {
            if !process.is_redirected(kind) {
                continue;
            }
            let record = Arc::clone(&record);
            let id = process.subscribe(kind, move |event| {
                if let StreamEvent::Line(line) = event {
                    record.push(kind, line);
                }
            });
            subscriptions.push((kind, id));
        }

        Self {
            process: process.clone(),
            record,
            subscriptions,
        }
    }

    /// Captured lines, stderr included, in arrival order.
    pub fn lines(&self) -> Vec<CapturedLine> {
        self.record.output()
    }

    /// Captured stderr lines in arrival order.
    pub fn error_lines(&self) -> Vec<CapturedLine> {
        self.record.errors()
    }

    /// Formatted stderr lines.
    pub fn errors(&self) -> Vec<String> {
        format_all(&self.record.errors())
    }

    /// Whether stderr produced anything.
    pub fn has_errors(&self) -> bool {
        self.record.has_errors()
    }

    /// Render all output followed by an `Errors:` section when stderr was
    /// written to.
    pub fn render(&self) -> String {
        let mut text = self.output().join(LINE_SEPARATOR);
        let errors = self.errors();
        if !errors.is_empty() {
            text.push_str(LINE_SEPARATOR);
            text.push_str(LINE_SEPARATOR);
            text.push_str(ERRORS_HEADER);
            text.push_str(LINE_SEPARATOR);
            text.push_str(&errors.join(LINE_SEPARATOR));
        }
        text
    }
}

impl Output for BufferedOutput {
    fn output(&self) -> Vec<String> {
        format_all(&self.record.output())
    }
}

impl fmt::Display for BufferedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for BufferedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedOutput")
            .field("process", &self.process.process_name())
            .field("lines", &self.record.len())
            .finish()
    }
}

impl Drop for BufferedOutput {
    fn drop(&mut self) {
        for (kind, id) in self.subscriptions.drain(..) {
            self.process.unsubscribe(kind, id);
        }
    }
}

fn format_all(lines: &[CapturedLine]) -> Vec<String> {
    lines.iter().map(CapturedLine::format).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn source(data: &str) -> Option<Box<dyn Read + Send>> {
        Some(Box::new(Cursor::new(data.as_bytes().to_vec())))
    }

    fn texts(lines: Vec<CapturedLine>) -> Vec<String> {
        lines.into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn test_reads_stdout_and_skips_blank_lines() {
        let process = ProcessOutput::new("test", source("first\n\n\nsecond\n"), None);
        let output = BufferedReader::new().read(&process).unwrap();
        process.wait_for_drain();

        assert_eq!(texts(output.lines()), vec!["first", "second"]);
        assert!(!output.has_errors());
        assert!(!output.render().contains(ERRORS_HEADER));
    }

    #[test]
    fn test_formatted_lines() {
        let process = ProcessOutput::new("test", source("hello\n"), None);
        let output = BufferedReader::new().read(&process).unwrap();
        process.wait_for_drain();

        let lines = output.output();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" | hello"));
        // HH:MM:SS.ffff
        assert_eq!(lines[0].find(" | "), Some(13));
    }

    #[test]
    fn test_errors_section() {
        let process = ProcessOutput::new("test", None, source("boom\n"));
        let output = BufferedReader::new().read(&process).unwrap();
        process.wait_for_drain();

        assert_eq!(texts(output.error_lines()), vec!["boom"]);
        let rendered = output.render();
        let expected_tail = format!("{LINE_SEPARATOR}{LINE_SEPARATOR}{ERRORS_HEADER}{LINE_SEPARATOR}");
        assert!(rendered.contains(&expected_tail));
        assert_eq!(rendered.matches("boom").count(), 2);
        assert_eq!(output.to_string(), rendered);
    }

    #[test]
    fn test_idempotent_read() {
        let process = ProcessOutput::new("test", source("a\nb\n"), source("c\n"));
        let output = BufferedReader::new().read(&process).unwrap();
        process.wait_for_drain();

        assert_eq!(output.output(), output.output());
        assert_eq!(output.render(), output.render());
        assert_eq!(output.lines().len(), 3);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let process = ProcessOutput::new("test", source("a\n"), source("b\n"));
        let output = BufferedReader::new().read(&process).unwrap();
        let ids = output.subscriptions.clone();
        process.wait_for_drain();
        drop(output);

        for (kind, id) in ids {
            assert!(!process.unsubscribe(kind, id));
        }
    }

    #[test]
    fn test_unredirected_streams_are_skipped() {
        let process = ProcessOutput::new("test", None, None);
        let output = BufferedReader::new().read(&process).unwrap();
        assert!(output.subscriptions.is_empty());
        assert_eq!(output.render(), "");
    }
}
