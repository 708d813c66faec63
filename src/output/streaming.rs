//! Streaming reader: exposes captured lines as they arrive.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::handle::{ListenerId, ProcessOutput};
use super::line::{CapturedLine, StreamEvent, StreamKind};
use super::record::CaptureRecord;
use super::{AsyncOutput, LineStream, Output, ProcessOutputReader};
use crate::Result;

/// Reader whose output can be consumed while the process runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingReader;

impl StreamingReader {
    /// Create a streaming reader.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessOutputReader for StreamingReader {
    type Output = StreamingOutput;

    fn read(&self, process: &ProcessOutput) -> Result<StreamingOutput> {
        let output = StreamingOutput::subscribe(process);
        if process.is_output_redirected() {
            process.start_output_redirect()?;
        }
        if process.is_error_redirected() {
            process.start_error_redirect()?;
        }
        Ok(output)
    }
}

/// Fan-out state shared between the pump listeners and open streams.
struct Feed {
    record: CaptureRecord,
    subscribers: Vec<mpsc::UnboundedSender<String>>,
    open_streams: Vec<StreamKind>,
}

impl Feed {
    fn finished(&self) -> bool {
        self.open_streams.is_empty()
    }

    /// Mark `kind` closed. Closing twice is harmless.
    fn close(&mut self, kind: StreamKind) {
        self.open_streams.retain(|open| *open != kind);
        if self.finished() {
            // Dropping the senders ends every open stream.
            self.subscribers.clear();
        }
    }

    fn accept(&mut self, kind: StreamKind, event: StreamEvent<'_>) {
        match event {
            StreamEvent::Line(text) => {
                if let Some(line) = self.record.push(kind, text) {
                    let formatted = line.format();
                    self.subscribers
                        .retain(|tx| tx.send(formatted.clone()).is_ok());
                }
            }
            StreamEvent::Closed => self.close(kind),
        }
    }
}

/// Live output of one process.
///
/// Each call to [`output_stream`](AsyncOutput::output_stream) yields the
/// lines captured so far and then follows new ones until every redirected
/// stream has closed or this value is dropped. Capture never waits on a
/// slow consumer; lines are buffered per stream.
pub struct StreamingOutput {
    process: ProcessOutput,
    feed: Arc<Mutex<Feed>>,
    subscriptions: Vec<(StreamKind, ListenerId)>,
}

impl StreamingOutput {
    fn subscribe(process: &ProcessOutput) -> Self {
        let kinds: Vec<StreamKind> = [StreamKind::Stdout, StreamKind::Stderr]
            .into_iter()
            .filter(|kind| process.is_redirected(*kind))
            .collect();

        let feed = Arc::new(Mutex::new(Feed {
            record: CaptureRecord::new(),
            subscribers: Vec::new(),
            open_streams: kinds.clone(),
        }));

        let subscriptions = kinds
            .iter()
            .map(|&kind| {
                let feed = Arc::clone(&feed);
                let id = process.subscribe(kind, move |event| feed.lock().accept(kind, event));
                (kind, id)
            })
            .collect();

        // A stream that hit EOF before we subscribed will not send `Closed` again.
        for kind in kinds {
            if process.is_closed(kind) {
                feed.lock().close(kind);
            }
        }

        Self {
            process: process.clone(),
            feed,
            subscriptions,
        }
    }

    /// Whether every redirected stream has reached end of file.
    pub fn is_finished(&self) -> bool {
        self.feed.lock().finished()
    }

    /// Captured lines so far, stderr included.
    pub fn lines(&self) -> Vec<CapturedLine> {
        self.feed.lock().record.output()
    }

    /// Formatted stderr lines captured so far.
    pub fn errors(&self) -> Vec<String> {
        self.feed
            .lock()
            .record
            .errors()
            .iter()
            .map(CapturedLine::format)
            .collect()
    }
}

impl AsyncOutput for StreamingOutput {
    fn output_stream(&self) -> LineStream {
        let mut feed = self.feed.lock();
        let replay: Vec<String> = feed.record.output().iter().map(CapturedLine::format).collect();

        if feed.finished() {
            return stream::iter(replay).boxed();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        feed.subscribers.push(tx);
        drop(feed);

        let live = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        });
        stream::iter(replay).chain(live).boxed()
    }
}

impl Output for StreamingOutput {
    fn output(&self) -> Vec<String> {
        self.lines().iter().map(CapturedLine::format).collect()
    }
}

impl fmt::Debug for StreamingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let feed = self.feed.lock();
        f.debug_struct("StreamingOutput")
            .field("process", &self.process.process_name())
            .field("lines", &feed.record.len())
            .field("finished", &feed.finished())
            .finish()
    }
}

impl Drop for StreamingOutput {
    fn drop(&mut self) {
        for (kind, id) in self.subscriptions.drain(..) {
            self.process.unsubscribe(kind, id);
        }
        self.feed.lock().subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    fn source(data: &str) -> Option<Box<dyn Read + Send>> {
        Some(Box::new(Cursor::new(data.as_bytes().to_vec())))
    }

    fn texts(lines: &[String]) -> Vec<&str> {
        lines
            .iter()
            .map(|l| l.split_once(" | ").map(|(_, text)| text).unwrap_or(""))
            .collect()
    }

    #[tokio::test]
    async fn test_stream_ends_after_close() {
        let process = ProcessOutput::new("test", source("a\n\nb\n"), None);
        let output = StreamingReader::new().read(&process).unwrap();

        let lines: Vec<String> = tokio::time::timeout(
            Duration::from_secs(5),
            output.output_stream().collect::<Vec<String>>(),
        )
        .await
        .unwrap();

        assert_eq!(texts(&lines), vec!["a", "b"]);
        process.wait_for_drain_async().await;
        assert!(output.is_finished());
    }

    #[tokio::test]
    async fn test_restart_replays() {
        let process = ProcessOutput::new("test", source("x\ny\n"), source("z\n"));
        let output = StreamingReader::new().read(&process).unwrap();
        process.wait_for_drain_async().await;

        let first: Vec<String> = output.output_stream().collect().await;
        let second: Vec<String> = output.output_stream().collect().await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(texts(&output.errors()), vec!["z"]);
    }

    #[tokio::test]
    async fn test_live_lines_follow_replay() {
        let process = ProcessOutput::new("test", None, None);
        let output = StreamingOutput::subscribe(&process);
        {
            let mut feed = output.feed.lock();
            feed.open_streams = vec![StreamKind::Stdout];
            feed.accept(StreamKind::Stdout, StreamEvent::Line("early"));
        }

        let mut stream = output.output_stream();
        assert_eq!(texts(&[stream.next().await.unwrap()]), vec!["early"]);

        output
            .feed
            .lock()
            .accept(StreamKind::Stdout, StreamEvent::Line("late"));
        assert_eq!(texts(&[stream.next().await.unwrap()]), vec!["late"]);

        output
            .feed
            .lock()
            .accept(StreamKind::Stdout, StreamEvent::Closed);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_ends_open_streams() {
        let process = ProcessOutput::new("test", None, None);
        let output = StreamingOutput::subscribe(&process);
        output.feed.lock().open_streams = vec![StreamKind::Stdout];

        let mut stream = output.output_stream();
        drop(output);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_attached_after_eof_finishes() {
        let process = ProcessOutput::new("test", source("a\n"), source("b\n"));
        let first = StreamingReader::new().read(&process).unwrap();
        process.wait_for_drain_async().await;
        assert!(first.is_finished());

        let late = StreamingReader::new().read(&process).unwrap();
        assert!(late.is_finished());

        let lines: Vec<String> = tokio::time::timeout(
            Duration::from_secs(2),
            late.output_stream().collect::<Vec<String>>(),
        )
        .await
        .unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_closed_twice_counts_once() {
        let process = ProcessOutput::new("test", None, None);
        let output = StreamingOutput::subscribe(&process);
        {
            let mut feed = output.feed.lock();
            feed.open_streams = vec![StreamKind::Stdout, StreamKind::Stderr];
            feed.accept(StreamKind::Stdout, StreamEvent::Closed);
            feed.accept(StreamKind::Stdout, StreamEvent::Closed);
        }
        assert!(!output.is_finished());

        output
            .feed
            .lock()
            .accept(StreamKind::Stderr, StreamEvent::Closed);
        assert!(output.is_finished());
    }

    #[test]
    fn test_no_streams_is_finished() {
        let process = ProcessOutput::new("test", None, None);
        let output = StreamingReader::new().read(&process).unwrap();
        assert!(output.is_finished());
        assert!(output.output().is_empty());
    }
}
