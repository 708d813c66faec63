//! Process output handle with per-stream listeners and redirection pumps.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tokio::io::{AsyncBufReadExt, AsyncRead};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};

use super::line::{StreamEvent, StreamKind};
use crate::error::ScriptError;
use crate::Result;

/// Global counter for listener ids.
static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Callback invoked for every line and for end of stream.
pub type Listener = Arc<dyn Fn(StreamEvent<'_>) + Send + Sync>;

/// Blocking stream source, pumped on its own thread.
pub type BlockingSource = Box<dyn Read + Send>;

/// Async stream source, pumped on a Tokio task.
pub type AsyncSource = Box<dyn AsyncRead + Send + Unpin>;

/// Registration token returned by [`ProcessOutput::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

enum PumpSource {
    Blocking(BlockingSource),
    Async { reader: AsyncSource, runtime: Handle },
}

/// State shared between a stream handle and its pump.
struct PumpState {
    kind: StreamKind,
    active: AtomicBool,
    eof: AtomicBool,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    drained: Mutex<bool>,
    drained_cond: Condvar,
    drained_notify: Notify,
}

impl PumpState {
    fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            active: AtomicBool::new(false),
            eof: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
            drained: Mutex::new(false),
            drained_cond: Condvar::new(),
            drained_notify: Notify::new(),
        }
    }

    /// Dispatch the lines of one chunk. Discarded while paused.
    fn deliver(&self, chunk: &[u8]) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let text = String::from_utf8_lossy(chunk);
        for line in split_lines(&text) {
            trace!("{} pump: {}", self.kind, line);
            self.dispatch(StreamEvent::Line(line));
        }
    }

    /// Record end of file, then tell the listeners.
    ///
    /// The flag is set first so that a listener registered after the
    /// dispatch snapshot still sees the stream as closed.
    fn close(&self) {
        self.eof.store(true, Ordering::SeqCst);
        debug!("{} pump: EOF", self.kind);
        self.dispatch(StreamEvent::Closed);
    }

    fn dispatch(&self, event: StreamEvent<'_>) {
        // Call outside the lock so listeners may unsubscribe themselves.
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    fn mark_drained(&self) {
        *self.drained.lock() = true;
        self.drained_cond.notify_all();
        self.drained_notify.notify_waiters();
    }

    fn wait_drained(&self) {
        let mut drained = self.drained.lock();
        while !*drained {
            self.drained_cond.wait(&mut drained);
        }
    }

    async fn wait_drained_async(&self) {
        loop {
            let mut notified = std::pin::pin!(self.drained_notify.notified());
            notified.as_mut().enable();
            if *self.drained.lock() {
                return;
            }
            notified.await;
        }
    }
}

/// Marks the pump drained however it ends, including by panic.
struct DrainGuard(Arc<PumpState>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("{} pump panicked", self.0.kind);
        }
        self.0.mark_drained();
    }
}

/// Split a chunk read up to `\n` into lines.
///
/// `\r\n`, `\n` and a lone `\r` each end a line.
fn split_lines(chunk: &str) -> impl Iterator<Item = &str> {
    let body = chunk.strip_suffix('\n').unwrap_or(chunk);
    let body = body.strip_suffix('\r').unwrap_or(body);
    body.split('\r')
}

/// Read lines until EOF on a dedicated thread.
fn pump_blocking(source: BlockingSource, state: Arc<PumpState>) {
    let _guard = DrainGuard(Arc::clone(&state));
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => state.deliver(&buf),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("{} pump read error: {}", state.kind, e);
                break;
            }
        }
    }

    state.close();
}

/// Read lines until EOF on a Tokio task.
async fn pump_async(source: AsyncSource, state: Arc<PumpState>) {
    let _guard = DrainGuard(Arc::clone(&state));
    let mut reader = tokio::io::BufReader::new(source);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => state.deliver(&buf),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("{} pump read error: {}", state.kind, e);
                break;
            }
        }
    }

    state.close();
}

/// One redirected stream: its source until started, and the pump state.
struct StreamPump {
    redirected: bool,
    source: Mutex<Option<PumpSource>>,
    started: AtomicBool,
    state: Arc<PumpState>,
}

impl StreamPump {
    fn new(kind: StreamKind, source: Option<PumpSource>) -> Self {
        Self {
            redirected: source.is_some(),
            source: Mutex::new(source),
            started: AtomicBool::new(false),
            state: Arc::new(PumpState::new(kind)),
        }
    }

    fn kind(&self) -> StreamKind {
        self.state.kind
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.state.listeners.write().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.state.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn start(&self, process: &str) -> Result<()> {
        if !self.redirected {
            return Err(ScriptError::NotRedirected(self.kind()));
        }

        self.state.active.store(true, Ordering::SeqCst);

        let Some(source) = self.source.lock().take() else {
            debug!("{} pump for {} resumed", self.kind(), process);
            return Ok(());
        };

        let state = Arc::clone(&self.state);
        match source {
            PumpSource::Blocking(reader) => {
                std::thread::Builder::new()
                    .name(format!("{process}-{}", self.kind()))
                    .spawn(move || pump_blocking(reader, state))?;
            }
            PumpSource::Async { reader, runtime } => {
                runtime.spawn(pump_async(reader, state));
            }
        }

        self.started.store(true, Ordering::SeqCst);
        debug!("{} pump for {} started", self.kind(), process);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.redirected {
            return Err(ScriptError::NotRedirected(self.kind()));
        }
        self.state.active.store(false, Ordering::SeqCst);
        debug!("{} pump paused", self.kind());
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

struct Inner {
    name: String,
    stdout: StreamPump,
    stderr: StreamPump,
}

/// Handle over a running child's redirected output streams.
///
/// Cloning is cheap; all clones share listeners and pumps. Subscribe before
/// starting a pump to be sure of seeing the first line.
#[derive(Clone)]
pub struct ProcessOutput {
    inner: Arc<Inner>,
}

impl ProcessOutput {
    /// Wrap blocking stream sources, each pumped on its own thread.
    /// A `None` source means the stream is not redirected.
    pub fn new(
        name: impl Into<String>,
        stdout: Option<BlockingSource>,
        stderr: Option<BlockingSource>,
    ) -> Self {
        Self::from_sources(
            name.into(),
            stdout.map(PumpSource::Blocking),
            stderr.map(PumpSource::Blocking),
        )
    }

    /// Wrap async stream sources, each pumped as a task on `runtime`.
    pub fn new_async(
        name: impl Into<String>,
        runtime: Handle,
        stdout: Option<AsyncSource>,
        stderr: Option<AsyncSource>,
    ) -> Self {
        let wrap = |reader| PumpSource::Async {
            reader,
            runtime: runtime.clone(),
        };
        Self::from_sources(name.into(), stdout.map(wrap), stderr.map(wrap))
    }

    fn from_sources(name: String, stdout: Option<PumpSource>, stderr: Option<PumpSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                stdout: StreamPump::new(StreamKind::Stdout, stdout),
                stderr: StreamPump::new(StreamKind::Stderr, stderr),
            }),
        }
    }

    fn stream(&self, kind: StreamKind) -> &StreamPump {
        match kind {
            StreamKind::Stdout => &self.inner.stdout,
            StreamKind::Stderr => &self.inner.stderr,
        }
    }

    /// Name of the process, e.g. `bash`.
    pub fn process_name(&self) -> &str {
        &self.inner.name
    }

    /// Whether stdout was piped at launch.
    pub fn is_output_redirected(&self) -> bool {
        self.inner.stdout.redirected
    }

    /// Whether stderr was piped at launch.
    pub fn is_error_redirected(&self) -> bool {
        self.inner.stderr.redirected
    }

    /// Whether `kind` was piped at launch.
    pub fn is_redirected(&self, kind: StreamKind) -> bool {
        self.stream(kind).redirected
    }

    /// Register a listener on one stream.
    pub fn subscribe<F>(&self, kind: StreamKind, listener: F) -> ListenerId
    where
        F: Fn(StreamEvent<'_>) + Send + Sync + 'static,
    {
        self.stream(kind).subscribe(Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    ///
    /// The pump keeps running for other listeners.
    pub fn unsubscribe(&self, kind: StreamKind, id: ListenerId) -> bool {
        self.stream(kind).unsubscribe(id)
    }

    /// Register a stdout listener.
    pub fn on_output_line<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(StreamEvent<'_>) + Send + Sync + 'static,
    {
        self.subscribe(StreamKind::Stdout, listener)
    }

    /// Register a stderr listener.
    pub fn on_error_line<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(StreamEvent<'_>) + Send + Sync + 'static,
    {
        self.subscribe(StreamKind::Stderr, listener)
    }

    /// Start (or resume) delivering stdout lines.
    pub fn start_output_redirect(&self) -> Result<()> {
        self.inner.stdout.start(&self.inner.name)
    }

    /// Pause stdout delivery. Lines read while paused are discarded.
    pub fn stop_output_redirect(&self) -> Result<()> {
        self.inner.stdout.stop()
    }

    /// Start (or resume) delivering stderr lines.
    pub fn start_error_redirect(&self) -> Result<()> {
        self.inner.stderr.start(&self.inner.name)
    }

    /// Pause stderr delivery. Lines read while paused are discarded.
    pub fn stop_error_redirect(&self) -> Result<()> {
        self.inner.stderr.stop()
    }

    /// Whether `kind` has reached end of file.
    pub fn is_closed(&self, kind: StreamKind) -> bool {
        self.stream(kind).state.eof.load(Ordering::SeqCst)
    }

    /// Block until every started pump has reached end of stream and
    /// delivered it.
    ///
    /// Pumps that were never started are skipped.
    pub fn wait_for_drain(&self) {
        for pump in [&self.inner.stdout, &self.inner.stderr] {
            if pump.is_started() {
                pump.state.wait_drained();
            }
        }
    }

    /// Async form of [`wait_for_drain`](Self::wait_for_drain).
    pub async fn wait_for_drain_async(&self) {
        for pump in [&self.inner.stdout, &self.inner.stderr] {
            if pump.is_started() {
                pump.state.wait_drained_async().await;
            }
        }
    }
}

impl fmt::Debug for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOutput")
            .field("name", &self.inner.name)
            .field("stdout_redirected", &self.inner.stdout.redirected)
            .field("stderr_redirected", &self.inner.stderr.redirected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(data: &str) -> Option<Box<dyn Read + Send>> {
        Some(Box::new(Cursor::new(data.as_bytes().to_vec())))
    }

    fn collect(output: &ProcessOutput, kind: StreamKind) -> Arc<Mutex<Vec<Option<String>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        output.subscribe(kind, move |event| {
            sink.lock().push(match event {
                StreamEvent::Line(line) => Some(line.to_string()),
                StreamEvent::Closed => None,
            });
        });
        seen
    }

    #[test]
    fn test_redirect_flags() {
        let output = ProcessOutput::new("test", source(""), None);
        assert_eq!(output.process_name(), "test");
        assert!(output.is_output_redirected());
        assert!(!output.is_error_redirected());
        assert!(output.is_redirected(StreamKind::Stdout));
    }

    #[test]
    fn test_pump_delivers_lines_then_closed() {
        let output = ProcessOutput::new("test", source("one\r\n\ntwo\nthree"), None);
        let seen = collect(&output, StreamKind::Stdout);

        output.start_output_redirect().unwrap();
        output.wait_for_drain();

        assert_eq!(
            *seen.lock(),
            vec![
                Some("one".to_string()),
                Some(String::new()),
                Some("two".to_string()),
                Some("three".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_start_unredirected_fails() {
        let output = ProcessOutput::new("test", None, None);
        assert!(matches!(
            output.start_error_redirect(),
            Err(ScriptError::NotRedirected(StreamKind::Stderr))
        ));
        assert!(output.stop_output_redirect().is_err());
    }

    #[test]
    fn test_unsubscribe_stops_delivery_only_for_that_listener() {
        let output = ProcessOutput::new("test", source("a\nb\n"), None);
        let kept = collect(&output, StreamKind::Stdout);
        let removed = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&removed);
        let id = output.on_output_line(move |_| *counter.lock() += 1);

        assert!(output.unsubscribe(StreamKind::Stdout, id));
        assert!(!output.unsubscribe(StreamKind::Stdout, id));

        output.start_output_redirect().unwrap();
        output.wait_for_drain();

        assert_eq!(*removed.lock(), 0);
        assert_eq!(kept.lock().len(), 3);
    }

    #[test]
    fn test_paused_pump_discards_but_still_closes() {
        let output = ProcessOutput::new("test", source("a\nb\n"), None);
        let seen = collect(&output, StreamKind::Stdout);

        output.start_output_redirect().unwrap();
        output.stop_output_redirect().unwrap();
        output.wait_for_drain();

        // The pump may have delivered lines before the pause took effect.
        let seen = seen.lock();
        assert_eq!(seen.last(), Some(&None));
        assert!(seen.len() <= 3);
    }

    #[test]
    fn test_start_twice_resumes() {
        let output = ProcessOutput::new("test", source("x\n"), None);
        output.start_output_redirect().unwrap();
        output.start_output_redirect().unwrap();
        output.wait_for_drain();
    }

    #[test]
    fn test_drain_without_start_returns() {
        let output = ProcessOutput::new("test", source("x\n"), source("y\n"));
        output.wait_for_drain();
    }

    #[tokio::test]
    async fn test_drain_async() {
        let output = ProcessOutput::new("test", None, source("err\n"));
        let seen = collect(&output, StreamKind::Stderr);
        output.start_error_redirect().unwrap();
        output.wait_for_drain_async().await;
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_lone_carriage_return_ends_line() {
        let output = ProcessOutput::new("test", source("a\rb\nc\r\n\r\nd\r"), None);
        let seen = collect(&output, StreamKind::Stdout);

        output.start_output_redirect().unwrap();
        output.wait_for_drain();

        assert_eq!(
            *seen.lock(),
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string()),
                Some(String::new()),
                Some("d".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_closed_flag_set_after_eof() {
        let output = ProcessOutput::new("test", source("x\n"), None);
        assert!(!output.is_closed(StreamKind::Stdout));

        output.start_output_redirect().unwrap();
        output.wait_for_drain();

        assert!(output.is_closed(StreamKind::Stdout));
        assert!(!output.is_closed(StreamKind::Stderr));
    }

    #[tokio::test]
    async fn test_async_source_pumped_on_runtime() {
        let stdout: AsyncSource = Box::new(std::io::Cursor::new(b"one\ntwo\n".to_vec()));
        let output = ProcessOutput::new_async(
            "test",
            tokio::runtime::Handle::current(),
            Some(stdout),
            None,
        );
        let seen = collect(&output, StreamKind::Stdout);

        output.start_output_redirect().unwrap();
        output.wait_for_drain_async().await;

        assert_eq!(
            *seen.lock(),
            vec![Some("one".to_string()), Some("two".to_string()), None]
        );
        assert!(output.is_closed(StreamKind::Stdout));
    }
}
