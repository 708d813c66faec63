//! Shell process launching and exit waiting.

use std::path::Path;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, info};

use super::invocation::ShellInvocation;
use super::platform::Platform;
use crate::error::ScriptError;
use crate::output::{AsyncSource, BlockingSource, ProcessOutput};
use crate::Result;

/// Interval between exit checks when the exit cannot be awaited directly.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Start `script` through the shell of `platform`.
///
/// Returns once the process has started; the script keeps running in the
/// background. No output is pumped until a reader starts redirection.
pub fn spawn(platform: Platform, script: &Path, privileged: bool) -> Result<RunningScript> {
    let invocation = ShellInvocation::new(platform, script, privileged);
    launch(&invocation)
}

/// Start `script` as a Tokio child on the current runtime.
pub async fn spawn_async(
    platform: Platform,
    script: &Path,
    privileged: bool,
) -> Result<RunningScript> {
    let invocation = ShellInvocation::new(platform, script, privileged);
    launch_async(&invocation).await
}

/// Start a prepared invocation.
pub fn launch(invocation: &ShellInvocation) -> Result<RunningScript> {
    debug!("starting {}", invocation.command_line());

    let mut child = invocation
        .to_command()
        .spawn()
        .map_err(|source| ScriptError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(|s| Box::new(s) as BlockingSource);
    let stderr = child.stderr.take().map(|s| Box::new(s) as BlockingSource);
    let output = ProcessOutput::new(invocation.process_name(), stdout, stderr);
    let pid = child.id();

    debug!("{} started with PID {}", output.process_name(), pid);

    Ok(RunningScript {
        child: ChildProcess::Blocking(child),
        pid: Some(pid),
        output,
        status: None,
    })
}

/// Start a prepared invocation as a Tokio child.
///
/// Fails with [`ScriptError::Runtime`] outside a Tokio runtime.
pub async fn launch_async(invocation: &ShellInvocation) -> Result<RunningScript> {
    let runtime = Handle::try_current().map_err(|e| ScriptError::Runtime(e.to_string()))?;
    debug!("starting {}", invocation.command_line());

    let mut child = tokio::process::Command::from(invocation.to_command())
        .spawn()
        .map_err(|source| ScriptError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(|s| Box::new(s) as AsyncSource);
    let stderr = child.stderr.take().map(|s| Box::new(s) as AsyncSource);
    let output = ProcessOutput::new_async(invocation.process_name(), runtime, stdout, stderr);
    let pid = child.id();

    debug!("{} started with PID {:?}", output.process_name(), pid);

    Ok(RunningScript {
        child: ChildProcess::Async(child),
        pid,
        output,
        status: None,
    })
}

#[derive(Debug)]
enum ChildProcess {
    Blocking(std::process::Child),
    Async(tokio::process::Child),
}

impl ChildProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self {
            Self::Blocking(child) => child.try_wait(),
            Self::Async(child) => child.try_wait(),
        }
    }
}

/// A shell process started by [`spawn`] or [`spawn_async`].
///
/// Dropping it does not kill the process.
#[derive(Debug)]
pub struct RunningScript {
    child: ChildProcess,
    pid: Option<u32>,
    output: ProcessOutput,
    status: Option<ExitStatus>,
}

impl RunningScript {
    /// Handle over the process's redirected streams.
    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    /// OS process id, if the OS reported one at launch.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, if the process has been waited for.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Check for exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Block until the process exits and its output has been pumped.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.wait_timeout(None)
    }

    /// Block until the process exits and its output has been pumped.
    ///
    /// With a deadline, the process is killed when it elapses and
    /// [`ScriptError::Timeout`] is returned. Scripts started with
    /// [`spawn_async`] should use the async waits instead.
    pub fn wait_timeout(&mut self, timeout: Option<Duration>) -> Result<ExitStatus> {
        let status = match self.status {
            Some(status) => status,
            None => self.wait_exit(timeout)?,
        };

        self.status = Some(status);
        self.output.wait_for_drain();
        info!("{} exited with {}", self.output.process_name(), status);
        Ok(status)
    }

    fn wait_exit(&mut self, timeout: Option<Duration>) -> Result<ExitStatus> {
        if let (ChildProcess::Blocking(child), None) = (&mut self.child, timeout) {
            return Ok(child.wait()?);
        }

        let start = Instant::now();
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    self.kill()?;
                    return Err(ScriptError::Timeout(limit));
                }
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    /// Wait for exit without blocking the async runtime.
    pub async fn wait_async(&mut self) -> Result<ExitStatus> {
        self.wait_timeout_async(None).await
    }

    /// Async form of [`wait_timeout`](Self::wait_timeout).
    pub async fn wait_timeout_async(&mut self, timeout: Option<Duration>) -> Result<ExitStatus> {
        let status = match self.status {
            Some(status) => status,
            None => match timeout {
                None => self.wait_exit_async().await?,
                Some(limit) => match tokio::time::timeout(limit, self.wait_exit_async()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        self.kill_async().await?;
                        return Err(ScriptError::Timeout(limit));
                    }
                },
            },
        };

        self.status = Some(status);
        self.output.wait_for_drain_async().await;
        info!("{} exited with {}", self.output.process_name(), status);
        Ok(status)
    }

    async fn wait_exit_async(&mut self) -> Result<ExitStatus> {
        match self.child {
            ChildProcess::Async(ref mut child) => Ok(child.wait().await?),
            ChildProcess::Blocking(_) => loop {
                if let Some(status) = self.try_wait()? {
                    return Ok(status);
                }
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            },
        }
    }

    /// Kill the process and reap it.
    ///
    /// Children the script started on its own (e.g. via `sudo`) are not
    /// signalled.
    pub fn kill(&mut self) -> Result<()> {
        if self.try_wait()?.is_some() {
            return Ok(());
        }
        debug!("killing {} (PID {:?})", self.output.process_name(), self.pid);

        match self.child {
            ChildProcess::Blocking(ref mut child) => {
                child.kill()?;
                self.status = Some(child.wait()?);
            }
            ChildProcess::Async(ref mut child) => {
                child.start_kill()?;
                loop {
                    if let Some(status) = child.try_wait()? {
                        self.status = Some(status);
                        break;
                    }
                    std::thread::sleep(EXIT_POLL_INTERVAL);
                }
            }
        }
        Ok(())
    }

    /// Async form of [`kill`](Self::kill).
    pub async fn kill_async(&mut self) -> Result<()> {
        if self.try_wait()?.is_some() {
            return Ok(());
        }

        match self.child {
            ChildProcess::Async(ref mut child) => {
                debug!("killing {} (PID {:?})", self.output.process_name(), self.pid);
                child.start_kill()?;
                self.status = Some(child.wait().await?);
                Ok(())
            }
            ChildProcess::Blocking(_) => self.kill(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::StreamEvent;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn missing_shell() -> ShellInvocation {
        ShellInvocation {
            program: "/definitely/not/a/shell".to_string(),
            args: vec![],
            redirect_stdout: true,
            redirect_stderr: true,
            create_no_window: true,
        }
    }

    #[test]
    fn test_spawn_missing_shell() {
        let err = launch(&missing_shell()).unwrap_err();
        assert!(matches!(err, ScriptError::Spawn { ref program, .. } if program == "/definitely/not/a/shell"));
    }

    #[tokio::test]
    async fn test_spawn_async_missing_shell() {
        let err = launch_async(&missing_shell()).await.unwrap_err();
        assert!(matches!(err, ScriptError::Spawn { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_sets_redirection() {
        let mut script = spawn(Platform::Posix, Path::new("true"), false).unwrap();
        assert_eq!(script.output().process_name(), "bash");
        assert!(script.output().is_output_redirected());
        assert!(script.output().is_error_redirected());
        assert!(script.pid().is_some());

        let status = script.wait().unwrap();
        assert!(status.success());
        assert_eq!(script.exit_status(), Some(status));
    }

    #[test]
    #[cfg(unix)]
    fn test_wait_timeout_kills() {
        let mut script = spawn(Platform::Posix, Path::new("sleep 30"), false).unwrap();
        let err = script
            .wait_timeout(Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout(_)));
        assert!(script.exit_status().is_some());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_wait_async_on_blocking_child() {
        let mut script = spawn(Platform::Posix, Path::new("exit 3"), false).unwrap();
        let status = script.wait_async().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_spawn_async_pumps_and_awaits_exit() {
        let mut script = spawn_async(Platform::Posix, Path::new("echo hi; exit 3"), false)
            .await
            .unwrap();
        assert!(script.pid().is_some());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        script.output().on_output_line(move |event| {
            if let StreamEvent::Line(line) = event {
                sink.lock().push(line.to_string());
            }
        });
        script.output().start_output_redirect().unwrap();

        let status = script.wait_async().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(*seen.lock(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_wait_timeout_async_kills() {
        let mut script = spawn_async(Platform::Posix, Path::new("sleep 30"), false)
            .await
            .unwrap();
        let err = script
            .wait_timeout_async(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout(_)));
        assert!(script.exit_status().is_some());
    }
}
