//! Script execution engine.

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use tracing::debug;

use super::options::ExecOptions;
use crate::output::{BufferedReader, ProcessOutputReader};
use crate::shell::{self, Platform, RunningScript};
use crate::Result;

/// Output of a started script together with its process.
#[derive(Debug)]
pub struct Execution<O> {
    output: O,
    script: RunningScript,
}

impl<O> Execution<O> {
    /// The reader's output handle.
    pub fn output(&self) -> &O {
        &self.output
    }

    /// The running (or finished) script.
    pub fn script(&self) -> &RunningScript {
        &self.script
    }

    /// Mutable access to the script, e.g. to wait or kill.
    pub fn script_mut(&mut self) -> &mut RunningScript {
        &mut self.script
    }

    /// Exit status, if the script has been waited for.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.script.exit_status()
    }

    /// Split into output and process.
    pub fn into_parts(self) -> (O, RunningScript) {
        (self.output, self.script)
    }

    /// Keep only the output. The process is left running if it still is.
    pub fn into_output(self) -> O {
        self.output
    }
}

/// Runs script files through the platform shell.
#[derive(Debug, Clone, Copy)]
pub struct ScriptExecutor {
    platform: Platform,
    timeout: Option<Duration>,
}

impl ScriptExecutor {
    /// Executor for the host platform.
    pub fn new() -> Result<Self> {
        Ok(Self::for_platform(Platform::current()?))
    }

    /// Executor for an explicit platform.
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            timeout: None,
        }
    }

    /// Executor for an OS identifier such as `"linux"` or `"windows"`.
    pub fn for_os(os: &str) -> Result<Self> {
        Ok(Self::for_platform(Platform::from_os(os)?))
    }

    /// Default exit timeout, used when [`ExecOptions::timeout`] is unset.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Run `script` to completion and return its rendered output.
    pub fn run(&self, script: &Path, privileged: bool) -> Result<String> {
        let options = ExecOptions::new().privileged(privileged);
        let execution = self.start(script, &BufferedReader::new(), options)?;
        Ok(execution.output().render())
    }

    /// Async form of [`run`](Self::run).
    pub async fn run_async(&self, script: &Path, privileged: bool) -> Result<String> {
        let options = ExecOptions::new().privileged(privileged);
        let execution = self
            .start_async(script, &BufferedReader::new(), options)
            .await?;
        Ok(execution.output().render())
    }

    /// Start `script` and attach `reader` before anything else happens.
    ///
    /// With `wait_for_exit`, returns after the script has exited and its
    /// output has drained; otherwise the output may still be filling.
    pub fn start<R: ProcessOutputReader>(
        &self,
        script: &Path,
        reader: &R,
        options: ExecOptions,
    ) -> Result<Execution<R::Output>> {
        let mut running = shell::spawn(self.platform, script, options.privileged)?;
        let output = reader.read(running.output())?;

        if options.wait_for_exit {
            running.wait_timeout(options.timeout.or(self.timeout))?;
        } else {
            debug!("not waiting for {}", script.display());
        }

        Ok(Execution {
            output,
            script: running,
        })
    }

    /// Async form of [`start`](Self::start). The script runs as a Tokio
    /// child whose exit is awaited. The reader is attached before the wait
    /// begins, so both forms observe the same output.
    pub async fn start_async<R: ProcessOutputReader>(
        &self,
        script: &Path,
        reader: &R,
        options: ExecOptions,
    ) -> Result<Execution<R::Output>> {
        let mut running = shell::spawn_async(self.platform, script, options.privileged).await?;
        let output = reader.read(running.output())?;

        if options.wait_for_exit {
            running
                .wait_timeout_async(options.timeout.or(self.timeout))
                .await?;
        } else {
            debug!("not waiting for {}", script.display());
        }

        Ok(Execution {
            output,
            script: running,
        })
    }
}
