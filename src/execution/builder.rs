//! One-call script building: write, run, capture, clean up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use super::executor::ScriptExecutor;
use crate::config::Config;
use crate::script::{ScriptSource, TempScript};
use crate::Result;

/// Runs ad-hoc script content through a temporary file.
///
/// Every call writes `<uuid>_build-script.<sh|bat>` into the temp directory,
/// runs it with the buffered reader, waits for exit, and removes the file
/// whether or not the run succeeded.
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    temp_dir: Option<PathBuf>,
    privileged: bool,
    executor: ScriptExecutor,
}

impl ScriptBuilder {
    /// Builder for the host platform using `<cwd>/temp`, running privileged.
    pub fn new() -> Result<Self> {
        Ok(Self::with_executor(ScriptExecutor::new()?))
    }

    /// Builder around an existing executor.
    pub fn with_executor(executor: ScriptExecutor) -> Self {
        Self {
            temp_dir: None,
            privileged: true,
            executor,
        }
    }

    /// Builder configured from [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let executor = ScriptExecutor::new()?.with_timeout(config.timeout());
        let mut builder = Self::with_executor(executor).privileged(config.script.privileged);
        builder.temp_dir = config.script.temp_dir.clone();
        Ok(builder)
    }

    /// Directory for generated scripts.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Whether scripts run privileged. Defaults to `true`.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Exit timeout for each run.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.executor = self.executor.with_timeout(Some(timeout));
        self
    }

    /// File name for a fresh script.
    pub fn script_name(&self) -> String {
        format!(
            "{}_build-script.{}",
            Uuid::new_v4(),
            self.executor.platform().script_extension()
        )
    }

    /// Write `source` to a temporary script, run it, and return the
    /// rendered output.
    pub fn build_as_script(&self, source: impl Into<ScriptSource>) -> Result<String> {
        let script = TempScript::create(&self.script_name(), source, self.dir())?;
        debug!("building {}", script.path().display());
        self.executor.run(script.path(), self.privileged)
    }

    /// Async form of [`build_as_script`](Self::build_as_script).
    pub async fn build_as_script_async(&self, source: impl Into<ScriptSource>) -> Result<String> {
        let script = TempScript::create_async(&self.script_name(), source, self.dir()).await?;
        debug!("building {}", script.path().display());
        self.executor
            .run_async(script.path(), self.privileged)
            .await
    }

    fn dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }
}
