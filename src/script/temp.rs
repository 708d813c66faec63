//! Temporary script files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::source::ScriptSource;
use crate::error::ScriptError;
use crate::Result;

/// Directory used when none is given, relative to the working directory.
pub const DEFAULT_TEMP_DIR: &str = "temp";

/// A script written to disk for a single run.
///
/// The file is removed when the value is dropped or [`release`](Self::release)d.
/// Removing a file that is already gone is not an error.
#[derive(Debug)]
pub struct TempScript {
    path: PathBuf,
    released: bool,
}

impl TempScript {
    /// Write `source` to `dir/name`, creating `dir` if needed.
    ///
    /// `dir` defaults to `<cwd>/temp`.
    pub fn create(
        name: &str,
        source: impl Into<ScriptSource>,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let dir = resolve_dir(name, dir)?;
        std::fs::create_dir_all(&dir)?;

        let script = Self::claim(dir.join(name));
        std::fs::write(&script.path, source.into().render())?;
        make_executable(&script.path)?;

        debug!("created temporary script {}", script.path.display());
        Ok(script)
    }

    /// Async form of [`create`](Self::create).
    pub async fn create_async(
        name: &str,
        source: impl Into<ScriptSource>,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let dir = resolve_dir(name, dir)?;
        tokio::fs::create_dir_all(&dir).await?;

        let script = Self::claim(dir.join(name));
        tokio::fs::write(&script.path, source.into().render()).await?;
        make_executable(&script.path)?;

        debug!("created temporary script {}", script.path.display());
        Ok(script)
    }

    /// Take ownership of `path` before writing it, so a failed write or
    /// permission change still removes whatever was created.
    fn claim(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Location of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed temporary script {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove temporary script {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        self.release();
    }
}

fn resolve_dir(name: &str, dir: Option<&Path>) -> Result<PathBuf> {
    if name.trim().is_empty() {
        return Err(ScriptError::EmptyScriptName);
    }

    match dir {
        Some(dir) if !dir.as_os_str().to_string_lossy().trim().is_empty() => {
            Ok(dir.to_path_buf())
        }
        _ => Ok(std::env::current_dir()?.join(DEFAULT_TEMP_DIR)),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
