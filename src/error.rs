//! Error types for script-builder.

use std::time::Duration;

use thiserror::Error;

use crate::output::StreamKind;

/// Main error type for script execution.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Temporary script name was empty or whitespace.
    #[error("temporary script name is empty")]
    EmptyScriptName,

    /// The host platform has no shell profile.
    #[error("platform not supported: {0}")]
    PlatformNotSupported(String),

    /// The shell process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A redirection pump was requested for a stream that is not piped.
    #[error("{0} is not redirected")]
    NotRedirected(StreamKind),

    /// The script did not exit before the deadline.
    #[error("script did not exit within {0:?}")]
    Timeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An async launch was attempted outside a Tokio runtime.
    #[error("no async runtime: {0}")]
    Runtime(String),
}

/// Convenience Result type for script execution.
pub type Result<T> = std::result::Result<T, ScriptError>;
