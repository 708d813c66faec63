//! # script-builder
//!
//! Run ad-hoc shell scripts and capture their output.
//!
//! Scripts run through `/bin/bash` on POSIX hosts and `cmd.exe` on Windows.
//! Standard output and standard error are pumped line by line into an
//! ordered record that can be rendered as text once the script finishes,
//! or consumed as a stream while it runs.
//!
//! ## Features
//!
//! - **Cross-platform launch**: one strategy table for bash and cmd, with optional `sudo`
//! - **Ordered capture**: stdout and stderr interleaved by arrival, errors also listed separately
//! - **Buffered or streaming**: pick a reader per run
//! - **Scoped temp files**: generated scripts are removed even when the run fails
//!
//! ## Quick Start
//!
//! ```no_run
//! use script_builder::ScriptBuilder;
//!
//! fn main() -> script_builder::Result<()> {
//!     script_builder::logging::try_init().ok();
//!
//!     let builder = ScriptBuilder::new()?.privileged(false);
//!     let text = builder.build_as_script(["echo building", "ls missing-dir"])?;
//!
//!     // 12:00:01.0421 | building
//!     // 12:00:01.0437 | ls: cannot access 'missing-dir': No such file or directory
//!     //
//!     // Errors:
//!     // 12:00:01.0437 | ls: cannot access 'missing-dir': No such file or directory
//!     println!("{text}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod script;
pub mod shell;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ScriptError};
pub use execution::{ExecOptions, Execution, ScriptBuilder, ScriptExecutor};
pub use output::{
    AsyncOutput, BufferedOutput, BufferedReader, Output, ProcessOutput, ProcessOutputReader,
    StreamingOutput, StreamingReader,
};
pub use script::{ScriptSource, TempScript};
pub use shell::{Platform, RunningScript, ShellInvocation};
