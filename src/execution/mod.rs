//! Script execution.
//!
//! This module provides:
//! - [`ScriptExecutor`]: run a script path with a chosen output reader
//! - [`ScriptBuilder`]: write ad-hoc content to a temp script and run it
//!
//! # Example
//!
//! ```no_run
//! use script_builder::execution::ScriptBuilder;
//!
//! let builder = ScriptBuilder::new()?.privileged(false);
//! let text = builder.build_as_script(["echo hello", "echo oops >&2"])?;
//! println!("{text}");
//! # Ok::<(), script_builder::ScriptError>(())
//! ```

mod builder;
mod executor;
mod options;

pub use builder::ScriptBuilder;
pub use executor::{Execution, ScriptExecutor};
pub use options::ExecOptions;
