//! Script materialization.
//!
//! A [`ScriptSource`] is written to a [`TempScript`], run once, and removed
//! when the `TempScript` goes out of scope.

mod source;
mod temp;

pub use source::ScriptSource;
pub use temp::{TempScript, DEFAULT_TEMP_DIR};
