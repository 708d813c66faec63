//! Cross-platform shell launching.
//!
//! Each supported platform family maps to a [`ShellProfile`]:
//!
//! | Platform | Shell       | Plain              | Privileged                   |
//! |----------|-------------|--------------------|------------------------------|
//! | POSIX    | `/bin/bash` | `-c "<script>"`    | `-c "sudo bash <script>"`    |
//! | Windows  | `cmd.exe`   | `/c "<script>"`    | `/c "<script>"` (no elevation) |
//!
//! Both stdout and stderr are always piped. [`spawn`] starts a std child
//! whose pipes are pumped on threads; [`spawn_async`] starts a Tokio child
//! whose pipes are pumped as tasks on the current runtime.

mod invocation;
mod launcher;
mod platform;

pub use invocation::ShellInvocation;
pub use launcher::{launch, launch_async, spawn, spawn_async, RunningScript};
pub use platform::{Platform, ShellProfile};
