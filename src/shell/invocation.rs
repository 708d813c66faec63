//! Shell invocation building.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::warn;

use super::platform::Platform;

/// Windows `CREATE_NO_WINDOW` process creation flag.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Everything needed to start a script through the platform shell.
///
/// Derived only from the platform, the privilege flag and the script path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    /// Shell executable.
    pub program: String,
    /// Shell flag followed by the command body.
    pub args: Vec<String>,
    /// Pipe stdout back to the caller.
    pub redirect_stdout: bool,
    /// Pipe stderr back to the caller.
    pub redirect_stderr: bool,
    /// Do not open a console window (Windows only).
    pub create_no_window: bool,
}

impl ShellInvocation {
    /// Build the invocation for `script` on `platform`.
    ///
    /// On Windows there is no elevation prefix: `privileged` is logged and
    /// ignored.
    pub fn new(platform: Platform, script: &Path, privileged: bool) -> Self {
        let profile = platform.profile();
        let script = script.display().to_string();

        let body = match (privileged, profile.privilege_prefix) {
            (true, Some(prefix)) => format!("{prefix}{script}"),
            (true, None) => {
                warn!(
                    "privileged execution is not available on {}, running {} unprivileged",
                    platform, script
                );
                script
            }
            (false, _) => script,
        };

        Self {
            program: profile.shell.to_string(),
            args: vec![profile.command_flag.to_string(), body],
            redirect_stdout: true,
            redirect_stderr: true,
            create_no_window: true,
        }
    }

    /// Full command line, e.g. `/bin/bash -c "sudo bash /tmp/x.sh"`.
    pub fn command_line(&self) -> String {
        match self.args.split_first() {
            Some((flag, rest)) if !rest.is_empty() => {
                format!("{} {} \"{}\"", self.program, flag, rest.join(" "))
            }
            _ => format!("{} {}", self.program, self.args.join(" ")),
        }
    }

    /// Short process name, e.g. `bash` or `cmd`.
    pub fn process_name(&self) -> String {
        Path::new(&self.program)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }

    /// Convert into a ready-to-spawn [`Command`].
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        if self.redirect_stdout {
            command.stdout(Stdio::piped());
        }
        if self.redirect_stderr {
            command.stderr(Stdio::piped());
        }

        #[cfg(windows)]
        if self.create_no_window {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        command
    }
}
