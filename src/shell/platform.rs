//! Platform detection and the shell strategy table.

use std::fmt;

use crate::error::ScriptError;
use crate::Result;

/// Supported platform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux, macOS and the BSDs.
    Posix,
    /// Windows.
    Windows,
}

/// How scripts are launched on one platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellProfile {
    /// Shell executable.
    pub shell: &'static str,
    /// Flag that makes the shell run its next argument as a command.
    pub command_flag: &'static str,
    /// Prefix placed before the script path for privileged runs. `None`
    /// means the platform has no elevation and the flag is ignored.
    pub privilege_prefix: Option<&'static str>,
    /// Extension for generated script files.
    pub script_extension: &'static str,
}

const POSIX_PROFILE: ShellProfile = ShellProfile {
    shell: "/bin/bash",
    command_flag: "-c",
    privilege_prefix: Some("sudo bash "),
    script_extension: "sh",
};

const WINDOWS_PROFILE: ShellProfile = ShellProfile {
    shell: "cmd.exe",
    command_flag: "/c",
    privilege_prefix: None,
    script_extension: "bat",
};

const POSIX_OS: &[&str] = &[
    "linux",
    "macos",
    "ios",
    "android",
    "freebsd",
    "netbsd",
    "openbsd",
    "dragonfly",
    "solaris",
    "illumos",
];

impl Platform {
    /// Platform of the running host.
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (as in [`std::env::consts::OS`]) to a platform.
    pub fn from_os(os: &str) -> Result<Self> {
        if os == "windows" {
            Ok(Self::Windows)
        } else if POSIX_OS.contains(&os) {
            Ok(Self::Posix)
        } else {
            Err(ScriptError::PlatformNotSupported(os.to_string()))
        }
    }

    /// Shell strategy for this platform.
    pub fn profile(&self) -> &'static ShellProfile {
        match self {
            Self::Posix => &POSIX_PROFILE,
            Self::Windows => &WINDOWS_PROFILE,
        }
    }

    /// Extension for generated script files (`sh` or `bat`).
    pub fn script_extension(&self) -> &'static str {
        self.profile().script_extension
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix => f.write_str("posix"),
            Self::Windows => f.write_str("windows"),
        }
    }
}
