//! Per-run execution options.

use std::time::Duration;

/// How a script is started and waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Run through the platform's elevation prefix, if it has one.
    pub privileged: bool,
    /// Wait for exit (and for output to drain) before returning.
    pub wait_for_exit: bool,
    /// Kill the script if it runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Unprivileged, waiting, no timeout.
    pub fn new() -> Self {
        Self {
            privileged: false,
            wait_for_exit: true,
            timeout: None,
        }
    }

    /// Set whether to run privileged.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Set whether to wait for exit.
    pub fn wait_for_exit(mut self, wait: bool) -> Self {
        self.wait_for_exit = wait;
        self
    }

    /// Set the exit timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExecOptions::default();
        assert!(!options.privileged);
        assert!(options.wait_for_exit);
        assert!(options.timeout.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let options = ExecOptions::new()
            .privileged(true)
            .wait_for_exit(false)
            .timeout(Duration::from_secs(5));

        assert!(options.privileged);
        assert!(!options.wait_for_exit);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }
}
