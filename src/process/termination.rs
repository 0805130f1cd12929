//! Platform termination strategies for verification processes.
//!
//! The Nailgun client forks helpers of its own, so terminating a run means
//! terminating the client together with its children:
//!
//! - POSIX: `pkill -P <pid>` followed by `kill <pid>`.
//! - Windows: `wmic process where "ProcessId=<pid> or ParentProcessId=<pid>" call terminate`.
//!
//! Each step is awaited to its own exit before the next starts. A step that
//! fails (the target already exited, the tool is missing) is reported but
//! never aborts the sequence.

use tracing::{debug, warn};

use crate::process::{run_to_exit, CommandLine, Platform};
use crate::{AppError, Result};

/// Termination protocol, selected once from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStrategy {
    /// Signal the direct children, then the process itself.
    PosixSignals,
    /// Enumerate the process and its children via `wmic` and terminate them.
    WindowsWmic,
}

impl TerminationStrategy {
    /// Strategy for the platform this binary runs on.
    #[must_use]
    pub fn detect() -> Self {
        Self::for_platform(Platform::current())
    }

    /// Strategy for an explicit platform.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Posix => Self::PosixSignals,
            Platform::Windows => Self::WindowsWmic,
        }
    }

    /// External commands issued, in order, to terminate `pid`.
    #[must_use]
    pub fn commands(self, pid: u32) -> Vec<CommandLine> {
        match self {
            Self::PosixSignals => vec![
                CommandLine::new("pkill").args(["-P".to_owned(), pid.to_string()]),
                CommandLine::new("kill").arg(pid.to_string()),
            ],
            Self::WindowsWmic => vec![CommandLine::new("wmic").args([
                "process".to_owned(),
                "where".to_owned(),
                format!("ProcessId={pid} or ParentProcessId={pid}"),
                "call".to_owned(),
                "terminate".to_owned(),
            ])],
        }
    }

    /// Run every termination step for `pid`, waiting for each to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Termination` describing the steps that failed.
    /// Callers treat this as advisory: the process's own exit remains the
    /// authoritative completion signal.
    pub async fn terminate(self, pid: u32) -> Result<()> {
        let mut failures = Vec::new();

        for line in self.commands(pid) {
            debug!(pid, command = %line, "issuing termination step");
            match run_to_exit(&line).await {
                Ok(exit) if exit.success() => {}
                Ok(exit) => failures.push(format!("`{line}` {exit}")),
                Err(err) => {
                    warn!(pid, command = %line, %err, "termination step could not run");
                    if let Some(fallback) = self.fallback(pid, &line) {
                        failures.push(fallback);
                    } else {
                        failures.push(format!("`{line}`: {err}"));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Termination(failures.join("; ")))
        }
    }

    /// Deliver the final signal directly when the `kill` tool is unavailable.
    ///
    /// Returns a failure description, or `None` when the fallback succeeded.
    #[cfg(unix)]
    fn fallback(self, pid: u32, line: &CommandLine) -> Option<String> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if self != Self::PosixSignals || line.program != "kill" {
            return Some(format!("`{line}` unavailable"));
        }
        let Ok(raw) = i32::try_from(pid) else {
            return Some(format!("pid {pid} out of range"));
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {
                debug!(pid, "delivered SIGTERM directly");
                None
            }
            Err(errno) => Some(format!("SIGTERM to {pid}: {errno}")),
        }
    }

    #[cfg(not(unix))]
    fn fallback(self, _pid: u32, line: &CommandLine) -> Option<String> {
        Some(format!("`{line}` unavailable"))
    }
}
