//! Process plumbing shared by the server supervisor and session controller.
//!
//! Covers command-line composition, platform detection, termination
//! strategies, stdio line framing, and exit status reporting.

pub mod codec;
pub mod command;
pub mod termination;

use std::fmt::{Display, Formatter};
use std::process::{ExitStatus, Stdio};

use serde::Serialize;
use tokio::process::Command;

use crate::{AppError, Result};

pub use command::{CommandLine, VerificationInput};
pub use termination::TerminationStrategy;

/// Operating-system family, detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows family: `;` classpath separator, `wmic` termination.
    Windows,
    /// POSIX family: `:` classpath separator, `pkill`/`kill` termination.
    Posix,
}

impl Platform {
    /// Platform this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    /// Separator between Java classpath entries.
    #[must_use]
    pub fn classpath_separator(self) -> char {
        match self {
            Self::Windows => ';',
            Self::Posix => ':',
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
    /// Name of the terminating signal (POSIX only).
    pub signal: Option<String>,
}

impl ExitInfo {
    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: signal_name(status),
        }
    }
}

impl Display for ExitInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal.as_deref()) {
            (Some(code), _) => write!(f, "exited with code {code}"),
            (None, Some(signal)) => write!(f, "terminated by {signal}"),
            (None, None) => write!(f, "terminated"),
        }
    }
}

/// Run `line` with all stdio discarded and wait for it to exit.
///
/// Dropping the future kills the program.
///
/// # Errors
///
/// Returns `AppError::Spawn` when the program cannot be started.
pub async fn run_to_exit(line: &CommandLine) -> Result<ExitInfo> {
    let status = Command::new(&line.program)
        .args(&line.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|err| AppError::Spawn(format!("failed to run {}: {err}", line.program)))?;
    Ok(ExitInfo::from(status))
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let raw = status.signal()?;
    Some(
        nix::sys::signal::Signal::try_from(raw)
            .map_or_else(|_| format!("signal {raw}"), |sig| sig.as_str().to_owned()),
    )
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}
