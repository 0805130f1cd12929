//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The operating system could not create a process.
    Spawn(String),
    /// A deadline elapsed before the wrapped operation settled.
    Timeout(String),
    /// A counterexample model violated its quoting or structural format.
    MalformedModel(String),
    /// Abort was requested while no verification was running.
    AbortWithoutSession(String),
    /// Launch was requested while a verification is still running.
    SessionBusy(String),
    /// A platform termination command failed or found no target.
    Termination(String),
    /// The backend server exited or refused to become ready.
    Server(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::MalformedModel(msg) => write!(f, "malformed model: {msg}"),
            Self::AbortWithoutSession(msg) => write!(f, "abort without session: {msg}"),
            Self::SessionBusy(msg) => write!(f, "session busy: {msg}"),
            Self::Termination(msg) => write!(f, "termination: {msg}"),
            Self::Server(msg) => write!(f, "server: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Whether this error is a deadline expiry rather than a real failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
