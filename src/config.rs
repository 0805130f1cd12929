//! Global configuration parsing and validation.
//!
//! The configuration describes one backend installation: the Nailgun server
//! jar and client executable, the port the server listens on, and the
//! verification backends whose jars are loaded into the server.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::timed::deadline_from_millis;
use crate::{AppError, Result};

/// One verification backend hosted inside the Nailgun server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Display name (e.g., `silicon`, `carbon`).
    pub name: String,
    /// Fully-qualified main class invoked through the Nailgun client.
    pub main_method: String,
    /// Jar files appended to the server classpath.
    #[serde(default)]
    pub classpath: Vec<String>,
}

/// Timeouts (milliseconds) for supervisory waits; 0 means no timeout.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Bound on the wait for server readiness; 0 keeps the wait unbounded.
    #[serde(default)]
    pub startup_ms: u64,
    /// Grace period between the stop command and a forced kill.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_ms: 0,
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Readiness deadline, `None` when unbounded.
    #[must_use]
    pub fn startup(&self) -> Option<Duration> {
        deadline_from_millis(self.startup_ms)
    }

    /// Grace period before a stopping server is force-killed.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn default_stop_grace_ms() -> u64 {
    5000
}

fn default_java() -> String {
    "java".into()
}

fn default_nailgun_client() -> String {
    "ng".into()
}

fn default_nailgun_port() -> u16 {
    7654
}

fn default_readiness_sentinel() -> String {
    "started".into()
}

fn default_true() -> bool {
    true
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Java launcher used to boot the Nailgun server.
    #[serde(default = "default_java")]
    pub java: String,
    /// Path to the Nailgun server jar.
    pub nailgun_server_jar: PathBuf,
    /// Nailgun client executable used for verification and stop commands.
    #[serde(default = "default_nailgun_client")]
    pub nailgun_client: String,
    /// Port the Nailgun server listens on.
    #[serde(default = "default_nailgun_port")]
    pub nailgun_port: u16,
    /// Substring on server stdout that marks boot completion.
    #[serde(default = "default_readiness_sentinel")]
    pub readiness_sentinel: String,
    /// Pass `--logLevel trace` to verification runs.
    #[serde(default = "default_true")]
    pub trace_logging: bool,
    /// Working directory for verification processes.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    /// Backends hosted by the server; the first one is the default.
    pub backends: Vec<BackendConfig>,
    /// Timeout configuration for supervisory waits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// The backend used for liveness probes and unnamed requests.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no backend is configured.
    pub fn default_backend(&self) -> Result<&BackendConfig> {
        self.backends
            .first()
            .ok_or_else(|| AppError::Config("no verification backend configured".into()))
    }

    /// Look up a backend by name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no backend carries that name.
    pub fn backend(&self, name: &str) -> Result<&BackendConfig> {
        self.backends
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| AppError::NotFound(format!("backend {name} is not configured")))
    }

    fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(AppError::Config(
                "at least one backend must be configured".into(),
            ));
        }

        if self.nailgun_port == 0 {
            return Err(AppError::Config("nailgun_port must be non-zero".into()));
        }

        if self.readiness_sentinel.trim().is_empty() {
            return Err(AppError::Config(
                "readiness_sentinel must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.main_method.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "backend {} has no main_method",
                    backend.name
                )));
            }
            if !seen.insert(backend.name.to_ascii_lowercase()) {
                return Err(AppError::Config(format!(
                    "duplicate backend name {}",
                    backend.name
                )));
            }
        }

        Ok(())
    }
}
