//! Inbound facade over one server supervisor and many verification sessions.
//!
//! Each launched verification gets its own [`SessionController`], keyed by
//! session id, so several runs may share the server concurrently. A session
//! stays registered until it is waited for or aborted. Sessions that exited
//! on their own are dropped on the next launch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::model::ModelMap;
use crate::process::command::verification;
use crate::process::{ExitInfo, TerminationStrategy, VerificationInput};
use crate::server::{BackendServerSupervisor, StartOutcome, SupervisorEvent};
use crate::session::{SessionController, SessionEvents, SessionInfo, SessionState};
use crate::{AppError, Result};

/// What to verify and with which backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Backend name; the first configured backend when absent.
    pub backend: Option<String>,
    /// Input handed to the backend.
    pub input: VerificationInput,
}

impl VerificationRequest {
    /// Verify `file` on the default backend.
    #[must_use]
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self {
            backend: None,
            input: VerificationInput::File(file.into()),
        }
    }

    /// Use the backend called `name`.
    #[must_use]
    pub fn with_backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }
}

/// Caller-side reference to a launched verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Session id.
    pub id: String,
    /// OS process id of the Nailgun client.
    pub pid: Option<u32>,
    /// Backend the run was issued against.
    pub backend: String,
}

/// Verification runtime: server lifecycle plus per-request sessions.
#[derive(Debug)]
pub struct VerificationRuntime {
    config: Arc<GlobalConfig>,
    strategy: TerminationStrategy,
    supervisor: BackendServerSupervisor,
    sessions: HashMap<String, SessionController>,
}

impl VerificationRuntime {
    /// Create a runtime for `config` with no server running.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        let config = Arc::new(config);
        Self {
            supervisor: BackendServerSupervisor::new(Arc::clone(&config)),
            config,
            strategy: TerminationStrategy::detect(),
            sessions: HashMap::new(),
        }
    }

    /// Deliver supervisor notifications to `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<SupervisorEvent>) -> Self {
        self.supervisor = self.supervisor.with_events(tx);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// The server supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &BackendServerSupervisor {
        &self.supervisor
    }

    /// Start the backend server.
    ///
    /// With `timeouts.startup_ms` set, also waits for readiness and stops
    /// the server again if it does not become ready in time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` when the server process cannot be created,
    /// or the readiness failure when a startup deadline is configured.
    pub async fn start_server(&mut self) -> Result<StartOutcome> {
        let outcome = self.supervisor.start(Arc::clone(&self.config)).await;
        self.settle_start(outcome).await
    }

    /// Wait until the server is ready.
    ///
    /// # Errors
    ///
    /// See [`BackendServerSupervisor::wait_ready`].
    pub async fn wait_server_ready(&self, deadline: Option<Duration>) -> Result<()> {
        self.supervisor.wait_ready(deadline).await
    }

    /// Stop the backend server; see [`BackendServerSupervisor::stop`].
    pub fn stop_server(&mut self) -> Option<JoinHandle<()>> {
        self.supervisor.stop()
    }

    /// Replace the configuration and restart the server with it.
    ///
    /// # Errors
    ///
    /// As for [`start_server`](Self::start_server).
    pub async fn restart_server(&mut self, config: GlobalConfig) -> Result<StartOutcome> {
        self.config = Arc::new(config);
        let outcome = self.supervisor.restart(Arc::clone(&self.config)).await;
        self.settle_start(outcome).await
    }

    async fn settle_start(&mut self, outcome: StartOutcome) -> Result<StartOutcome> {
        match outcome {
            StartOutcome::SpawnFailed => Err(AppError::Spawn(
                "backend server process could not be created".into(),
            )),
            StartOutcome::AlreadyRunning => Ok(outcome),
            StartOutcome::Launched { .. } => {
                let Some(deadline) = self.config.timeouts.startup() else {
                    return Ok(outcome);
                };
                if let Err(err) = self.supervisor.wait_ready(Some(deadline)).await {
                    warn!(%err, "backend server did not become ready, stopping it");
                    if let Some(cleanup) = self.supervisor.stop() {
                        if let Err(join_err) = cleanup.await {
                            warn!(%join_err, "server cleanup task failed");
                        }
                    }
                    return Err(err);
                }
                Ok(outcome)
            }
        }
    }

    /// Launch one verification against the ready server.
    ///
    /// Sessions whose process already exited are forgotten first, so call
    /// [`wait_verification`](Self::wait_verification) before launching again
    /// when the exit status of an earlier run is still needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` when the server is not ready,
    /// `AppError::NotFound` for an unknown backend, or `AppError::Spawn`
    /// when the client process cannot be created.
    pub fn launch_verification(&mut self, request: &VerificationRequest) -> Result<SessionHandle> {
        if !self.supervisor.is_ready() {
            return Err(AppError::Server("backend server is not ready".into()));
        }

        let backend = match request.backend.as_deref() {
            Some(name) => self.config.backend(name)?,
            None => self.config.default_backend()?,
        };
        let command = verification(&self.config, backend, &request.input);

        self.sessions
            .retain(|_, controller| controller.state() != SessionState::Idle);

        let mut controller = SessionController::new(self.strategy)
            .with_working_dir(self.config.output_directory.clone());
        let info = controller.launch(&backend.name, command)?;

        let handle = SessionHandle {
            id: info.id.clone(),
            pid: info.pid,
            backend: info.backend,
        };
        self.sessions.insert(info.id, controller);
        Ok(handle)
    }

    /// Take the event stream of a running verification.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session or when its
    /// events were already taken.
    pub fn subscribe(&mut self, handle: &SessionHandle) -> Result<SessionEvents> {
        self.sessions
            .get_mut(&handle.id)
            .and_then(SessionController::register_observers)
            .ok_or_else(|| {
                AppError::NotFound(format!("no event stream for session {}", handle.id))
            })
    }

    /// Wait for a verification to exit on its own.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session.
    pub async fn wait_verification(&mut self, handle: &SessionHandle) -> Result<ExitInfo> {
        let controller = self
            .sessions
            .get_mut(&handle.id)
            .ok_or_else(|| AppError::NotFound(format!("no session {}", handle.id)))?;
        let result = controller.wait().await;
        self.sessions.remove(&handle.id);
        result
    }

    /// Abort a verification; see [`SessionController::abort`].
    ///
    /// A session whose abort wait is abandoned stays registered, so a later
    /// call with `retry` can force it down.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AbortWithoutSession` for an unknown or finished
    /// session.
    pub async fn abort_verification(
        &mut self,
        handle: &SessionHandle,
        retry: bool,
    ) -> Result<ExitInfo> {
        let Some(controller) = self.sessions.get_mut(&handle.id) else {
            return Err(AppError::AbortWithoutSession(format!(
                "no session {}",
                handle.id
            )));
        };
        let result = controller.abort(retry).await;
        self.sessions.remove(&handle.id);
        result
    }

    /// Sessions that are still running.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<&SessionInfo> {
        self.sessions
            .values()
            .filter_map(SessionController::info)
            .collect()
    }

    /// Number of sessions still registered, finished or not.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Abort every running verification, then stop the server and wait for it.
    pub async fn shutdown(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            if let Some(mut controller) = self.sessions.remove(&id) {
                if controller.is_running() {
                    if let Err(err) = controller.abort(false).await {
                        warn!(session_id = %id, %err, "abort during shutdown failed");
                    }
                }
            }
        }
        if let Some(cleanup) = self.supervisor.stop() {
            if let Err(err) = cleanup.await {
                warn!(%err, "server cleanup task failed");
            }
        }
        info!("verification runtime shut down");
    }

    /// Decode a quoted counterexample model.
    #[must_use]
    pub fn decode_model(text: &str) -> ModelMap {
        ModelMap::decode(text)
    }

    /// Splice model values into a trace line.
    #[must_use]
    pub fn fill_in_values(line: &str, model: &ModelMap) -> String {
        crate::model::fill_in_values(line, model)
    }
}
