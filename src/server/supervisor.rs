//! Backend server supervisor.
//!
//! Owns at most one server process. Starting first asks any stale server
//! on the port to stop, then spawns a fresh one and watches its stdout for
//! the readiness sentinel. Stopping detaches the handle at once and finishes
//! the shutdown in a background cleanup task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::process::codec::{is_recoverable, OutputCodec};
use crate::process::command::{server_launch, server_stop, verification};
use crate::process::{run_to_exit, ExitInfo, Platform, TerminationStrategy, VerificationInput};
use crate::server::{
    EventSink, PhaseSender, ServerHandle, ServerPhase, StartOutcome, SupervisorEvent,
};
use crate::session::SessionController;
use crate::timed::with_deadline;
use crate::{AppError, Result};

/// Supervisor of the persistent backend server.
///
/// Methods take `&mut self`; callers serialize start, stop and restart.
#[derive(Debug)]
pub struct BackendServerSupervisor {
    config: Arc<GlobalConfig>,
    platform: Platform,
    strategy: TerminationStrategy,
    events: EventSink,
    handle: Option<ServerHandle>,
}

impl BackendServerSupervisor {
    /// Create a supervisor with no server running.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let platform = Platform::current();
        Self {
            config,
            platform,
            strategy: TerminationStrategy::for_platform(platform),
            events: EventSink::default(),
            handle: None,
        }
    }

    /// Deliver [`SupervisorEvent`]s to `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<SupervisorEvent>) -> Self {
        self.events = EventSink(Some(tx));
        self
    }

    /// Configuration the current (or next) server is started with.
    #[must_use]
    pub fn config(&self) -> &Arc<GlobalConfig> {
        &self.config
    }

    /// Whether a live server handle exists.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.phase() != ServerPhase::Exited)
    }

    /// Whether the live server completed its liveness probe.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.phase() == ServerPhase::Ready)
    }

    /// The current server handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<&ServerHandle> {
        self.handle.as_ref().filter(|h| h.phase() != ServerPhase::Exited)
    }

    /// Start the server with `config` unless one is already running.
    ///
    /// Failures are logged and reported through the outcome, never raised.
    /// Readiness is not awaited here; see [`wait_ready`](Self::wait_ready).
    pub async fn start(&mut self, config: Arc<GlobalConfig>) -> StartOutcome {
        if self.is_running() {
            info!(port = self.config.nailgun_port, "backend server already running");
            return StartOutcome::AlreadyRunning;
        }
        self.config = config;
        self.handle = None;

        let span = info_span!("start_server", port = self.config.nailgun_port);
        self.start_inner().instrument(span).await
    }

    async fn start_inner(&mut self) -> StartOutcome {
        let config = Arc::clone(&self.config);

        // Reclaim the port from a server left behind by an earlier run.
        let stale = server_stop(&config);
        match with_deadline(run_to_exit(&stale), Some(config.timeouts.stop_grace())).await {
            Ok(exit) => debug!(command = %stale, %exit, "stale server stop issued"),
            Err(err) => debug!(command = %stale, %err, "stale server stop unavailable"),
        }

        let command = server_launch(&config, self.platform);
        info!(command = %command, "starting backend server");
        let mut child = match command.to_command(None).spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(command = %command, %err, "backend server did not start");
                return StartOutcome::SpawnFailed;
            }
        };

        let pid = child.id();
        info!(pid = pid.unwrap_or(0), "backend server spawned");

        let (phase_tx, phase_rx) = watch::channel(ServerPhase::Starting);
        let stopping = CancellationToken::new();
        let kill = CancellationToken::new();

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr).in_current_span());
        }
        let watcher = ServerWatch {
            config,
            strategy: self.strategy,
            phase: Arc::new(phase_tx),
            events: self.events.clone(),
            stopping: stopping.clone(),
            kill: kill.clone(),
        };
        let stdout = child.stdout.take();
        let monitor = tokio::spawn(watcher.run(child, stdout).in_current_span());

        self.handle = Some(ServerHandle {
            pid,
            port: self.config.nailgun_port,
            phase: phase_rx,
            stopping,
            kill,
            monitor,
        });
        StartOutcome::Launched { pid }
    }

    /// Wait until the server leaves `Starting`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` when no server exists or it exited before
    /// becoming ready, or `AppError::Timeout` when `deadline` elapses first.
    pub async fn wait_ready(&self, deadline: Option<Duration>) -> Result<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(AppError::Server("backend server is not running".into()));
        };
        let mut phase = handle.phase.clone();
        with_deadline(
            async move {
                let settled = phase
                    .wait_for(|p| *p != ServerPhase::Starting)
                    .await
                    .map(|p| *p);
                match settled {
                    Ok(ServerPhase::Ready) => Ok(()),
                    _ => Err(AppError::Server(
                        "backend server exited before it became ready".into(),
                    )),
                }
            },
            deadline,
        )
        .await
    }

    /// Stop the current server, then start one with `config`.
    pub async fn restart(&mut self, config: Arc<GlobalConfig>) -> StartOutcome {
        if let Some(cleanup) = self.stop() {
            if let Err(err) = cleanup.await {
                warn!(%err, "server cleanup task failed");
            }
        }
        self.start(config).await
    }

    /// Stop the server.
    ///
    /// The handle is detached immediately, so `is_running` is false on
    /// return. The returned task sends the stop command, force-kills the
    /// process if it has not exited within the grace period (counted from
    /// when the stop command is issued, hung or not), and emits
    /// [`SupervisorEvent::Stopped`]. Dropping the task handle is fine.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.events.emit(SupervisorEvent::Stopping);
        let Some(handle) = self.handle.take() else {
            debug!("no backend server to stop");
            self.events.emit(SupervisorEvent::Stopped);
            return None;
        };
        handle.stopping.cancel();

        let config = Arc::clone(&self.config);
        let events = self.events.clone();
        let span = info_span!("stop_server", pid = handle.pid.unwrap_or(0), port = handle.port);
        Some(tokio::spawn(
            async move {
                info!("stopping backend server");
                let command = server_stop(&config);
                let mut phase = handle.phase;

                // The grace period covers the stop command itself.
                let stop_sent = async {
                    if let Err(err) = run_to_exit(&command).await {
                        warn!(command = %command, %err, "stop command could not run");
                    }
                    std::future::pending::<()>().await;
                };
                let exited = async {
                    tokio::select! {
                        _ = phase.wait_for(|p| *p == ServerPhase::Exited) => {}
                        () = stop_sent => {}
                    }
                };
                let settled = tokio::time::timeout(config.timeouts.stop_grace(), exited)
                    .await
                    .is_ok();
                if !settled {
                    warn!("backend server ignored the stop command, killing it");
                    handle.kill.cancel();
                }
                if let Err(err) = handle.monitor.await {
                    warn!(%err, "server monitor task failed");
                }

                info!("backend server stopped");
                events.emit(SupervisorEvent::Stopped);
            }
            .instrument(span),
        ))
    }
}

/// State shared by the monitor task and the liveness probe.
#[derive(Debug, Clone)]
struct ServerWatch {
    config: Arc<GlobalConfig>,
    strategy: TerminationStrategy,
    phase: PhaseSender,
    events: EventSink,
    stopping: CancellationToken,
    kill: CancellationToken,
}

impl ServerWatch {
    /// Own the server child until it exits.
    async fn run(self, mut child: Child, stdout: Option<ChildStdout>) {
        let mut lines = stdout.map(|s| FramedRead::new(s, OutputCodec::new()));
        let mut probe: Option<JoinHandle<()>> = None;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                () = self.kill.cancelled() => {
                    if let Err(err) = child.start_kill() {
                        warn!(%err, "force kill failed");
                    }
                    break child.wait().await;
                }
                line = next_line(&mut lines) => match line {
                    Some(Ok(line)) => {
                        debug!(line, "backend server output");
                        if probe.is_none() && line.contains(&self.config.readiness_sentinel) {
                            info!("backend server started, probing backend");
                            probe = Some(tokio::spawn(self.clone().probe().in_current_span()));
                        }
                    }
                    Some(Err(err)) if is_recoverable(&err) => {
                        warn!(%err, "skipping oversized server output line");
                    }
                    Some(Err(err)) => {
                        warn!(%err, "server output stream failed");
                        lines = None;
                    }
                    None => lines = None,
                },
            }
        };

        if let Some(probe) = probe {
            probe.abort();
        }
        let exit = match status {
            Ok(status) => ExitInfo::from(status),
            Err(err) => {
                warn!(%err, "error waiting for backend server");
                ExitInfo::default()
            }
        };
        self.phase.send_replace(ServerPhase::Exited);

        if self.stopping.is_cancelled() {
            debug!(%exit, "backend server exited");
        } else {
            warn!(%exit, "backend server exited unexpectedly");
            self.events.emit(SupervisorEvent::Exited(exit));
        }
    }

    /// Run one verification with no input; its exit marks the server ready.
    async fn probe(self) {
        let backend = match self.config.default_backend() {
            Ok(backend) => backend,
            Err(err) => {
                error!(%err, "no backend to probe");
                return;
            }
        };
        let command = verification(&self.config, backend, &VerificationInput::Empty);
        let mut controller = SessionController::new(self.strategy);
        if let Err(err) = controller.launch(&backend.name, command) {
            warn!(%err, "liveness probe did not start");
            return;
        }
        match controller.wait().await {
            Ok(exit) => debug!(%exit, "liveness probe finished"),
            Err(err) => {
                warn!(%err, "liveness probe lost");
                return;
            }
        }

        let became_ready = self.phase.send_if_modified(|phase| {
            if *phase == ServerPhase::Starting {
                *phase = ServerPhase::Ready;
                true
            } else {
                false
            }
        });
        if became_ready {
            info!("backend server ready");
            self.events.emit(SupervisorEvent::BackendReady);
        }
    }
}

/// Next stdout line, pending forever once the stream is gone.
async fn next_line(
    lines: &mut Option<FramedRead<ChildStdout, OutputCodec>>,
) -> Option<Result<String>> {
    match lines {
        Some(framed) => framed.next().await,
        None => std::future::pending().await,
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = FramedRead::new(stderr, OutputCodec::new());
    while let Some(item) = lines.next().await {
        match item {
            Ok(line) => debug!(line, "backend server stderr"),
            Err(err) if is_recoverable(&err) => {}
            Err(_) => break,
        }
    }
}
