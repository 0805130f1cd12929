//! Verification session controller.
//!
//! Owns the Nailgun client process of one verification run:
//!
//! ```text
//! Idle --launch--> Running --abort--> Stopping --exit--> Idle
//!                     \------------natural exit----------^
//! ```
//!
//! Aborting is a three-stage protocol: detach the observers, run the
//! platform [`TerminationStrategy`], then wait for the process's own exit.
//! The exit is the only completion signal; a termination step that finds no
//! process never blocks the sequence.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::process::codec::{is_recoverable, OutputCodec};
use crate::process::{CommandLine, ExitInfo, TerminationStrategy};
use crate::session::{ObserverSet, SessionEvent, SessionEvents, SessionState};
use crate::{AppError, Result};

/// How long the exit monitor waits for stdio to drain before publishing
/// [`SessionEvent::Closed`].
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Identity of a launched verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Unique run identifier.
    pub id: String,
    /// OS process id, absent if the process was reaped before it was read.
    pub pid: Option<u32>,
    /// Backend the run was issued against.
    pub backend: String,
    /// Command line that was spawned.
    pub command: CommandLine,
    /// Launch timestamp.
    pub started_at: DateTime<Utc>,
}

/// Bookkeeping for the process of the current run.
#[derive(Debug)]
struct ActiveSession {
    info: SessionInfo,
    observers: ObserverSet,
    events: Option<SessionEvents>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill_switch: CancellationToken,
}

impl ActiveSession {
    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }
}

/// Lifecycle controller for one verification process at a time.
///
/// Methods take `&mut self`; callers serialize launch and abort. Independent
/// controllers may run concurrently against the same server.
#[derive(Debug)]
pub struct SessionController {
    strategy: TerminationStrategy,
    working_dir: Option<PathBuf>,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Create an idle controller that terminates runs with `strategy`.
    #[must_use]
    pub fn new(strategy: TerminationStrategy) -> Self {
        Self {
            strategy,
            working_dir: None,
            state: SessionState::Idle,
            active: None,
        }
    }

    /// Run verification processes in `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Current state, accounting for a process that exited on its own.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.active {
            Some(active) if active.has_exited() => SessionState::Idle,
            _ => self.state,
        }
    }

    /// Whether a verification process is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Identity of the current run, if any.
    #[must_use]
    pub fn info(&self) -> Option<&SessionInfo> {
        self.active
            .as_ref()
            .filter(|a| !a.has_exited())
            .map(|a| &a.info)
    }

    /// Spawn a verification process and move to `Running`.
    ///
    /// Output is captured from the moment of spawn and buffered until
    /// [`register_observers`](Self::register_observers) hands it out.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionBusy` unless the controller is idle, or
    /// `AppError::Spawn` if the OS cannot create the process.
    pub fn launch(&mut self, backend: &str, command: CommandLine) -> Result<SessionInfo> {
        self.reap();
        if self.state != SessionState::Idle {
            return Err(AppError::SessionBusy(
                "a verification is already running".into(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let span = info_span!("launch_verification", session_id = %id, backend);
        let _guard = span.enter();

        let mut child = command
            .to_command(self.working_dir.as_deref())
            .spawn()
            .map_err(|err| {
                let err = AppError::Spawn(format!("failed to spawn {}: {err}", command.program));
                error!(%err, command = %command, "verification process did not start");
                err
            })?;

        let pid = child.id();
        info!(pid = pid.unwrap_or(0), command = %command, "verification process spawned");

        let (observers, events) = ObserverSet::new();
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill_switch = CancellationToken::new();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(
                id.clone(),
                stdout,
                observers.clone(),
                SessionEvent::Stdout,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                id.clone(),
                stderr,
                observers.clone(),
                SessionEvent::Stderr,
            ));
        }

        tokio::spawn(
            monitor_exit(
                id.clone(),
                child,
                readers,
                observers.clone(),
                exit_tx,
                kill_switch.clone(),
            )
            .in_current_span(),
        );

        let info = SessionInfo {
            id,
            pid,
            backend: backend.to_owned(),
            command,
            started_at: Utc::now(),
        };

        self.active = Some(ActiveSession {
            info: info.clone(),
            observers,
            events: Some(events),
            exit_rx,
            kill_switch,
        });
        self.state = SessionState::Running;

        Ok(info)
    }

    /// Hand out the event receiver of the current run.
    ///
    /// Returns `None` when idle or when the receiver was already taken.
    pub fn register_observers(&mut self) -> Option<SessionEvents> {
        self.active.as_mut().and_then(|a| a.events.take())
    }

    /// Wait for the current run to exit on its own.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no run exists, or `AppError::Io`
    /// if the exit monitor vanished without reporting.
    pub async fn wait(&mut self) -> Result<ExitInfo> {
        let Some(active) = self.active.as_mut() else {
            return Err(AppError::NotFound("no verification is running".into()));
        };
        let result = wait_for_exit(&mut active.exit_rx).await;
        self.finish();
        result
    }

    /// Abort the current run.
    ///
    /// Stage i detaches the observers, stage ii runs the termination
    /// strategy, stage iii waits for the process to exit. With `retry` the
    /// process is also force-killed; `retry` is how a caller resumes an
    /// abort whose wait it abandoned, since the controller then stays in
    /// `Stopping`. A plain abort while already `Stopping` only waits.
    ///
    /// The wait carries no deadline; wrap the call in
    /// [`with_deadline`](crate::timed::with_deadline) to bound it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AbortWithoutSession` when idle, or `AppError::Io`
    /// if the exit monitor vanished without reporting.
    pub async fn abort(&mut self, retry: bool) -> Result<ExitInfo> {
        let session_id = self
            .active
            .as_ref()
            .map(|a| a.info.id.clone())
            .unwrap_or_default();
        self.abort_inner(retry)
            .instrument(info_span!("abort_verification", session_id = %session_id, retry))
            .await
    }

    async fn abort_inner(&mut self, retry: bool) -> Result<ExitInfo> {
        info!("abort running verification");
        let previous = self.state();
        if previous == SessionState::Idle {
            self.finish();
            error!("cannot abort, verification is not running");
            return Err(AppError::AbortWithoutSession(
                "verification is not running".into(),
            ));
        }

        let strategy = self.strategy;
        let Some(active) = self.active.as_mut() else {
            self.state = SessionState::Idle;
            return Err(AppError::AbortWithoutSession(
                "verification is not running".into(),
            ));
        };

        // Stage i: nothing reaches the observers from here on.
        active.observers.detach();
        active.events = None;
        self.state = SessionState::Stopping;

        // Stage ii.
        if previous == SessionState::Running || retry {
            match active.info.pid {
                Some(pid) => {
                    if let Err(err) = strategy.terminate(pid).await {
                        warn!(pid, %err, "termination incomplete, waiting for exit");
                    }
                }
                None => debug!("process id unavailable, relying on exit"),
            }
            if retry {
                active.kill_switch.cancel();
            }
        }

        // Stage iii.
        let result = wait_for_exit(&mut active.exit_rx).await;
        self.finish();

        if let Ok(exit) = &result {
            info!(code = ?exit.code, signal = ?exit.signal, "child process exited");
        }
        result
    }

    /// Drop a run whose process already exited on its own.
    fn reap(&mut self) {
        if self.active.as_ref().is_some_and(ActiveSession::has_exited) {
            debug!("verification process exited on its own");
            self.finish();
        }
    }

    fn finish(&mut self) {
        if let Some(active) = self.active.take() {
            if self.state == SessionState::Stopping {
                active.observers.detach();
            }
        }
        self.state = SessionState::Idle;
    }
}

/// Wait for the exit monitor to report.
async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<ExitInfo>>) -> Result<ExitInfo> {
    let reported = exit_rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| AppError::Io("exit monitor ended without reporting".into()))?;
    Ok((*reported).clone().unwrap_or_default())
}

/// Forward each line of `stream` to the observers until EOF.
fn spawn_reader<R>(
    session_id: String,
    stream: R,
    observers: ObserverSet,
    wrap: fn(String) -> SessionEvent,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, OutputCodec::new());
        while let Some(item) = framed.next().await {
            match item {
                Ok(line) => observers.publish(wrap(line)),
                Err(err) if is_recoverable(&err) => {
                    warn!(session_id, %err, "skipping oversized output line");
                }
                Err(err) => {
                    warn!(session_id, %err, "output stream failed");
                    break;
                }
            }
        }
    })
}

/// Own the child until it exits, then report through `exit_tx` and the observers.
async fn monitor_exit(
    session_id: String,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    observers: ObserverSet,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    kill_switch: CancellationToken,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = kill_switch.cancelled() => {
            warn!(session_id, "force-killing verification process");
            if let Err(err) = child.start_kill() {
                warn!(session_id, %err, "force kill failed");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from(status),
        Err(err) => {
            warn!(session_id, %err, "error waiting for verification process");
            ExitInfo::default()
        }
    };
    debug!(session_id, %exit, "verification process exited");
    exit_tx.send_replace(Some(exit.clone()));

    if observers.is_detached() {
        return;
    }
    for reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
            debug!(session_id, "output still open after exit, closing anyway");
        }
    }
    observers.publish(SessionEvent::Closed(exit));
}
