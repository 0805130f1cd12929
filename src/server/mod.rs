//! Supervision of the persistent Nailgun backend server.
//!
//! ```text
//! (none) --start--> Starting --sentinel + probe--> Ready
//!                      \                             |
//!                       \---------exit---------> Exited
//! ```
//!
//! Readiness takes two steps. The server prints a sentinel line once its
//! socket is bound, then a probe verification with no input warms up the
//! backend classes. Only after the probe exits is the server `Ready`.

pub mod supervisor;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::process::ExitInfo;

pub use supervisor::BackendServerSupervisor;

/// Lifecycle phase of a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    /// Spawned; waiting for the sentinel and the liveness probe.
    Starting,
    /// The liveness probe completed.
    Ready,
    /// The process exited.
    Exited,
}

/// Notifications emitted by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The server finished its liveness probe.
    BackendReady,
    /// A stop was requested.
    Stopping,
    /// A requested stop completed.
    Stopped,
    /// The server exited without being asked to.
    Exited(ExitInfo),
}

/// Result of [`BackendServerSupervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live server already exists; nothing was done.
    AlreadyRunning,
    /// A new server process was spawned.
    Launched {
        /// OS process id of the server.
        pid: Option<u32>,
    },
    /// The server process could not be spawned; a later start may retry.
    SpawnFailed,
}

/// The supervisor's view of one server process.
///
/// The child itself is owned by a monitor task; the handle observes it
/// through a phase channel and can force-kill it.
#[derive(Debug)]
pub struct ServerHandle {
    pid: Option<u32>,
    port: u16,
    phase: watch::Receiver<ServerPhase>,
    stopping: CancellationToken,
    kill: CancellationToken,
    monitor: JoinHandle<()>,
}

impl ServerHandle {
    /// OS process id, if it was available at spawn.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Port the server listens on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ServerPhase {
        *self.phase.borrow()
    }
}

/// Shared phase publisher, held by the monitor and the probe.
type PhaseSender = Arc<watch::Sender<ServerPhase>>;

/// Optional outlet for [`SupervisorEvent`]s.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<mpsc::Sender<SupervisorEvent>>);

impl EventSink {
    pub(crate) fn emit(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.0 {
            if let Err(err) = tx.try_send(event) {
                warn!(%err, "supervisor event dropped");
            }
        }
    }
}
