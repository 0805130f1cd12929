//! Verification sessions: one Nailgun client process per request.
//!
//! The [`controller`] owns the process lifecycle. Output reaches the caller
//! as [`SessionEvent`]s through a [`SessionEvents`] receiver; detaching the
//! observer set silences the receiver immediately, even for events already
//! queued.

pub mod controller;
pub mod output;
pub mod progress;
pub mod report;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::process::ExitInfo;

pub use controller::{SessionController, SessionInfo};

/// Lifecycle state of a [`SessionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No process is running.
    Idle,
    /// A verification process is running.
    Running,
    /// An abort has been issued and the process has not exited yet.
    Stopping,
}

/// Output and completion events of one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One line of standard output.
    Stdout(String),
    /// One line of standard error.
    Stderr(String),
    /// The process exited and its output streams are drained.
    Closed(ExitInfo),
}

/// Publishing side of a session's observers.
///
/// Cloned into every reader task. [`detach`](Self::detach) drops the
/// channel sender and flips the shared token, after which nothing more is
/// published or received.
#[derive(Debug, Clone)]
pub(crate) struct ObserverSet {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>>,
    detached: CancellationToken,
}

impl ObserverSet {
    pub(crate) fn new() -> (Self, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let detached = CancellationToken::new();
        let set = Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            detached: detached.clone(),
        };
        (set, SessionEvents { rx, detached })
    }

    /// Deliver `event` unless the observers have been detached.
    pub(crate) fn publish(&self, event: SessionEvent) {
        if self.detached.is_cancelled() {
            return;
        }
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Stop delivering events. Idempotent.
    pub(crate) fn detach(&self) {
        self.detached.cancel();
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.is_cancelled()
    }
}

/// Receiving side of a session's observers.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    detached: CancellationToken,
}

impl SessionEvents {
    /// Next event, or `None` once the run is over or observers were detached.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        if self.detached.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.detached.cancelled() => None,
            event = self.rx.recv() => event.filter(|_| !self.detached.is_cancelled()),
        }
    }

    /// Whether the controller detached this receiver.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.is_cancelled()
    }
}
