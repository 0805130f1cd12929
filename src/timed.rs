//! Deadline wrapper for long-running supervisory operations.
//!
//! The wrapped future is dropped when the deadline wins, so its eventual
//! result is never observed. Processes it may have spawned are not touched.

use std::future::Future;
use std::time::Duration;

use crate::{AppError, Result};

/// Convert a millisecond setting into an optional deadline.
///
/// Zero means "never expires".
#[must_use]
pub fn deadline_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Run `operation`, failing with [`AppError::Timeout`] if `deadline` elapses first.
///
/// A `None` or zero deadline waits indefinitely.
///
/// # Errors
///
/// Returns the wrapped operation's error unchanged, or `AppError::Timeout`
/// when the deadline elapses before the operation settles.
pub async fn with_deadline<F, T>(operation: F, deadline: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline.filter(|d| !d.is_zero()) {
        None => operation.await,
        Some(limit) => match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_elapsed) => Err(AppError::Timeout(format!("timed out after {limit:?}"))),
        },
    }
}
