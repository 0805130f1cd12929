use std::time::{Duration, Instant};

use verifier_supervisor::timed::{deadline_from_millis, with_deadline};
use verifier_supervisor::{AppError, Result};

#[test]
fn zero_millis_means_no_deadline() {
    assert_eq!(deadline_from_millis(0), None);
    assert_eq!(deadline_from_millis(250), Some(Duration::from_millis(250)));
}

#[tokio::test]
async fn never_settling_operation_times_out() {
    let started = Instant::now();
    let result: Result<()> = with_deadline(
        std::future::pending::<Result<()>>(),
        Some(Duration::from_millis(10)),
    )
    .await;

    let err = result.expect_err("pending operation must time out");
    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[tokio::test]
async fn late_result_is_never_observed() {
    let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
    let operation = async move {
        rx.await
            .map_err(|_| AppError::Io("sender dropped".into()))
    };

    let result = with_deadline(operation, Some(Duration::from_millis(10))).await;
    assert!(result.expect_err("deadline wins").is_timeout());

    // The wrapped future was dropped with the timeout, so the late send fails.
    assert!(tx.send(7).is_err(), "late settlement must have no receiver");
}

#[tokio::test]
async fn completes_like_the_operation_before_deadline() {
    let ok = with_deadline(async { Ok(5) }, Some(Duration::from_secs(5))).await;
    assert_eq!(ok.expect("completes"), 5);

    let err: Result<()> =
        with_deadline(async { Err(AppError::Server("boom".into())) }, None).await;
    assert!(matches!(err, Err(AppError::Server(_))));
}

#[tokio::test]
async fn zero_deadline_waits_indefinitely() {
    let result = with_deadline(
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok("done")
        },
        Some(Duration::ZERO),
    )
    .await;
    assert_eq!(result.expect("no deadline"), "done");
}
