//! Backend server supervision with a fake Nailgun installation.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio::sync::mpsc;
use verifier_supervisor::server::{
    BackendServerSupervisor, ServerPhase, StartOutcome, SupervisorEvent,
};
use verifier_supervisor::AppError;

use super::test_helpers::{
    FakeInstall, SERVER_CRASHING, SERVER_READY, SERVER_SILENT, SERVER_STUBBORN, TEST_WAIT,
    VERIFY_FAILING,
};

fn supervisor(install: &FakeInstall) -> (BackendServerSupervisor, mpsc::Receiver<SupervisorEvent>) {
    let (tx, rx) = mpsc::channel(32);
    let config = Arc::new(install.config());
    (BackendServerSupervisor::new(config).with_events(tx), rx)
}

async fn next_supervisor_event(rx: &mut mpsc::Receiver<SupervisorEvent>) -> SupervisorEvent {
    tokio::time::timeout(TEST_WAIT, rx.recv())
        .await
        .expect("event within deadline")
        .expect("event channel open")
}

#[tokio::test]
#[serial]
async fn start_becomes_ready_after_probe() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let (mut sup, mut rx) = supervisor(&install);
    let config = Arc::clone(sup.config());

    let outcome = sup.start(config).await;
    assert!(matches!(outcome, StartOutcome::Launched { pid: Some(_) }));
    assert!(sup.is_running());

    sup.wait_ready(Some(TEST_WAIT)).await.expect("server ready");
    assert!(sup.is_ready());
    assert_eq!(next_supervisor_event(&mut rx).await, SupervisorEvent::BackendReady);
    assert_eq!(sup.handle().map(|h| h.phase()), Some(ServerPhase::Ready));

    if let Some(cleanup) = sup.stop() {
        cleanup.await.expect("cleanup");
    }
}

#[tokio::test]
#[serial]
async fn second_start_keeps_single_server() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let (mut sup, _rx) = supervisor(&install);
    let config = Arc::clone(sup.config());

    let StartOutcome::Launched { pid } = sup.start(Arc::clone(&config)).await else {
        panic!("first start must launch");
    };
    sup.wait_ready(Some(TEST_WAIT)).await.expect("server ready");

    assert_eq!(sup.start(config).await, StartOutcome::AlreadyRunning);
    assert_eq!(sup.handle().and_then(|h| h.pid()), pid);

    if let Some(cleanup) = sup.stop() {
        cleanup.await.expect("cleanup");
    }
}

#[tokio::test]
#[serial]
async fn stop_detaches_immediately_and_reports_stopped() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let (mut sup, mut rx) = supervisor(&install);
    let config = Arc::clone(sup.config());
    sup.start(config).await;
    sup.wait_ready(Some(TEST_WAIT)).await.expect("server ready");
    assert_eq!(next_supervisor_event(&mut rx).await, SupervisorEvent::BackendReady);

    let cleanup = sup.stop().expect("cleanup task");
    assert!(!sup.is_running());
    assert!(!sup.is_ready());
    assert_eq!(next_supervisor_event(&mut rx).await, SupervisorEvent::Stopping);

    tokio::time::timeout(TEST_WAIT, cleanup)
        .await
        .expect("cleanup in time")
        .expect("cleanup");
    assert_eq!(next_supervisor_event(&mut rx).await, SupervisorEvent::Stopped);
    assert!(!install.server_pid_file().exists(), "stop command reached the server");
}

#[tokio::test]
#[serial]
async fn hung_stop_command_still_kills_server_after_grace() {
    let install = FakeInstall::new(SERVER_STUBBORN, VERIFY_FAILING);
    let (mut sup, mut rx) = supervisor(&install);
    let config = Arc::clone(sup.config());
    sup.start(config).await;
    sup.wait_ready(Some(TEST_WAIT)).await.expect("server ready");
    install.hang_client();

    let cleanup = sup.stop().expect("cleanup task");
    tokio::time::timeout(Duration::from_secs(3), cleanup)
        .await
        .expect("cleanup bounded by the grace period")
        .expect("cleanup");

    let mut saw_stopped = false;
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, SupervisorEvent::Exited(_)), "requested stop is not a crash");
        saw_stopped |= event == SupervisorEvent::Stopped;
    }
    assert!(saw_stopped);
}

#[tokio::test]
#[serial]
async fn stubborn_server_is_killed_after_grace() {
    let install = FakeInstall::new(SERVER_STUBBORN, VERIFY_FAILING);
    let (mut sup, mut rx) = supervisor(&install);
    let config = Arc::clone(sup.config());
    sup.start(config).await;
    sup.wait_ready(Some(TEST_WAIT)).await.expect("server ready");

    let cleanup = sup.stop().expect("cleanup task");
    tokio::time::timeout(TEST_WAIT, cleanup)
        .await
        .expect("cleanup in time")
        .expect("cleanup");

    let mut saw_stopped = false;
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, SupervisorEvent::Exited(_)), "requested stop is not a crash");
        saw_stopped |= event == SupervisorEvent::Stopped;
    }
    assert!(saw_stopped);
}

#[tokio::test]
#[serial]
async fn stop_without_server_is_harmless() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let (mut sup, mut rx) = supervisor(&install);
    assert!(sup.stop().is_none());
    assert_eq!(next_supervisor_event(&mut rx).await, SupervisorEvent::Stopping);
    assert_eq!(next_supervisor_event(&mut rx).await, SupervisorEvent::Stopped);
}

#[tokio::test]
#[serial]
async fn restart_replaces_the_server() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let (mut sup, _rx) = supervisor(&install);
    let config = Arc::clone(sup.config());

    let StartOutcome::Launched { pid: first } = sup.start(Arc::clone(&config)).await else {
        panic!("first start must launch");
    };
    sup.wait_ready(Some(TEST_WAIT)).await.expect("server ready");

    let StartOutcome::Launched { pid: second } = sup.restart(config).await else {
        panic!("restart must launch");
    };
    assert_ne!(first, second);
    sup.wait_ready(Some(TEST_WAIT)).await.expect("restarted server ready");

    if let Some(cleanup) = sup.stop() {
        cleanup.await.expect("cleanup");
    }
}

#[tokio::test]
#[serial]
async fn missing_java_is_spawn_failure() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let mut config = install.config();
    config.java = install.path().join("no-such-java").display().to_string();
    let mut sup = BackendServerSupervisor::new(Arc::new(config.clone()));

    assert_eq!(sup.start(Arc::new(config)).await, StartOutcome::SpawnFailed);
    assert!(!sup.is_running());

    // A later start with a working launcher succeeds.
    let outcome = sup.start(Arc::new(install.config())).await;
    assert!(matches!(outcome, StartOutcome::Launched { .. }));
    if let Some(cleanup) = sup.stop() {
        cleanup.await.expect("cleanup");
    }
}

#[tokio::test]
#[serial]
async fn missing_sentinel_keeps_server_starting() {
    let install = FakeInstall::new(SERVER_SILENT, VERIFY_FAILING);
    let (mut sup, _rx) = supervisor(&install);
    let config = Arc::clone(sup.config());
    sup.start(config).await;

    let err = sup
        .wait_ready(Some(Duration::from_millis(200)))
        .await
        .expect_err("never ready");
    assert!(err.is_timeout());
    assert!(sup.is_running());
    assert_eq!(sup.handle().map(|h| h.phase()), Some(ServerPhase::Starting));

    if let Some(cleanup) = sup.stop() {
        cleanup.await.expect("cleanup");
    }
}

#[tokio::test]
#[serial]
async fn crash_during_boot_is_reported() {
    let install = FakeInstall::new(SERVER_CRASHING, VERIFY_FAILING);
    let (mut sup, mut rx) = supervisor(&install);
    let config = Arc::clone(sup.config());
    sup.start(config).await;

    let err = sup.wait_ready(Some(TEST_WAIT)).await.expect_err("crashed");
    assert!(matches!(err, AppError::Server(_)));
    let SupervisorEvent::Exited(exit) = next_supervisor_event(&mut rx).await else {
        panic!("expected an exit event");
    };
    assert_eq!(exit.code, Some(2));
    assert!(!sup.is_running());
}

#[tokio::test]
#[serial]
async fn wait_ready_without_server_fails() {
    let install = FakeInstall::new(SERVER_READY, VERIFY_FAILING);
    let (sup, _rx) = supervisor(&install);
    let err = sup.wait_ready(None).await.expect_err("no server");
    assert!(matches!(err, AppError::Server(_)));
}
