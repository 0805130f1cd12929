use verifier_supervisor::process::{Platform, TerminationStrategy};

#[test]
fn strategy_follows_platform() {
    assert_eq!(
        TerminationStrategy::for_platform(Platform::Posix),
        TerminationStrategy::PosixSignals
    );
    assert_eq!(
        TerminationStrategy::for_platform(Platform::Windows),
        TerminationStrategy::WindowsWmic
    );
}

#[test]
fn posix_signals_children_then_process() {
    let steps: Vec<String> = TerminationStrategy::PosixSignals
        .commands(4242)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(steps, vec!["pkill -P 4242", "kill 4242"]);
}

#[test]
fn windows_terminates_process_and_children_in_one_step() {
    let steps = TerminationStrategy::WindowsWmic.commands(17);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].program, "wmic");
    assert_eq!(
        steps[0].args,
        vec![
            "process",
            "where",
            "ProcessId=17 or ParentProcessId=17",
            "call",
            "terminate",
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn terminating_a_missing_process_is_reported_not_fatal() {
    // Pid far above any default pid_max.
    let result = TerminationStrategy::PosixSignals.terminate(999_999_999).await;
    let err = result.expect_err("nothing to terminate");
    assert!(err.to_string().starts_with("termination:"), "{err}");
}
