use verifier_supervisor::AppError;

#[test]
fn display_carries_kind_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Spawn("x".into()), "spawn: x"),
        (AppError::Timeout("x".into()), "timeout: x"),
        (AppError::MalformedModel("x".into()), "malformed model: x"),
        (AppError::AbortWithoutSession("x".into()), "abort without session: x"),
        (AppError::SessionBusy("x".into()), "session busy: x"),
        (AppError::Termination("x".into()), "termination: x"),
        (AppError::Server("x".into()), "server: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn only_timeout_reports_is_timeout() {
    assert!(AppError::Timeout("late".into()).is_timeout());
    assert!(!AppError::Server("late".into()).is_timeout());
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err = AppError::from(io);
    assert!(matches!(err, AppError::Io(ref msg) if msg == "gone"));
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::MalformedModel("model is expected to be in quotes".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}
