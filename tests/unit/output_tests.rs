use verifier_supervisor::session::output::{
    classify_line, BackendOutput, ModelAccumulator, OutputLine,
};

#[test]
fn classifies_json_messages() {
    let line = r#"{"type":"VerificationStart","nofMethods":2,"nofFunctions":1,"nofPredicates":0}"#;
    assert_eq!(
        classify_line(line),
        OutputLine::Message(BackendOutput::VerificationStart {
            nof_methods: 2,
            nof_functions: 1,
            nof_predicates: 0,
        })
    );
}

#[test]
fn parses_error_diagnostics() {
    let line = r#"{"type":"Error","file":"a.vpr","errors":[{"tag":"assert.failed","start":"3:5","end":"3:12","message":"Assertion might fail."}]}"#;
    let OutputLine::Message(BackendOutput::Error { file, errors }) = classify_line(line) else {
        panic!("expected an error message");
    };
    assert_eq!(file.as_deref(), Some("a.vpr"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].tag.as_deref(), Some("assert.failed"));
    assert_eq!(errors[0].start, "3:5");
}

#[test]
fn unknown_message_types_are_other() {
    assert_eq!(
        classify_line(r#"{"type":"Outline","members":[]}"#),
        OutputLine::Message(BackendOutput::Other)
    );
}

#[test]
fn unit_messages_parse() {
    assert_eq!(
        classify_line(r#"{"type":"Success"}"#),
        OutputLine::Message(BackendOutput::Success)
    );
    assert_eq!(
        classify_line(r#"{"type":"End","time":"1.2s"}"#),
        OutputLine::Message(BackendOutput::End {
            time: Some("1.2s".into())
        })
    );
}

#[test]
fn invalid_json_falls_back_to_text() {
    let line = r#"{"type": oops}"#;
    assert_eq!(classify_line(line), OutputLine::Text(line.into()));
}

#[test]
fn quoted_lines_are_model_fragments() {
    assert_eq!(
        classify_line("  \"x@1 -> 5\"  "),
        OutputLine::ModelFragment("\"x@1 -> 5\"".into())
    );
}

#[test]
fn other_lines_are_text() {
    assert_eq!(
        classify_line("Silicon started"),
        OutputLine::Text("Silicon started".into())
    );
}

#[test]
fn accumulator_returns_single_line_dump() {
    let mut acc = ModelAccumulator::new();
    assert_eq!(acc.push("\"x@1 -> 5\""), Some("\"x@1 -> 5\"".into()));
    assert!(!acc.is_pending());
}

#[test]
fn accumulator_joins_multi_line_dump() {
    let mut acc = ModelAccumulator::new();
    assert_eq!(acc.push("\"x@1 -> 5"), None);
    assert!(acc.is_pending());
    assert_eq!(acc.push("y@2 -> (f"), None);
    assert_eq!(
        acc.push("1)\""),
        Some("\"x@1 -> 5 y@2 -> (f 1)\"".into())
    );
    assert!(!acc.is_pending());
}

#[test]
fn accumulator_ignores_unrelated_lines() {
    let mut acc = ModelAccumulator::new();
    assert_eq!(acc.push("plain text"), None);
    assert!(!acc.is_pending());
}

#[test]
fn lone_quote_starts_a_dump() {
    let mut acc = ModelAccumulator::new();
    assert_eq!(acc.push("\""), None);
    assert_eq!(acc.push("x@1 -> 5\""), Some("\" x@1 -> 5\"".into()));
    assert_eq!(acc.take_pending(), None);
}
