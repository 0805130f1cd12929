use std::path::PathBuf;

use verifier_supervisor::config::GlobalConfig;
use verifier_supervisor::process::command::{
    encode_uri_component, server_launch, server_stop, verification, NAILGUN_SERVER_CLASS,
};
use verifier_supervisor::process::{CommandLine, Platform, VerificationInput};

fn config(trace_logging: bool) -> GlobalConfig {
    GlobalConfig::from_toml_str(&format!(
        r#"
java = "java"
nailgun_server_jar = "/opt/ng/nailgun-server.jar"
nailgun_client = "/opt/ng/ng"
nailgun_port = 7654
trace_logging = {trace_logging}

[[backends]]
name = "silicon"
main_method = "viper.silicon.SiliconRunner"
classpath = ["/opt/viper/silicon.jar"]

[[backends]]
name = "carbon"
main_method = "viper.carbon.Carbon"
classpath = ["/opt/viper/carbon.jar"]
"#
    ))
    .expect("config parses")
}

#[test]
fn server_launch_joins_classpath_with_posix_separator() {
    let line = server_launch(&config(true), Platform::Posix);
    assert_eq!(line.program, "java");
    assert_eq!(
        line.args,
        vec![
            "-cp",
            "/opt/ng/nailgun-server.jar:/opt/viper/silicon.jar:/opt/viper/carbon.jar",
            "-server",
            NAILGUN_SERVER_CLASS,
            "127.0.0.1:7654",
        ]
    );
}

#[test]
fn server_launch_uses_semicolon_on_windows() {
    let line = server_launch(&config(true), Platform::Windows);
    assert!(line.args[1].contains("nailgun-server.jar;/opt/viper/silicon.jar;"));
}

#[test]
fn server_stop_targets_the_port() {
    let line = server_stop(&config(true));
    assert_eq!(line.to_string(), "/opt/ng/ng --nailgun-port 7654 ng-stop");
}

#[test]
fn probe_has_no_input() {
    let cfg = config(true);
    let backend = cfg.default_backend().expect("backend");
    let line = verification(&cfg, backend, &VerificationInput::Empty);
    assert_eq!(
        line.to_string(),
        "/opt/ng/ng --nailgun-port 7654 viper.silicon.SiliconRunner --ideMode --logLevel trace"
    );
}

#[test]
fn file_verification_without_trace_logging() {
    let cfg = config(false);
    let backend = cfg.backend("carbon").expect("backend");
    let line = verification(
        &cfg,
        backend,
        &VerificationInput::File(PathBuf::from("/work/a.vpr")),
    );
    assert_eq!(
        line.args,
        vec![
            "--nailgun-port",
            "7654",
            "viper.carbon.Carbon",
            "--ideMode",
            "/work/a.vpr",
        ]
    );
}

#[test]
fn content_verification_encodes_source() {
    let cfg = config(false);
    let backend = cfg.default_backend().expect("backend");
    let input = VerificationInput::Content {
        file: PathBuf::from("a.vpr"),
        content: "method m() {}\n".into(),
    };
    let line = verification(&cfg, backend, &input);
    let at = line
        .args
        .iter()
        .position(|a| a == "--fileContent")
        .expect("content flag");
    assert_eq!(line.args[at + 1], "method%20m()%20%7B%7D%0A");
    assert_eq!(line.args.last().map(String::as_str), Some("a.vpr"));
}

#[test]
fn uri_encoding_keeps_unreserved_and_encodes_utf8() {
    assert_eq!(encode_uri_component("a-b_c.d!e~f*g'h(i)"), "a-b_c.d!e~f*g'h(i)");
    assert_eq!(encode_uri_component("x&y=z"), "x%26y%3Dz");
    assert_eq!(encode_uri_component("ä"), "%C3%A4");
}

#[test]
fn display_quotes_arguments_with_spaces() {
    let line = CommandLine::new("wmic").arg("ProcessId=1 or ParentProcessId=1");
    assert_eq!(line.to_string(), "wmic \"ProcessId=1 or ParentProcessId=1\"");
}
