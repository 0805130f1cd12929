//! Command lines for the Nailgun server, its stop command, and verification runs.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{BackendConfig, GlobalConfig};
use crate::process::Platform;

/// Main class of the Nailgun server.
pub const NAILGUN_SERVER_CLASS: &str = "com.martiansoftware.nailgun.NGServer";

/// Loopback address the server binds to.
pub const NAILGUN_HOST: &str = "127.0.0.1";

/// A program and its arguments, passed to the OS without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable name or path.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Start a command line for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a tokio command with piped stdout/stderr and a null stdin.
    ///
    /// The child is killed when its handle is dropped.
    #[must_use]
    pub fn to_command(&self, working_dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// What a verification run should check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationInput {
    /// No input; used for the liveness probe.
    Empty,
    /// Verify a file on disk.
    File(PathBuf),
    /// Verify unsaved content, reported against `file`.
    Content {
        /// File the diagnostics belong to.
        file: PathBuf,
        /// Source text passed inline.
        content: String,
    },
}

/// Command that boots the Nailgun server with every backend on its classpath.
#[must_use]
pub fn server_launch(config: &GlobalConfig, platform: Platform) -> CommandLine {
    let separator = platform.classpath_separator().to_string();
    let classpath = std::iter::once(config.nailgun_server_jar.to_string_lossy().into_owned())
        .chain(
            config
                .backends
                .iter()
                .flat_map(|b| b.classpath.iter().cloned()),
        )
        .collect::<Vec<_>>()
        .join(&separator);

    CommandLine::new(&config.java)
        .arg("-cp")
        .arg(classpath)
        .arg("-server")
        .arg(NAILGUN_SERVER_CLASS)
        .arg(format!("{NAILGUN_HOST}:{}", config.nailgun_port))
}

/// Command that asks whatever server owns the port to shut down.
#[must_use]
pub fn server_stop(config: &GlobalConfig) -> CommandLine {
    CommandLine::new(&config.nailgun_client)
        .arg("--nailgun-port")
        .arg(config.nailgun_port.to_string())
        .arg("ng-stop")
}

/// Command for one verification run against the running server.
#[must_use]
pub fn verification(
    config: &GlobalConfig,
    backend: &BackendConfig,
    input: &VerificationInput,
) -> CommandLine {
    let mut line = CommandLine::new(&config.nailgun_client)
        .arg("--nailgun-port")
        .arg(config.nailgun_port.to_string())
        .arg(&backend.main_method)
        .arg("--ideMode");

    if config.trace_logging {
        line = line.args(["--logLevel", "trace"]);
    }

    match input {
        VerificationInput::Empty => line,
        VerificationInput::File(file) => line.arg(file.to_string_lossy()),
        VerificationInput::Content { file, content } => line
            .arg("--fileContent")
            .arg(encode_uri_component(content))
            .arg(file.to_string_lossy()),
    }
}

/// Percent-encode everything except the characters JavaScript's
/// `encodeURIComponent` leaves alone, which the backend decodes.
#[must_use]
pub fn encode_uri_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
