#![forbid(unsafe_code)]

//! `verifier-supervisor`: runs a Nailgun-hosted verification backend.
//!
//! `serve` keeps the backend server alive until a shutdown signal,
//! `verify` runs one verification and prints its report, and the
//! `decode-model` and `fill` commands expose the counterexample decoder.

use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use verifier_supervisor::model::ModelMap;
use verifier_supervisor::process::VerificationInput;
use verifier_supervisor::runtime::{VerificationRequest, VerificationRuntime};
use verifier_supervisor::server::SupervisorEvent;
use verifier_supervisor::session::report::ReportBuilder;
use verifier_supervisor::timed::{deadline_from_millis, with_deadline};
use verifier_supervisor::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "verifier-supervisor", about = "Verification backend supervisor", version, long_about = None)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the backend server and keep it running until interrupted.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Give up if the server is not ready in time (0 waits forever).
        #[arg(long)]
        ready_timeout_ms: Option<u64>,
    },
    /// Verify one file and print the report as JSON.
    Verify {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Backend name; defaults to the first configured backend.
        #[arg(long)]
        backend: Option<String>,
        /// Verify the contents of this file, reported against <FILE>.
        #[arg(long)]
        content_from: Option<PathBuf>,
        /// File to verify.
        file: PathBuf,
    },
    /// Decode a quoted counterexample model (from stdin when omitted).
    DecodeModel {
        /// The quoted model text.
        text: Option<String>,
    },
    /// Fill model values into a trace line.
    Fill {
        /// The quoted model text.
        #[arg(long)]
        model: String,
        /// Trace line to rewrite.
        line: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    match args.command {
        Command::Serve {
            config,
            ready_timeout_ms,
        } => block_on(serve(&config, ready_timeout_ms)),
        Command::Verify {
            config,
            backend,
            content_from,
            file,
        } => block_on(verify(&config, backend, content_from, file)),
        Command::DecodeModel { text } => decode_model(text),
        Command::Fill { model, line } => {
            let model = ModelMap::try_decode(&model)?;
            println!("{}", VerificationRuntime::fill_in_values(&line, &model));
            Ok(())
        }
    }
}

fn block_on<F>(future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(future)
}

async fn serve(config_path: &Path, ready_timeout_ms: Option<u64>) -> Result<()> {
    let config = GlobalConfig::load_from_path(config_path)?;
    info!(
        port = config.nailgun_port,
        backends = config.backends.len(),
        "configuration loaded"
    );

    let (tx, mut rx) = mpsc::channel(16);
    let mut runtime = VerificationRuntime::new(config).with_events(tx);
    runtime.start_server().await?;

    let deadline = ready_timeout_ms.map_or_else(
        || runtime.config().timeouts.startup(),
        deadline_from_millis,
    );
    if let Err(err) = runtime.wait_server_ready(deadline).await {
        error!(%err, "backend server did not become ready");
        runtime.shutdown().await;
        return Err(err);
    }
    info!("backend server ready");

    let signal = shutdown_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            () = &mut signal => {
                info!("shutdown signal received");
                break;
            }
            event = rx.recv() => match event {
                Some(SupervisorEvent::Exited(exit)) => {
                    error!(%exit, "backend server exited unexpectedly");
                    runtime.shutdown().await;
                    return Err(AppError::Server(format!("backend server {exit}")));
                }
                Some(event) => debug!(?event, "supervisor event"),
                None => break,
            },
        }
    }

    runtime.shutdown().await;
    Ok(())
}

async fn verify(
    config_path: &Path,
    backend: Option<String>,
    content_from: Option<PathBuf>,
    file: PathBuf,
) -> Result<()> {
    let config = GlobalConfig::load_from_path(config_path)?;
    let input = match content_from {
        Some(source) => VerificationInput::Content {
            content: std::fs::read_to_string(&source)
                .map_err(|err| AppError::Io(format!("cannot read {}: {err}", source.display())))?,
            file,
        },
        None => VerificationInput::File(file),
    };
    let request = VerificationRequest { backend, input };

    let mut runtime = VerificationRuntime::new(config);
    runtime.start_server().await?;
    let startup = runtime.config().timeouts.startup();
    if let Err(err) = runtime.wait_server_ready(startup).await {
        runtime.shutdown().await;
        return Err(err);
    }

    let result = run_verification(&mut runtime, &request).await;
    runtime.shutdown().await;
    result
}

async fn run_verification(
    runtime: &mut VerificationRuntime,
    request: &VerificationRequest,
) -> Result<()> {
    let handle = runtime.launch_verification(request)?;
    let mut events = runtime.subscribe(&handle)?;
    info!(session_id = %handle.id, backend = %handle.backend, "verification started");

    let mut builder = ReportBuilder::new();
    let signal = shutdown_signal();
    tokio::pin!(signal);
    let interrupted = loop {
        tokio::select! {
            () = &mut signal => break true,
            event = events.recv() => {
                let Some(event) = event else { break false };
                if let Some(percent) = builder.observe(event) {
                    info!(percent, "verification progress");
                }
                if builder.is_closed() {
                    break false;
                }
            }
        }
    };

    if interrupted {
        info!("interrupted, aborting verification");
        let grace = Some(runtime.config().timeouts.stop_grace());
        let aborted = with_deadline(runtime.abort_verification(&handle, false), grace).await;
        match aborted {
            Ok(exit) => info!(%exit, "verification aborted"),
            Err(err) if err.is_timeout() => {
                warn!("verification ignored the abort, forcing it down");
                runtime.abort_verification(&handle, true).await?;
            }
            Err(err) => return Err(err),
        }
        return Err(AppError::Server("verification aborted".into()));
    }

    runtime.wait_verification(&handle).await?;
    let report = builder.finish();
    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::Io(format!("cannot render report: {err}")))?;
    println!("{json}");
    Ok(())
}

fn decode_model(text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    let model = ModelMap::try_decode(&text)?;
    let json = serde_json::to_string_pretty(&model)
        .map_err(|err| AppError::Io(format!("cannot render model: {err}")))?;
    println!("{json}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
