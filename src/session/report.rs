//! Folding a run's events into a report.

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{fill_in_values, ModelMap};
use crate::process::ExitInfo;
use crate::session::output::{
    classify_line, BackendError, BackendOutput, ModelAccumulator, OutputLine,
};
use crate::session::progress::Progress;
use crate::session::SessionEvent;

/// Everything a finished run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    /// Backend kind announced by the `Start` message.
    pub backend_type: Option<String>,
    /// Diagnostics from `Error` messages.
    pub errors: Vec<BackendError>,
    /// Plain trace lines with model values filled in.
    pub trace: Vec<String>,
    /// Standard error lines.
    pub stderr: Vec<String>,
    /// Counterexample bindings.
    pub model: ModelMap,
    /// Final progress, if the backend announced totals.
    pub progress: Option<Progress>,
    /// Elapsed time reported by the `End` message.
    pub time: Option<String>,
    /// Whether a `Success` message arrived.
    pub succeeded: bool,
    /// How the process exited; absent if the run was aborted.
    pub exit: Option<ExitInfo>,
}

/// Incremental report construction from [`SessionEvent`]s.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    report: VerificationReport,
    models: ModelAccumulator,
    closed: bool,
}

impl ReportBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `Closed` event has been observed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fold one event in; returns the new completion percentage when progress advanced.
    pub fn observe(&mut self, event: SessionEvent) -> Option<f64> {
        match event {
            SessionEvent::Stdout(line) => self.observe_stdout(&line),
            SessionEvent::Stderr(line) => {
                debug!(line, "backend stderr");
                self.report.stderr.push(line);
                None
            }
            SessionEvent::Closed(exit) => {
                self.report.exit = Some(exit);
                self.closed = true;
                None
            }
        }
    }

    fn observe_stdout(&mut self, line: &str) -> Option<f64> {
        if line.trim().is_empty() {
            return None;
        }
        if self.models.is_pending() {
            self.absorb_model_line(line);
            return None;
        }

        match classify_line(line) {
            OutputLine::Message(message) => self.observe_message(message),
            OutputLine::ModelFragment(fragment) => {
                self.absorb_model_line(&fragment);
                None
            }
            OutputLine::Text(text) => {
                self.report.trace.push(text);
                None
            }
        }
    }

    fn absorb_model_line(&mut self, line: &str) {
        if let Some(dump) = self.models.push(line) {
            self.report.model.extend(&dump);
        }
    }

    fn observe_message(&mut self, message: BackendOutput) -> Option<f64> {
        match message {
            BackendOutput::Start { backend_type } => {
                self.report.backend_type = backend_type;
                None
            }
            start @ BackendOutput::VerificationStart { .. } => {
                self.report.progress = Progress::from_start(&start);
                Some(0.0)
            }
            verified @ (BackendOutput::MethodVerified { .. }
            | BackendOutput::FunctionVerified { .. }
            | BackendOutput::PredicateVerified { .. }) => {
                let Some(progress) = self.report.progress.as_mut() else {
                    warn!("backend reported a verified member before VerificationStart");
                    return None;
                };
                progress.record(&verified).then(|| progress.percent())
            }
            BackendOutput::Error { errors, .. } => {
                self.report.errors.extend(errors);
                None
            }
            BackendOutput::End { time } => {
                self.report.time = time;
                None
            }
            BackendOutput::Success => {
                self.report.succeeded = true;
                None
            }
            BackendOutput::Stopped | BackendOutput::Other => None,
        }
    }

    /// Finish the report, splicing model values into the trace.
    #[must_use]
    pub fn finish(mut self) -> VerificationReport {
        if let Some(partial) = self.models.take_pending() {
            warn!(partial, "model dump never closed");
        }
        let model = &self.report.model;
        self.report.trace = self
            .report
            .trace
            .iter()
            .map(|line| fill_in_values(line, model))
            .collect();
        self.report
    }
}
