//! Classification of verification output lines.
//!
//! In IDE mode the backend writes three kinds of stdout lines:
//!
//! | Shape              | Meaning                                     |
//! |--------------------|---------------------------------------------|
//! | `{"type": …}`      | [`BackendOutput`] JSON message              |
//! | `"… -> …"`         | Counterexample model, possibly multi-line   |
//! | anything else      | Plain trace text                            |

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One diagnostic reported in an `Error` message.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendError {
    /// Error category such as `typechecker.error` or `parser.error`.
    #[serde(default)]
    pub tag: Option<String>,
    /// Start position, `line:column`.
    #[serde(default)]
    pub start: String,
    /// End position, `line:column`.
    #[serde(default)]
    pub end: String,
    /// Human-readable message.
    pub message: String,
}

/// JSON messages emitted by the backend in IDE mode.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BackendOutput {
    /// The backend identified itself.
    Start {
        /// Backend kind, e.g. `Silicon`.
        #[serde(rename = "backendType", default)]
        backend_type: Option<String>,
    },
    /// Verification began; totals seed the progress tracker.
    VerificationStart {
        /// Methods to verify.
        #[serde(rename = "nofMethods", default)]
        nof_methods: u32,
        /// Functions to verify.
        #[serde(rename = "nofFunctions", default)]
        nof_functions: u32,
        /// Predicates to verify.
        #[serde(rename = "nofPredicates", default)]
        nof_predicates: u32,
    },
    /// A method finished verifying.
    MethodVerified {
        /// Method name.
        #[serde(default)]
        name: Option<String>,
    },
    /// A function finished verifying.
    FunctionVerified {
        /// Function name.
        #[serde(default)]
        name: Option<String>,
    },
    /// A predicate finished verifying.
    PredicateVerified {
        /// Predicate name.
        #[serde(default)]
        name: Option<String>,
    },
    /// Verification errors for one file.
    Error {
        /// File the errors belong to.
        #[serde(default)]
        file: Option<String>,
        /// Reported diagnostics.
        #[serde(default)]
        errors: Vec<BackendError>,
    },
    /// Verification ended.
    End {
        /// Elapsed time as printed by the backend, e.g. `1.234s`.
        #[serde(default)]
        time: Option<String>,
    },
    /// Verification succeeded.
    Success,
    /// The backend stopped.
    Stopped,
    /// Any message type this runtime does not act on (outline, definitions…).
    #[serde(other)]
    Other,
}

/// A classified stdout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A JSON message.
    Message(BackendOutput),
    /// A line that starts (or continues) a quoted model dump.
    ModelFragment(String),
    /// Plain trace text.
    Text(String),
}

/// Classify one stdout line.
///
/// A line that looks like JSON but fails to parse is logged and kept as text.
#[must_use]
pub fn classify_line(line: &str) -> OutputLine {
    let trimmed = line.trim();
    if trimmed.starts_with("{\"") && trimmed.ends_with('}') {
        return match serde_json::from_str::<BackendOutput>(trimmed) {
            Ok(message) => OutputLine::Message(message),
            Err(err) => {
                warn!(%err, raw_line = trimmed, "cannot parse backend message");
                OutputLine::Text(line.to_owned())
            }
        };
    }
    if trimmed.starts_with('"') {
        return OutputLine::ModelFragment(trimmed.to_owned());
    }
    OutputLine::Text(line.to_owned())
}

/// Joins a quoted model dump that the backend split across lines.
#[derive(Debug, Default)]
pub struct ModelAccumulator {
    partial: Option<String>,
}

impl ModelAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a dump has started but not yet closed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one line; returns the complete dump once its closing quote arrives.
    ///
    /// Lines are joined with a single space. Lines that neither start nor
    /// continue a dump are ignored.
    pub fn push(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        let dump = match self.partial.take() {
            Some(mut partial) => {
                partial.push(' ');
                partial.push_str(line);
                partial
            }
            None if line.starts_with('"') => line.to_owned(),
            None => return None,
        };

        if dump.len() >= 2 && dump.ends_with('"') {
            Some(dump)
        } else {
            self.partial = Some(dump);
            None
        }
    }

    /// Discard an unterminated dump, returning it for diagnostics.
    pub fn take_pending(&mut self) -> Option<String> {
        self.partial.take()
    }
}
