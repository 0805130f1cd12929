//! Per-run verification progress.

use serde::Serialize;

use crate::session::output::BackendOutput;

/// Members verified so far against the totals announced by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Methods announced.
    pub nof_methods: u32,
    /// Functions announced.
    pub nof_functions: u32,
    /// Predicates announced.
    pub nof_predicates: u32,
    /// Methods verified.
    pub current_methods: u32,
    /// Functions verified.
    pub current_functions: u32,
    /// Predicates verified.
    pub current_predicates: u32,
}

impl Progress {
    /// Seed totals from a `VerificationStart` message.
    ///
    /// Returns `None` for any other message.
    #[must_use]
    pub fn from_start(message: &BackendOutput) -> Option<Self> {
        match *message {
            BackendOutput::VerificationStart {
                nof_methods,
                nof_functions,
                nof_predicates,
            } => Some(Self {
                nof_methods,
                nof_functions,
                nof_predicates,
                ..Self::default()
            }),
            _ => None,
        }
    }

    /// Count a `…Verified` message; returns whether it advanced the progress.
    pub fn record(&mut self, message: &BackendOutput) -> bool {
        let counter = match message {
            BackendOutput::MethodVerified { .. } => &mut self.current_methods,
            BackendOutput::FunctionVerified { .. } => &mut self.current_functions,
            BackendOutput::PredicateVerified { .. } => &mut self.current_predicates,
            _ => return false,
        };
        *counter = counter.saturating_add(1);
        true
    }

    /// Completion in percent; 100 when nothing was announced.
    #[must_use]
    pub fn percent(&self) -> f64 {
        let total = u64::from(self.nof_methods)
            + u64::from(self.nof_functions)
            + u64::from(self.nof_predicates);
        if total == 0 {
            return 100.0;
        }
        let done = u64::from(self.current_methods)
            + u64::from(self.current_functions)
            + u64::from(self.current_predicates);
        let done = u32::try_from(done).unwrap_or(u32::MAX);
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        (100.0 * f64::from(done) / f64::from(total)).min(100.0)
    }
}
