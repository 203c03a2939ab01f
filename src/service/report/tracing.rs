//! Reporter that emits `tracing` events.
//!
//! With the OTLP layer installed by the binary, these events travel with the active span to the
//! collector; otherwise they end up in the log output.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tracing::{debug, error, info, warn};

use crate::base::types::Severity;

use super::{GenericReporter, Reporter};

// Extra methods on `Reporter` applied by the tracing implementation.

impl Reporter {
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingReporter::default()))
    }
}

// Specific implementations.

/// Tracing-backed reporter.
#[derive(Default)]
pub struct TracingReporter {
    reported: AtomicU64,
}

impl TracingReporter {
    /// Number of reports and crashes recorded so far.
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

impl GenericReporter for TracingReporter {
    fn report(&self, severity: Severity, message: &str) {
        self.reported.fetch_add(1, Ordering::Relaxed);

        match severity {
            Severity::Info => info!(target: "report", "{}", message),
            Severity::Warning => warn!(target: "report", "{}", message),
            Severity::Error => error!(target: "report", "{}", message),
        }
    }

    fn crash(&self, message: &str) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        error!(target: "report", fatal = true, "{}", message);
    }

    fn flush(&self) {
        debug!(target: "report", "Flushed {} reports.", self.reported());
    }
}
