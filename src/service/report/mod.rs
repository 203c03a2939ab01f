//! Error and event reporting sink.
//!
//! Components never talk to the telemetry backend directly; they are handed a [`Reporter`]
//! at construction time. Reports are fire-and-forget: a sink must never fail the caller.

pub mod tracing;

use std::{ops::Deref, sync::Arc};

use crate::base::types::Severity;

// Traits.

/// Generic reporting trait that sinks must implement.
pub trait GenericReporter: Send + Sync + 'static {
    /// Record a severity-tagged message.
    fn report(&self, severity: Severity, message: &str);

    /// Record a fatal failure; the process is about to terminate.
    fn crash(&self, message: &str);

    /// Drain anything buffered. Called once at shutdown.
    fn flush(&self);
}

// Structs.

/// Reporter for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<dyn GenericReporter>,
}

impl Deref for Reporter {
    type Target = dyn GenericReporter;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl Reporter {
    pub fn new(inner: Arc<dyn GenericReporter>) -> Self {
        Self { inner }
    }

    pub fn info(&self, message: &str) {
        self.report(Severity::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.report(Severity::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.report(Severity::Error, message);
    }
}
