//! Diagnostic channel for per-source translation failures.

use crate::pipeline::source::SourceId;
use crate::translate::TranslateError;
use std::sync::{Arc, Mutex};

/// Trait for reporting translation failures of live sources.
///
/// Failures never surface through the sink; the original line simply stays
/// without a translation.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, source: &SourceId, error: &TranslateError);
}

/// Reporter that emits `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, source: &SourceId, error: &TranslateError) {
        tracing::warn!(source = %source, code = error.code(), "translation failed: {}", error);
    }
}

/// Reporter that keeps every failure in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<(SourceId, TranslateError)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(SourceId, TranslateError)> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, source: &SourceId, error: &TranslateError) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((source.clone(), error.clone()));
    }
}
