//! # Training Progress Reporting
//!
//! Classifiers are grown on a rayon pool, so progress arrives out of order
//! and from multiple threads. Sinks must be cheap and thread-safe; the
//! default sink forwards milestones to `tracing`.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Receives completion events while an ensemble trains.
pub trait ProgressSink: Send + Sync {
    /// Called once per finished classifier.
    fn classifier_done(&self, total: usize, oob_accuracy: f64);
}

/// Logs a line per finished classifier with a running count.
#[derive(Debug, Default)]
pub struct TracingProgress {
    completed: AtomicUsize,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for TracingProgress {
    fn classifier_done(&self, total: usize, oob_accuracy: f64) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        info!(done, total, oob_accuracy, "classifier trained");
    }
}

/// Discards all events. For library callers and tests.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn classifier_done(&self, _total: usize, _oob_accuracy: f64) {}
}
