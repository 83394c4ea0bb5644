//! Cooperative cancellation for long-running interpretation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared interrupt flag checked by the content interpreter between operators.
///
/// Clones share the flag, so one handle can be given to a worker and another
/// kept by whoever may cancel it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Clear the flag so the work can be retried.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.cancelled.load(Ordering::Relaxed)
    }

    /// How many times the flag has been polled.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }
}
