//! Progress reporting shared by all workers.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Sink for per-message progress increments.
///
/// Workers call [`advance`](ProgressSink::advance) concurrently; no ordering
/// between increments is implied.
pub trait ProgressSink: Send + Sync {
    /// Announce how many messages will be processed. Starts a new count.
    fn set_total(&self, total: usize);

    /// Record `n` more processed messages, successful or not.
    fn advance(&self, n: usize);
}

/// Lock-free progress counter.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    done: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `(done, total)`.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.done.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    pub fn is_complete(&self) -> bool {
        let (done, total) = self.snapshot();
        done >= total
    }
}

impl ProgressSink for ProgressCounter {
    fn set_total(&self, total: usize) {
        self.done.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn advance(&self, n: usize) {
        self.done.fetch_add(n, Ordering::Relaxed);
    }
}

/// Sink that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_total(&self, _total: usize) {}
    fn advance(&self, _n: usize) {}
}
