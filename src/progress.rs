//! Progress-callback trait for per-job batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the job list. The CLI renders these
//! as a progress bar; library callers can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use shotpipe::{BatchProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_job_error(&self, index: usize, total: usize, label: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {label}: {error}", index + 1, total);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { failed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::JobOutcome;
use std::sync::Arc;

/// Called by the pipeline as it processes each job.
///
/// Jobs run strictly one at a time, so calls never overlap, but the trait is
/// `Send + Sync` because the callback lives in a `Clone`able config shared
/// with blocking worker threads. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first job.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called as a job starts. `index` is 0-based.
    fn on_job_start(&self, index: usize, total_jobs: usize, label: &str) {
        let _ = (index, total_jobs, label);
    }

    /// Called when a job completes without error.
    fn on_job_complete(&self, index: usize, total_jobs: usize, outcome: &JobOutcome) {
        let _ = (index, total_jobs, outcome);
    }

    /// Called when a job fails.
    fn on_job_error(&self, index: usize, total_jobs: usize, label: &str, error: &str) {
        let _ = (index, total_jobs, label, error);
    }

    /// Called once after every job has been attempted.
    fn on_batch_complete(&self, total_jobs: usize, success_count: usize) {
        let _ = (total_jobs, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
        successes: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_jobs: usize) {
            self.batch_total.store(total_jobs, Ordering::SeqCst);
        }

        fn on_job_start(&self, _index: usize, _total: usize, _label: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _index: usize, _total: usize, _label: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total_jobs: usize, success_count: usize) {
            self.successes.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_job_start(0, 2, "a");
        cb.on_job_error(1, 2, "b", "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb = TrackingCallback::default();
        cb.on_batch_start(3);
        for i in 0..3 {
            cb.on_job_start(i, 3, "job");
        }
        cb.on_job_error(2, 3, "job", "view not found");
        cb.on_batch_complete(3, 2);

        assert_eq!(cb.batch_total.load(Ordering::SeqCst), 3);
        assert_eq!(cb.starts.load(Ordering::SeqCst), 3);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
        assert_eq!(cb.successes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_job_start(0, 1, "only");
    }
}
