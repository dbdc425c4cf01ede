//! Streaming capture API: emit job outcomes as they complete.
//!
//! ## Why stream?
//!
//! A batch of office exports takes minutes. A stream-based API lets callers
//! show each screenshot as soon as it is written, or stop early, instead of
//! waiting for the whole [`crate::output::BatchReport`].
//!
//! Unlike the eager [`crate::batch::run_batch`], [`capture_stream`] yields
//! one [`JobOutcome`] per job. Jobs still run one at a time, so outcomes
//! arrive in manifest order. Progress callbacks in the config fire exactly as
//! they do for the eager API, except `on_batch_complete`, which has no
//! natural point in a stream the caller may drop early.

use crate::batch;
use crate::capture::{OfficeRenderer, ViewRenderer};
use crate::config::PipelineConfig;
use crate::error::ShotpipeError;
use crate::job::JobManifest;
use crate::output::JobOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of job outcomes.
pub type JobStream = Pin<Box<dyn Stream<Item = Result<JobOutcome, ShotpipeError>> + Send>>;

/// Capture every job in `manifest`, streaming outcomes as they are ready.
///
/// # Returns
/// - `Ok(JobStream)`: one item per job; a job failure is an `Ok` outcome
///   with `error` set, an `Err` item only means a worker panicked
/// - `Err(ShotpipeError)`: fatal error before any job ran (office suite or
///   pdfium unavailable)
///
/// # Example
/// ```rust,no_run
/// use shotpipe::{capture_stream, JobManifest, PipelineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manifest = JobManifest::load("screenshots.json")?;
/// let mut outcomes = capture_stream(&manifest, &PipelineConfig::default()).await?;
/// while let Some(outcome) = outcomes.next().await {
///     let o = outcome?;
///     match (&o.optimized, &o.error) {
///         (Some(r), _) => println!("{} → {} ({} KB)", o.label, r.output.display(), r.bytes / 1024),
///         (_, Some(e)) => eprintln!("{}: {e}", o.label),
///         _ => println!("{} captured", o.label),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn capture_stream(manifest: &JobManifest, config: &PipelineConfig) -> Result<JobStream, ShotpipeError> {
    let renderer: Arc<dyn ViewRenderer> = Arc::new(OfficeRenderer::new(config));
    capture_stream_with(manifest, config, renderer).await
}

/// [`capture_stream`] with a caller-supplied renderer.
pub async fn capture_stream_with(
    manifest: &JobManifest,
    config: &PipelineConfig,
    renderer: Arc<dyn ViewRenderer>,
) -> Result<JobStream, ShotpipeError> {
    let total = manifest.len();
    info!("Starting streaming batch: {} jobs", total);

    batch::prepare(manifest, &renderer).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let jobs = manifest.jobs.clone();
    let config = config.clone();
    let s = stream::iter(jobs.into_iter().enumerate()).then(move |(index, job)| {
        let renderer = Arc::clone(&renderer);
        let cfg = config.clone();
        async move { batch::run_job(index, total, &job, &cfg, &renderer).await }
    });

    Ok(Box::pin(s))
}
