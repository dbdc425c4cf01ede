//! Eager (whole-batch) capture entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: run every job, then return a
//! [`BatchReport`]. Use [`crate::stream::capture_stream`] instead when you
//! want outcomes as each job finishes.
//!
//! Jobs run strictly one after another. Office exports share one
//! LibreOffice profile and are far from free, and a serial run keeps the
//! report order identical to the manifest order.

use crate::capture::{self, OfficeRenderer, ViewRenderer};
use crate::config::PipelineConfig;
use crate::error::{JobError, ShotpipeError};
use crate::job::{CaptureJob, JobManifest};
use crate::optimize;
use crate::output::{BatchReport, DocumentInfo, JobOutcome};
use crate::pipeline::input::{self, DocumentFormat, DocumentKind};
use crate::pipeline::{render, views};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Run every job in `manifest` with the office/pdfium backend.
///
/// # Returns
/// `Ok(BatchReport)` once every job has been attempted, even if some failed
/// (check `report.stats.failed`, or call [`BatchReport::into_result`]).
///
/// # Errors
/// Returns `Err(ShotpipeError)` only for fatal errors, before any job runs:
/// - office documents are listed but LibreOffice cannot be found
/// - pdfium cannot be bound
pub async fn run_batch(manifest: &JobManifest, config: &PipelineConfig) -> Result<BatchReport, ShotpipeError> {
    let renderer: Arc<dyn ViewRenderer> = Arc::new(OfficeRenderer::new(config));
    run_batch_with(manifest, config, renderer).await
}

/// Run every job in `manifest` with a caller-supplied renderer.
pub async fn run_batch_with(
    manifest: &JobManifest,
    config: &PipelineConfig,
    renderer: Arc<dyn ViewRenderer>,
) -> Result<BatchReport, ShotpipeError> {
    let total_start = Instant::now();
    let total = manifest.len();
    info!("Starting batch: {} jobs", total);

    prepare(manifest, &renderer).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut outcomes = Vec::with_capacity(total);
    for (index, job) in manifest.jobs.iter().enumerate() {
        let outcome = run_job(index, total, job, config, &renderer).await?;
        outcomes.push(outcome);
    }

    let report = BatchReport::new(outcomes, total_start.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {}/{} jobs succeeded, {}ms total",
        report.stats.succeeded, total, report.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, report.stats.succeeded);
    }
    Ok(report)
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a new tokio runtime internally.
/// Do NOT call from within an existing tokio runtime.
pub fn run_batch_sync(manifest: &JobManifest, config: &PipelineConfig) -> Result<BatchReport, ShotpipeError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| ShotpipeError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    rt.block_on(run_batch(manifest, config))
}

/// Run the batch and write the JSON report to `report_path` atomically.
pub async fn run_batch_to_report(
    manifest: &JobManifest,
    report_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchReport, ShotpipeError> {
    let report = run_batch(manifest, config).await?;
    let path = report_path.as_ref();
    let json = serde_json::to_vec_pretty(&report)
        .map_err(|e| ShotpipeError::Internal(format!("serialising report: {e}")))?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || crate::pipeline::encode::write_atomic(&target, &json))
        .await
        .map_err(|e| ShotpipeError::Internal(format!("report write task panicked: {e}")))?
        .map_err(|e| ShotpipeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(report)
}

/// Describe a document's views without capturing anything.
///
/// PDFs need pdfium for the page count; other formats are read directly.
pub async fn inspect_document(path: impl AsRef<Path>, config: &PipelineConfig) -> Result<DocumentInfo, ShotpipeError> {
    let path = path.as_ref().to_path_buf();
    let pdfium_lib = config.pdfium_lib_path.clone();
    tokio::task::spawn_blocking(move || inspect_blocking(&path, pdfium_lib.as_deref()))
        .await
        .map_err(|e| ShotpipeError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn inspect_blocking(path: &Path, pdfium_lib: Option<&Path>) -> Result<DocumentInfo, ShotpipeError> {
    let doc = input::resolve_document(path)?;
    let mut info = DocumentInfo {
        path: doc.path.clone(),
        format: doc.format,
        kind: doc.kind(),
        sheets: Vec::new(),
        slides: None,
        hidden_slides: Vec::new(),
        pages: None,
    };
    match views::list_views(&doc)? {
        views::DocumentViews::Sheets(names) => info.sheets = names,
        views::DocumentViews::Slides(deck) => {
            info.slides = Some(deck.len());
            info.hidden_slides = deck.hidden_numbers();
        }
        views::DocumentViews::Unknown => {}
    }
    match doc.kind() {
        DocumentKind::Pdf => {
            let pdfium = render::bind_pdfium(pdfium_lib)?;
            info.pages = Some(render::page_count(&pdfium, &doc.path)?);
        }
        DocumentKind::Image => info.pages = Some(1),
        _ => {}
    }
    Ok(info)
}

/// Kinds the batch will need engines for, from extensions alone.
pub(crate) fn document_kinds(jobs: &[CaptureJob]) -> Vec<DocumentKind> {
    let mut kinds: Vec<DocumentKind> = jobs
        .iter()
        .filter_map(|j| DocumentFormat::from_path(&j.document))
        .map(DocumentFormat::kind)
        .collect();
    kinds.sort_by_key(|k| *k as u8);
    kinds.dedup();
    kinds
}

pub(crate) async fn prepare(manifest: &JobManifest, renderer: &Arc<dyn ViewRenderer>) -> Result<(), ShotpipeError> {
    let kinds = document_kinds(&manifest.jobs);
    let r = Arc::clone(renderer);
    tokio::task::spawn_blocking(move || r.prepare(&kinds))
        .await
        .map_err(|e| ShotpipeError::Internal(format!("Prepare task panicked: {}", e)))?
}

/// Capture, then optimise, one job; fires the per-job callbacks.
///
/// Job failures land in the outcome. Only a panicked worker is an `Err`.
pub(crate) async fn run_job(
    index: usize,
    total: usize,
    job: &CaptureJob,
    config: &PipelineConfig,
    renderer: &Arc<dyn ViewRenderer>,
) -> Result<JobOutcome, ShotpipeError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(index, total, &job.label);
    }
    let started = Instant::now();

    let worker_job = job.clone();
    let worker_cfg = config.clone();
    let worker_renderer = Arc::clone(renderer);
    let (capture, optimized, error) = tokio::task::spawn_blocking(move || {
        execute(&worker_job, &worker_cfg, worker_renderer.as_ref())
    })
    .await
    .map_err(|e| ShotpipeError::Internal(format!("Job task panicked: {}", e)))?;

    if let Some(ref e) = error {
        warn!("Job {} ('{}') failed: {}", index + 1, job.label, e);
    }

    let outcome = JobOutcome {
        index,
        label: job.label.clone(),
        document: job.document.clone(),
        view: job.view.clone(),
        capture,
        optimized,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    if let Some(ref cb) = config.progress_callback {
        match outcome.error {
            None => cb.on_job_complete(index, total, &outcome),
            Some(ref e) => cb.on_job_error(index, total, &outcome.label, &e.to_string()),
        }
    }
    Ok(outcome)
}

type Attempt = (
    Option<PathBuf>,
    Option<crate::output::OptimizeResult>,
    Option<JobError>,
);

fn execute(job: &CaptureJob, config: &PipelineConfig, renderer: &dyn ViewRenderer) -> Attempt {
    let captured = match capture::capture_job(job, renderer) {
        Ok(c) => c,
        Err(e) => return (None, None, Some(e)),
    };
    let capture_path = Some(captured.path().to_path_buf());
    if !config.optimize {
        return (capture_path, None, None);
    }
    match optimize::optimize_capture(&captured, &job.optimized_path(), config) {
        Ok(r) => (capture_path, Some(r), None),
        Err(e) => (capture_path, None, Some(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ViewId;

    #[test]
    fn kinds_are_deduplicated() {
        let jobs = vec![
            CaptureJob::new("a.xlsx", ViewId::First, "a.png"),
            CaptureJob::new("b.XLSX", ViewId::First, "b.png"),
            CaptureJob::new("c.pdf", ViewId::First, "c.png"),
            CaptureJob::new("d.unknown", ViewId::First, "d.png"),
        ];
        assert_eq!(
            document_kinds(&jobs),
            vec![DocumentKind::Spreadsheet, DocumentKind::Pdf]
        );
    }

    #[test]
    fn inspect_reads_sheet_names_without_office() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("Book.xlsx");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&p).unwrap());
        zip.start_file("xl/workbook.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(br#"<workbook><sheets><sheet name="Dashboard" sheetId="1"/></sheets></workbook>"#)
            .unwrap();
        zip.finish().unwrap();

        let info = tokio_test::block_on(inspect_document(&p, &PipelineConfig::default())).unwrap();
        assert_eq!(info.kind, DocumentKind::Spreadsheet);
        assert_eq!(info.sheets, vec!["Dashboard"]);
        assert_eq!(info.pages, None);
    }

    #[test]
    fn inspect_reports_hidden_slides() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("Deck.pptx");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&p).unwrap());
        for (name, body) in [
            ("ppt/presentation.xml", "<p:presentation/>"),
            ("ppt/slides/slide1.xml", r#"<p:sld show="0"/>"#),
            ("ppt/slides/slide2.xml", "<p:sld/>"),
        ] {
            zip.start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();

        let info = tokio_test::block_on(inspect_document(&p, &PipelineConfig::default())).unwrap();
        assert_eq!(info.kind, DocumentKind::Presentation);
        assert_eq!(info.slides, Some(2));
        assert_eq!(info.hidden_slides, vec![1]);
    }

    #[test]
    fn inspect_missing_document() {
        let err = tokio_test::block_on(inspect_document("/no/such/file.pptx", &PipelineConfig::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            ShotpipeError::Document(JobError::DocumentNotFound { .. })
        ));
    }
}
