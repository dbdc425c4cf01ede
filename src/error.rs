//! Error types for the shotpipe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ShotpipeError`] — **Fatal**: the batch cannot proceed at all (bad
//!   manifest, office suite missing, pdfium unavailable). Returned as
//!   `Err(ShotpipeError)` from the top-level `run_*` functions.
//!
//! * [`JobError`] — **Non-fatal**: a single job failed (missing document,
//!   unknown sheet, export timeout) but the rest of the batch is fine. Stored
//!   inside [`crate::output::JobOutcome`] and counted by [`JobErrorKind`] in
//!   the batch statistics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the shotpipe library.
///
/// Job-level failures use [`JobError`] and are stored in
/// [`crate::output::JobOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ShotpipeError {
    // ── Manifest errors ───────────────────────────────────────────────────
    /// The job manifest was not found at the given path.
    #[error("Job manifest not found: '{path}'\nCheck the path exists and is readable.")]
    ManifestNotFound { path: PathBuf },

    /// The manifest exists but could not be parsed or failed validation.
    #[error("Invalid job manifest '{path}': {detail}")]
    InvalidManifest { path: PathBuf, detail: String },

    // ── External engines ──────────────────────────────────────────────────
    /// The batch needs the office suite and it could not be located or started.
    #[error(
        "Office suite unavailable: {detail}\n\n\
Spreadsheets and presentations are exported through LibreOffice.\n\
  • Install LibreOffice, or\n\
  • Set SOFFICE_PATH=/path/to/soffice (or pass --soffice).\n"
    )]
    OfficeUnavailable { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy,\n\
or install pdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Batch outcome ─────────────────────────────────────────────────────
    /// Some jobs succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchReport::into_result`] when the caller
    /// wants to treat any job failure as an error.
    #[error("{failed}/{total} jobs failed")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file outside of a job.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single-document operation (such as inspect) hit a document error.
    #[error(transparent)]
    Document(#[from] JobError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single job.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobError {
    /// Source document does not exist.
    #[error("document not found: '{path}'")]
    DocumentNotFound { path: PathBuf },

    /// Extension is unknown or the file content does not match it.
    #[error("unsupported document '{path}': {detail}")]
    UnsupportedDocument { path: PathBuf, detail: String },

    /// The requested sheet/slide/page does not exist in the document.
    #[error("view {view} not found in '{path}' (available: {available})")]
    ViewNotFound {
        path: PathBuf,
        view: String,
        available: String,
    },

    /// The office export or the rasteriser failed.
    #[error("automation failure: {detail}")]
    AutomationFailure { detail: String },

    /// The office export did not finish in time.
    #[error("export did not complete within {secs}s")]
    ExportTimeout { secs: u64 },

    /// Decoding, encoding, or writing an image failed.
    #[error("encode failure: {detail}")]
    EncodeFailure { detail: String },
}

/// Discriminant of [`JobError`], used for per-kind counts in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobErrorKind {
    DocumentNotFound,
    UnsupportedDocument,
    ViewNotFound,
    AutomationFailure,
    ExportTimeout,
    EncodeFailure,
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            JobError::DocumentNotFound { .. } => JobErrorKind::DocumentNotFound,
            JobError::UnsupportedDocument { .. } => JobErrorKind::UnsupportedDocument,
            JobError::ViewNotFound { .. } => JobErrorKind::ViewNotFound,
            JobError::AutomationFailure { .. } => JobErrorKind::AutomationFailure,
            JobError::ExportTimeout { .. } => JobErrorKind::ExportTimeout,
            JobError::EncodeFailure { .. } => JobErrorKind::EncodeFailure,
        }
    }

    pub(crate) fn encode(detail: impl fmt::Display) -> Self {
        JobError::EncodeFailure {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn automation(detail: impl fmt::Display) -> Self {
        JobError::AutomationFailure {
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobErrorKind::DocumentNotFound => "document-not-found",
            JobErrorKind::UnsupportedDocument => "unsupported-document",
            JobErrorKind::ViewNotFound => "view-not-found",
            JobErrorKind::AutomationFailure => "automation-failure",
            JobErrorKind::ExportTimeout => "export-timeout",
            JobErrorKind::EncodeFailure => "encode-failure",
        };
        f.write_str(s)
    }
}
