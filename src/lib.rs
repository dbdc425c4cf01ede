//! # shotpipe
//!
//! Capture views of office documents as screenshots and optimise them into
//! size-bounded WebP web assets.
//!
//! ## Why this crate?
//!
//! Portfolio and documentation sites want a picture of a specific sheet of a
//! workbook or a specific slide of a deck, at most 1920 px wide and at most
//! 200 KB. Driving a desktop office application and grabbing the screen is
//! fragile: focus steals, other windows, unrendered cells. Instead this crate
//! exports the document headlessly through LibreOffice, rasterises exactly
//! the page that holds the requested view with pdfium, and then encodes WebP
//! at decreasing quality until the file fits its budget.
//!
//! ## Pipeline Overview
//!
//! ```text
//! job manifest (JSON)
//!  │
//!  ├─ 1. Resolve   document exists, format matches its bytes
//!  ├─ 2. Plan      sheet name / slide number → exported page index
//!  ├─ 3. Export    soffice --headless --convert-to pdf (isolated profile)
//!  ├─ 4. Render    pdfium rasterises that page (spawn_blocking)
//!  ├─ 5. Capture   PNG written atomically
//!  ├─ 6. Optimize  flatten on white, cap width, WebP q85 → q55
//!  └─ 7. Report    per-job outcomes + failure counts by kind
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shotpipe::{run_batch, JobManifest, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manifest = JobManifest::load("screenshots.json")?;
//!     let config = PipelineConfig::default();
//!     let report = run_batch(&manifest, &config).await?;
//!     eprintln!("{}/{} captured", report.stats.succeeded, report.stats.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `shotpipe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! shotpipe = { version = "0.1", default-features = false }
//! ```
//!
//! ## External engines
//!
//! | Engine | Needed for | Located via |
//! |--------|-----------|-------------|
//! | LibreOffice | spreadsheets, presentations | `--soffice`, `SOFFICE_PATH`, `PATH`, platform install dirs |
//! | pdfium | everything except plain images | `PDFIUM_LIB_PATH`, system loader |
//!
//! Only the engines a batch actually needs are checked, before its first job.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod capture;
pub mod config;
pub mod error;
pub mod job;
pub mod optimize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{inspect_document, run_batch, run_batch_sync, run_batch_to_report, run_batch_with};
pub use capture::{CapturedView, OfficeRenderer, ViewRenderer};
pub use config::{EncodeSettings, PipelineConfig, PipelineConfigBuilder};
pub use error::{JobError, JobErrorKind, ShotpipeError};
pub use job::{CaptureJob, JobManifest, ViewId};
pub use optimize::{optimize_file, optimize_image, optimize_paths};
pub use output::{BatchReport, BatchStats, DocumentInfo, JobOutcome, OptimizeResult};
pub use pipeline::input::{DocumentFormat, DocumentKind, ResolvedDocument};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{capture_stream, capture_stream_with, JobStream};
