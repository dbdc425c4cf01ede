//! Office export: spreadsheets and presentations → PDF through LibreOffice.
//!
//! One [`OfficeSession`] serves a whole batch. It owns an isolated user
//! profile so exports neither collide with a desktop LibreOffice instance nor
//! pick up the user's settings. Each export writes into a caller-provided
//! scratch directory that is discarded after the page is rasterised; the
//! source document is only ever read.

use crate::config::PipelineConfig;
use crate::error::{JobError, ShotpipeError};
use crate::pipeline::input::{DocumentKind, ResolvedDocument};
use office_headless::{ExportFilter, ExportOptions, OfficeError, OfficeSuite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// A located office suite plus the profile directory its exports share.
#[derive(Debug)]
pub struct OfficeSession {
    suite: OfficeSuite,
    profile: TempDir,
    timeout: Duration,
    poll_interval: Duration,
}

impl OfficeSession {
    /// Locate LibreOffice and create the batch profile.
    pub fn start(config: &PipelineConfig) -> Result<Self, ShotpipeError> {
        let suite = OfficeSuite::locate(config.soffice_path.as_deref()).map_err(|e| {
            ShotpipeError::OfficeUnavailable {
                detail: e.to_string(),
            }
        })?;
        let profile = tempfile::Builder::new()
            .prefix("shotpipe-profile-")
            .tempdir()
            .map_err(|e| ShotpipeError::OfficeUnavailable {
                detail: format!("cannot create profile directory: {e}"),
            })?;
        info!(
            "Office suite: {} (profile {})",
            suite.program().display(),
            profile.path().display()
        );
        Ok(Self {
            suite,
            profile,
            timeout: config.export_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    /// Export `doc` into `scratch` and return the PDF path.
    pub fn export_pdf(&self, doc: &ResolvedDocument, scratch: &Path) -> Result<PathBuf, JobError> {
        let opts = ExportOptions {
            filter: filter_for(doc.kind()),
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            profile_dir: Some(self.profile.path().to_path_buf()),
        };
        debug!(
            "Exporting {} with filter {}",
            doc.path.display(),
            opts.filter.convert_to_arg()
        );
        let pdf = self
            .suite
            .export_to_pdf(&doc.path, scratch, &opts)
            .map_err(job_error)?;
        info!("Exported {} → {}", doc.path.display(), pdf.display());
        Ok(pdf)
    }
}

/// PDF filter that puts one view on each page.
pub fn filter_for(kind: DocumentKind) -> ExportFilter {
    match kind {
        DocumentKind::Spreadsheet => ExportFilter::SinglePageSheets,
        DocumentKind::Presentation => ExportFilter::Impress,
        DocumentKind::Pdf | DocumentKind::Image => ExportFilter::Default,
    }
}

fn job_error(e: OfficeError) -> JobError {
    match e {
        OfficeError::Timeout { timeout, .. } => JobError::ExportTimeout {
            secs: timeout.as_secs().max(1),
        },
        other => JobError::automation(other),
    }
}
