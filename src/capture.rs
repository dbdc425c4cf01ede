//! Capture: turn one job's document view into a PNG on disk.
//!
//! Rendering goes through the [`ViewRenderer`] trait so the batch logic can
//! be driven by any backend. The shipped backend, [`OfficeRenderer`], exports
//! office documents to PDF headlessly and rasterises the page for the
//! requested view with pdfium; it never grabs the screen, so the result
//! cannot contain other windows, cursors or a half-drawn UI.
//!
//! A [`CapturedView`] only exists once its PNG has been written, which is
//! what the Optimize Stage consumes.

use crate::config::PipelineConfig;
use crate::error::{JobError, ShotpipeError};
use crate::job::{CaptureJob, ViewId};
use crate::pipeline::export::OfficeSession;
use crate::pipeline::input::{self, DocumentKind, ResolvedDocument};
use crate::pipeline::{encode, render, views};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Produces the bitmap for one view of a resolved document.
///
/// Implementations are called from blocking worker threads, one job at a
/// time.
pub trait ViewRenderer: Send + Sync {
    /// Check that the engines needed for `kinds` are available.
    ///
    /// Called once before the first job. An error here aborts the batch.
    fn prepare(&self, kinds: &[DocumentKind]) -> Result<(), ShotpipeError> {
        let _ = kinds;
        Ok(())
    }

    /// Render `view` of `document`.
    fn render_view(&self, document: &ResolvedDocument, view: &ViewId) -> Result<DynamicImage, JobError>;
}

/// Headless LibreOffice export plus pdfium rasterisation.
///
/// The office session (suite lookup and profile directory) is created on
/// first need and reused for every later job.
pub struct OfficeRenderer {
    config: PipelineConfig,
    session: OnceLock<OfficeSession>,
}

impl OfficeRenderer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
            session: OnceLock::new(),
        }
    }

    fn session(&self) -> Result<&OfficeSession, ShotpipeError> {
        if let Some(s) = self.session.get() {
            return Ok(s);
        }
        let started = OfficeSession::start(&self.config)?;
        // Jobs are serial, so nobody else can have won the race.
        let _ = self.session.set(started);
        self.session
            .get()
            .ok_or_else(|| ShotpipeError::Internal("office session not initialised".into()))
    }

    fn rasterise(&self, pdf: &Path, page_index: usize) -> Result<DynamicImage, JobError> {
        let pdfium = render::bind_pdfium(self.config.pdfium_lib_path.as_deref())
            .map_err(JobError::automation)?;
        render::render_page(&pdfium, pdf, page_index, self.config.render_width)
    }
}

impl ViewRenderer for OfficeRenderer {
    fn prepare(&self, kinds: &[DocumentKind]) -> Result<(), ShotpipeError> {
        if kinds.iter().any(|k| k.needs_pdfium()) {
            render::bind_pdfium(self.config.pdfium_lib_path.as_deref())?;
            debug!("pdfium available");
        }
        if kinds.iter().any(|k| k.needs_office()) {
            self.session()?;
        }
        Ok(())
    }

    fn render_view(&self, document: &ResolvedDocument, view: &ViewId) -> Result<DynamicImage, JobError> {
        let plan = views::plan_view(document, view)?;

        match document.kind() {
            DocumentKind::Image => image::open(&document.path).map_err(|e| JobError::UnsupportedDocument {
                path: document.path.clone(),
                detail: format!("cannot decode image: {e}"),
            }),
            DocumentKind::Pdf => self.rasterise(&document.path, plan.page_index),
            DocumentKind::Spreadsheet | DocumentKind::Presentation => {
                let session = self.session().map_err(JobError::automation)?;
                let scratch = tempfile::Builder::new()
                    .prefix("shotpipe-export-")
                    .tempdir()
                    .map_err(|e| JobError::automation(format!("scratch directory: {e}")))?;
                let pdf = session.export_pdf(document, scratch.path())?;

                if let Some(expected) = plan.expected_pages {
                    let pdfium = render::bind_pdfium(self.config.pdfium_lib_path.as_deref())
                        .map_err(JobError::automation)?;
                    let actual = render::page_count(&pdfium, &pdf)?;
                    if actual != expected {
                        warn!(
                            "{}: expected {} exported pages, got {}; view may be offset",
                            document.path.display(),
                            expected,
                            actual
                        );
                    }
                }

                let image = self.rasterise(&pdf, plan.page_index).map_err(|e| match e {
                    JobError::ViewNotFound { available, .. } => JobError::ViewNotFound {
                        path: document.path.clone(),
                        view: view.to_string(),
                        available,
                    },
                    other => other,
                })?;
                drop(scratch);
                Ok(image)
            }
        }
    }
}

/// A view that has been rendered and written to its capture path.
#[derive(Debug, Clone)]
pub struct CapturedView {
    path: PathBuf,
    image: DynamicImage,
    bytes: u64,
}

impl CapturedView {
    /// Where the capture PNG was written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Size of the written PNG.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Resolve, render and write one job's capture PNG.
pub fn capture_job(job: &CaptureJob, renderer: &dyn ViewRenderer) -> Result<CapturedView, JobError> {
    let document = input::resolve_document(&job.document)?;
    info!(
        "Capturing '{}': {} of {}",
        job.label,
        job.view,
        document.path.display()
    );

    let image = renderer.render_view(&document, &job.view)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(JobError::automation(format!("{} rendered as an empty bitmap", job.view)));
    }

    let png = encode::encode_capture_png(&image)?;
    encode::write_atomic(&job.output, &png).map_err(|e| {
        JobError::encode(format!("writing capture '{}': {e}", job.output.display()))
    })?;
    debug!(
        "Wrote capture {} ({}x{}, {} bytes)",
        job.output.display(),
        image.width(),
        image.height(),
        png.len()
    );

    Ok(CapturedView {
        path: job.output.clone(),
        image,
        bytes: png.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct SolidRenderer;

    impl ViewRenderer for SolidRenderer {
        fn render_view(&self, _doc: &ResolvedDocument, _view: &ViewId) -> Result<DynamicImage, JobError> {
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 20, Rgba([0, 90, 200, 255]))))
        }
    }

    struct EmptyRenderer;

    impl ViewRenderer for EmptyRenderer {
        fn render_view(&self, _doc: &ResolvedDocument, _view: &ViewId) -> Result<DynamicImage, JobError> {
            Ok(DynamicImage::new_rgba8(0, 0))
        }
    }

    fn pdf_fixture(dir: &Path) -> PathBuf {
        let p = dir.join("report.pdf");
        std::fs::write(&p, b"%PDF-1.4\n%%EOF\n").unwrap();
        p
    }

    #[test]
    fn capture_writes_png_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let doc = pdf_fixture(dir.path());
        let job = CaptureJob::new(doc, ViewId::First, dir.path().join("shots/report.png"));

        let captured = capture_job(&job, &SolidRenderer).unwrap();
        assert_eq!(captured.path(), job.output.as_path());
        let on_disk = image::open(captured.path()).unwrap();
        assert_eq!((on_disk.width(), on_disk.height()), (40, 20));
        assert_eq!(captured.bytes(), std::fs::metadata(captured.path()).unwrap().len());
    }

    #[test]
    fn missing_document_never_reaches_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let job = CaptureJob::new(dir.path().join("gone.xlsx"), ViewId::First, dir.path().join("x.png"));
        let err = capture_job(&job, &SolidRenderer).unwrap_err();
        assert!(matches!(err, JobError::DocumentNotFound { .. }));
        assert!(!job.output.exists());
    }

    #[test]
    fn empty_bitmap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let job = CaptureJob::new(pdf_fixture(dir.path()), ViewId::First, dir.path().join("e.png"));
        assert!(matches!(
            capture_job(&job, &EmptyRenderer).unwrap_err(),
            JobError::AutomationFailure { .. }
        ));
    }

    #[test]
    fn office_renderer_decodes_image_documents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 6, Rgba([5, 5, 5, 255])))
            .save(&src)
            .unwrap();
        let doc = input::resolve_document(&src).unwrap();
        let renderer = OfficeRenderer::new(&PipelineConfig::default());
        renderer.prepare(&[DocumentKind::Image]).unwrap();
        let img = renderer.render_view(&doc, &ViewId::First).unwrap();
        assert_eq!(img.width(), 12);
    }
}
