//! PDF rasterisation: render one page of an exported PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Everything here is synchronous; the batch runs each job inside
//! `tokio::task::spawn_blocking` so Tokio worker threads never stall on it.
//!
//! ## Why cap the height?
//!
//! A spreadsheet exported with one page per sheet can be arbitrarily tall.
//! Rendering to a fixed width with a height ceiling keeps memory bounded
//! while still giving the Optimize Stage extra resolution to downscale from.

use crate::error::{JobError, ShotpipeError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or the directory holding it.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Tallest bitmap pdfium is asked to produce.
pub const MAX_RENDER_HEIGHT: u32 = 16_384;

/// Bind to pdfium: `explicit`, then `PDFIUM_LIB_PATH`, then the system library.
///
/// A path may name the library file itself or a directory containing it.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, ShotpipeError> {
    let configured: Option<PathBuf> = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from))
        .filter(|p| !p.as_os_str().is_empty());

    let bindings = match configured {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib).map_err(|e| {
                ShotpipeError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| ShotpipeError::PdfiumBindingFailed(format!("system library: {:?}", e)))?,
    };

    Ok(Pdfium::new(bindings))
}

/// Rasterise page `page_index` (0-based) of `pdf_path` at `render_width` px.
///
/// An index past the last page is a [`JobError::ViewNotFound`] listing the
/// pages that do exist.
pub fn render_page(
    pdfium: &Pdfium,
    pdf_path: &Path,
    page_index: usize,
    render_width: u32,
) -> Result<DynamicImage, JobError> {
    let document = open(pdfium, pdf_path)?;
    let pages = document.pages();
    let total = pages.len() as usize;
    debug!("{} has {} pages", pdf_path.display(), total);

    if page_index >= total {
        return Err(JobError::ViewNotFound {
            path: pdf_path.to_path_buf(),
            view: format!("page {}", page_index + 1),
            available: page_range(total),
        });
    }

    let page = pages
        .get(page_index as u16)
        .map_err(|e| JobError::automation(format!("page {}: {:?}", page_index + 1, e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(render_width as i32)
        .set_maximum_height(MAX_RENDER_HEIGHT as i32);

    let bitmap = page.render_with_config(&render_config).map_err(|e| {
        JobError::automation(format!("rasterising page {}: {:?}", page_index + 1, e))
    })?;

    let image = bitmap.as_image();
    info!(
        "Rendered page {}/{} → {}x{} px",
        page_index + 1,
        total,
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Number of pages in a PDF.
pub fn page_count(pdfium: &Pdfium, pdf_path: &Path) -> Result<usize, JobError> {
    let document = open(pdfium, pdf_path)?;
    Ok(document.pages().len() as usize)
}

fn open<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, JobError> {
    pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.contains("Password") || detail.contains("password") {
            JobError::UnsupportedDocument {
                path: pdf_path.to_path_buf(),
                detail: "PDF is password-protected".into(),
            }
        } else {
            JobError::automation(format!("pdfium could not open '{}': {}", pdf_path.display(), detail))
        }
    })
}

/// Human-readable list of valid 1-based pages.
pub(crate) fn page_range(total: usize) -> String {
    match total {
        0 => "no pages".to_string(),
        1 => "page 1".to_string(),
        n => format!("pages 1-{n}"),
    }
}
