//! Document resolution: validate a job's source path and identify its format.
//!
//! The format comes from the extension and is confirmed against the file's
//! magic bytes, so a renamed or truncated file fails here with a clear
//! message instead of deep inside the office export or pdfium.

use crate::error::JobError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Broad document family; decides how a view is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Spreadsheet,
    Presentation,
    Pdf,
    Image,
}

impl DocumentKind {
    /// Whether rendering needs the office suite.
    pub fn needs_office(self) -> bool {
        matches!(self, DocumentKind::Spreadsheet | DocumentKind::Presentation)
    }

    /// Whether rendering needs pdfium.
    pub fn needs_pdfium(self) -> bool {
        !matches!(self, DocumentKind::Image)
    }
}

/// Concrete file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Xlsx,
    Xls,
    Ods,
    Pptx,
    Ppt,
    Odp,
    Pdf,
    Png,
    Jpeg,
    Bmp,
    WebP,
}

impl DocumentFormat {
    /// Format implied by the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let format = match ext.as_str() {
            "xlsx" | "xlsm" => DocumentFormat::Xlsx,
            "xls" => DocumentFormat::Xls,
            "ods" => DocumentFormat::Ods,
            "pptx" | "ppsx" => DocumentFormat::Pptx,
            "ppt" => DocumentFormat::Ppt,
            "odp" => DocumentFormat::Odp,
            "pdf" => DocumentFormat::Pdf,
            "png" => DocumentFormat::Png,
            "jpg" | "jpeg" => DocumentFormat::Jpeg,
            "bmp" => DocumentFormat::Bmp,
            "webp" => DocumentFormat::WebP,
            _ => return None,
        };
        Some(format)
    }

    pub fn kind(self) -> DocumentKind {
        match self {
            DocumentFormat::Xlsx | DocumentFormat::Xls | DocumentFormat::Ods => {
                DocumentKind::Spreadsheet
            }
            DocumentFormat::Pptx | DocumentFormat::Ppt | DocumentFormat::Odp => {
                DocumentKind::Presentation
            }
            DocumentFormat::Pdf => DocumentKind::Pdf,
            DocumentFormat::Png | DocumentFormat::Jpeg | DocumentFormat::Bmp | DocumentFormat::WebP => {
                DocumentKind::Image
            }
        }
    }

    /// Leading bytes every file of this format starts with.
    fn magic(self) -> &'static [u8] {
        match self {
            // OOXML and ODF are both zip containers
            DocumentFormat::Xlsx | DocumentFormat::Pptx | DocumentFormat::Ods | DocumentFormat::Odp => {
                b"PK\x03\x04"
            }
            // OLE2 compound file
            DocumentFormat::Xls | DocumentFormat::Ppt => b"\xD0\xCF\x11\xE0",
            DocumentFormat::Pdf => b"%PDF",
            DocumentFormat::Png => b"\x89PNG",
            DocumentFormat::Jpeg => b"\xFF\xD8\xFF",
            DocumentFormat::Bmp => b"BM",
            DocumentFormat::WebP => b"RIFF",
        }
    }
}

/// A source document that exists and whose content matches its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

impl ResolvedDocument {
    pub fn kind(&self) -> DocumentKind {
        self.format.kind()
    }
}

/// Validate that `path` exists, is readable, and is a supported document.
pub fn resolve_document(path: &Path) -> Result<ResolvedDocument, JobError> {
    if !path.exists() {
        return Err(JobError::DocumentNotFound {
            path: path.to_path_buf(),
        });
    }

    let unsupported = |detail: String| JobError::UnsupportedDocument {
        path: path.to_path_buf(),
        detail,
    };

    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        unsupported(format!(
            "unknown extension {:?}",
            path.extension().map(|e| e.to_string_lossy().into_owned())
        ))
    })?;

    let mut magic = [0u8; 8];
    let read = match std::fs::File::open(path) {
        Ok(mut f) => read_prefix(&mut f, &mut magic).map_err(|e| unsupported(e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(unsupported("permission denied".into()));
        }
        Err(_) => {
            return Err(JobError::DocumentNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let expected = format.magic();
    if read < expected.len() || &magic[..expected.len()] != expected {
        return Err(unsupported(format!(
            "content does not look like {:?} (first bytes: {:02X?})",
            format,
            &magic[..read]
        )));
    }

    debug!("Resolved {:?} document: {}", format, path.display());
    Ok(ResolvedDocument {
        path: path.to_path_buf(),
        format,
    })
}

fn read_prefix(f: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = f.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("Pack.XLSX")),
            Some(DocumentFormat::Xlsx)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("deck.pptx")).map(|f| f.kind()),
            Some(DocumentKind::Presentation)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn missing_document_is_not_found() {
        let err = resolve_document(Path::new("/definitely/not/a/real/file.xlsx")).unwrap_err();
        assert!(matches!(err, JobError::DocumentNotFound { .. }));
    }

    #[test]
    fn mismatched_magic_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("fake.pdf");
        std::fs::write(&p, b"not a pdf at all").unwrap();
        let err = resolve_document(&p).unwrap_err();
        assert!(matches!(err, JobError::UnsupportedDocument { .. }), "got {err:?}");
    }

    #[test]
    fn empty_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.xlsx");
        std::fs::write(&p, b"").unwrap();
        assert!(matches!(
            resolve_document(&p).unwrap_err(),
            JobError::UnsupportedDocument { .. }
        ));
    }

    #[test]
    fn valid_pdf_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("report.pdf");
        std::fs::write(&p, b"%PDF-1.7\n...").unwrap();
        let doc = resolve_document(&p).unwrap();
        assert_eq!(doc.format, DocumentFormat::Pdf);
        assert_eq!(doc.kind(), DocumentKind::Pdf);
    }

    #[test]
    fn kind_engine_requirements() {
        assert!(DocumentKind::Spreadsheet.needs_office());
        assert!(!DocumentKind::Pdf.needs_office());
        assert!(DocumentKind::Pdf.needs_pdfium());
        assert!(!DocumentKind::Image.needs_pdfium());
    }
}
