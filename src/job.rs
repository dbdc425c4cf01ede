//! Capture jobs and the JSON job manifest that lists them.
//!
//! A manifest replaces the hard-coded per-project job lists with data:
//!
//! ```json
//! {
//!   "document_dir": "../Audit_Tools",
//!   "output_dir": "public/images/projects/audit-tools",
//!   "jobs": [
//!     { "label": "Risk Assessment Matrix",
//!       "document": "01_Planning/Audit_Universe_Risk_Assessment.xlsx",
//!       "view": { "sheet": "Risk Assessment" },
//!       "output": "risk-assessment.png" },
//!     { "document": "03_Reporting/Audit_Committee_Presentation.pptx",
//!       "view": { "slide": 1 },
//!       "output": "presentation-sample.png" }
//!   ]
//! }
//! ```
//!
//! Relative directories resolve against the manifest's own directory, job
//! documents against `document_dir`, and outputs against `output_dir`.

use crate::error::ShotpipeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which part of a document to capture.
///
/// In JSON: `"first"`, `{"sheet": "Name"}`, `{"slide": 2}`, `{"page": 3}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewId {
    /// The first (active) sheet, slide, or page.
    #[default]
    First,
    /// A named spreadsheet sheet.
    Sheet(String),
    /// A presentation slide, 1-indexed.
    Slide(u32),
    /// A page of the rendered document, 1-indexed.
    Page(u32),
}

impl ViewId {
    /// 1-indexed page number for positional views; `First` is page 1.
    pub fn page_number(&self) -> Option<u32> {
        match self {
            ViewId::First => Some(1),
            ViewId::Slide(n) | ViewId::Page(n) => Some(*n),
            ViewId::Sheet(_) => None,
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewId::First => f.write_str("first view"),
            ViewId::Sheet(name) => write!(f, "sheet '{name}'"),
            ViewId::Slide(n) => write!(f, "slide {n}"),
            ViewId::Page(n) => write!(f, "page {n}"),
        }
    }
}

/// One screenshot to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureJob {
    /// Human-readable name used in progress output and reports.
    pub label: String,
    /// Source document.
    pub document: PathBuf,
    pub view: ViewId,
    /// Capture PNG path. The optimised WebP goes next to it.
    pub output: PathBuf,
}

impl CaptureJob {
    /// A job labelled after its output file stem.
    pub fn new(document: impl Into<PathBuf>, view: ViewId, output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        let label = default_label(&output);
        Self {
            label,
            document: document.into(),
            view,
            output,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Where the Optimize Stage writes: the capture path with a `.webp` extension.
    pub fn optimized_path(&self) -> PathBuf {
        self.output.with_extension("webp")
    }
}

fn default_label(output: &Path) -> String {
    output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| output.display().to_string())
}

// ── Manifest ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    document_dir: Option<PathBuf>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    jobs: Vec<RawJob>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJob {
    #[serde(default)]
    label: Option<String>,
    document: PathBuf,
    #[serde(default)]
    view: ViewId,
    output: PathBuf,
}

/// A validated, path-resolved list of capture jobs.
#[derive(Debug, Clone)]
pub struct JobManifest {
    /// File the manifest was read from, if any.
    pub source: Option<PathBuf>,
    pub jobs: Vec<CaptureJob>,
}

impl JobManifest {
    /// Read and validate a JSON manifest from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ShotpipeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ShotpipeError::ManifestNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ShotpipeError::InvalidManifest {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                }
            }
        })?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_json_str(&text, base, path)
    }

    /// Parse a manifest, resolving relative paths against `base_dir`.
    ///
    /// `source` is only used in error messages.
    pub fn from_json_str(
        json: &str,
        base_dir: &Path,
        source: &Path,
    ) -> Result<Self, ShotpipeError> {
        let invalid = |detail: String| ShotpipeError::InvalidManifest {
            path: source.to_path_buf(),
            detail,
        };

        let raw: RawManifest = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

        let document_dir = resolve(base_dir, raw.document_dir.as_deref());
        let output_dir = resolve(base_dir, raw.output_dir.as_deref());

        let jobs = raw
            .jobs
            .into_iter()
            .map(|j| {
                let output = output_dir.join(&j.output);
                let label = j.label.unwrap_or_else(|| default_label(&output));
                CaptureJob {
                    label,
                    document: document_dir.join(&j.document),
                    view: j.view,
                    output,
                }
            })
            .collect();

        let manifest = Self {
            source: Some(source.to_path_buf()),
            jobs,
        };
        manifest.validate().map_err(invalid)?;
        debug!("Loaded {} jobs from {}", manifest.jobs.len(), source.display());
        Ok(manifest)
    }

    /// Build a manifest from jobs constructed in code.
    pub fn from_jobs(jobs: Vec<CaptureJob>) -> Result<Self, ShotpipeError> {
        let manifest = Self { source: None, jobs };
        manifest
            .validate()
            .map_err(|detail| ShotpipeError::InvalidManifest {
                path: PathBuf::from("<in-memory>"),
                detail,
            })?;
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn validate(&self) -> Result<(), String> {
        if self.jobs.is_empty() {
            return Err("manifest contains no jobs".into());
        }

        let mut outputs = HashSet::new();
        for (i, job) in self.jobs.iter().enumerate() {
            let n = i + 1;
            match job.view {
                ViewId::Slide(0) | ViewId::Page(0) => {
                    return Err(format!("job {n} ({}): slides and pages are 1-indexed", job.label));
                }
                ViewId::Sheet(ref s) if s.trim().is_empty() => {
                    return Err(format!("job {n} ({}): sheet name is empty", job.label));
                }
                _ => {}
            }

            let is_png = job
                .output
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"));
            if !is_png {
                return Err(format!(
                    "job {n} ({}): output '{}' must be a .png capture path",
                    job.label,
                    job.output.display()
                ));
            }

            // Captures differing only in extension case share one WebP.
            if !outputs.insert(job.optimized_path()) {
                return Err(format!(
                    "job {n} ({}): output '{}' collides with an earlier job",
                    job.label,
                    job.output.display()
                ));
            }
        }
        Ok(())
    }
}

fn resolve(base: &Path, dir: Option<&Path>) -> PathBuf {
    match dir {
        Some(d) if d.is_absolute() => d.to_path_buf(),
        Some(d) => base.join(d),
        None => base.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "document_dir": "docs",
        "output_dir": "/site/images",
        "jobs": [
            { "label": "Risk Matrix", "document": "Risk.xlsx",
              "view": { "sheet": "Risk Assessment" }, "output": "risk.png" },
            { "document": "Deck.pptx", "view": { "slide": 2 }, "output": "deck.png" },
            { "document": "/abs/Report.pdf", "output": "report.png" }
        ]
    }"#;

    fn parse(json: &str) -> Result<JobManifest, ShotpipeError> {
        JobManifest::from_json_str(json, Path::new("/work"), Path::new("/work/jobs.json"))
    }

    #[test]
    fn parses_views_and_resolves_paths() {
        let m = parse(SAMPLE).unwrap();
        assert_eq!(m.len(), 3);

        assert_eq!(m.jobs[0].label, "Risk Matrix");
        assert_eq!(m.jobs[0].document, PathBuf::from("/work/docs/Risk.xlsx"));
        assert_eq!(m.jobs[0].view, ViewId::Sheet("Risk Assessment".into()));
        assert_eq!(m.jobs[0].output, PathBuf::from("/site/images/risk.png"));

        assert_eq!(m.jobs[1].label, "deck");
        assert_eq!(m.jobs[1].view, ViewId::Slide(2));

        // absolute document path wins over document_dir; view defaults to first
        assert_eq!(m.jobs[2].document, PathBuf::from("/abs/Report.pdf"));
        assert_eq!(m.jobs[2].view, ViewId::First);
    }

    #[test]
    fn first_view_as_plain_string() {
        let m = parse(r#"{"jobs":[{"document":"a.xlsx","view":"first","output":"a.png"}]}"#)
            .unwrap();
        assert_eq!(m.jobs[0].view, ViewId::First);
        assert_eq!(m.jobs[0].document, PathBuf::from("/work/a.xlsx"));
    }

    #[test]
    fn rejects_empty_job_list() {
        let err = parse(r#"{"jobs":[]}"#).unwrap_err();
        assert!(err.to_string().contains("no jobs"));
    }

    #[test]
    fn rejects_zero_slide() {
        let err =
            parse(r#"{"jobs":[{"document":"d.pptx","view":{"slide":0},"output":"d.png"}]}"#)
                .unwrap_err();
        assert!(err.to_string().contains("1-indexed"));
    }

    #[test]
    fn rejects_duplicate_outputs() {
        let err = parse(
            r#"{"jobs":[
                {"document":"a.xlsx","output":"same.png"},
                {"document":"b.xlsx","output":"same.png"}
            ]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("earlier job"));
    }

    #[test]
    fn rejects_outputs_sharing_a_webp() {
        let err = parse(
            r#"{"jobs":[
                {"document":"a.xlsx","output":"shot.png"},
                {"document":"b.xlsx","output":"shot.PNG"}
            ]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("collides"), "{err}");
    }

    #[test]
    fn rejects_non_png_output() {
        let err = parse(r#"{"jobs":[{"document":"a.xlsx","output":"a.webp"}]}"#).unwrap_err();
        assert!(err.to_string().contains(".png"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = parse(r#"{"jobs":[{"document":"a.xlsx","output":"a.png","sheet":"X"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ShotpipeError::InvalidManifest { .. }));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = JobManifest::load("/definitely/not/here/jobs.json").unwrap_err();
        assert!(matches!(err, ShotpipeError::ManifestNotFound { .. }));
    }

    #[test]
    fn load_resolves_against_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"{"output_dir":"out","jobs":[{"document":"a.pdf","output":"a.png"}]}"#,
        )
        .unwrap();
        let m = JobManifest::load(&path).unwrap();
        assert_eq!(m.jobs[0].document, dir.path().join("a.pdf"));
        assert_eq!(m.jobs[0].output, dir.path().join("out/a.png"));
    }

    #[test]
    fn optimized_path_swaps_extension() {
        let job = CaptureJob::new("a.xlsx", ViewId::First, "/out/cash-flow.png");
        assert_eq!(job.optimized_path(), PathBuf::from("/out/cash-flow.webp"));
        assert_eq!(job.label, "cash-flow");
    }

    #[test]
    fn view_display() {
        assert_eq!(ViewId::Sheet("Dashboard".into()).to_string(), "sheet 'Dashboard'");
        assert_eq!(ViewId::Slide(3).to_string(), "slide 3");
        assert_eq!(ViewId::First.page_number(), Some(1));
        assert_eq!(ViewId::Sheet("x".into()).page_number(), None);
    }
}
