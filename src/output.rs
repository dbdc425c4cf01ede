//! Result types returned by the batch and optimize entry points.

use crate::error::{JobError, JobErrorKind, ShotpipeError};
use crate::job::ViewId;
use crate::pipeline::input::{DocumentFormat, DocumentKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Result of optimizing one bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// The `.webp` file written.
    pub output: PathBuf,
    /// Final encoded size in bytes.
    pub bytes: u64,
    /// WebP quality of the written file.
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    /// Encode attempts made, including the final one.
    pub iterations: usize,
    /// Whether `bytes` is within the configured ceiling.
    pub within_budget: bool,
    /// Size of the source file on disk, when there is one.
    pub source_bytes: Option<u64>,
    /// Max-compression PNG copy, when requested.
    pub png_copy: Option<PathBuf>,
}

impl OptimizeResult {
    /// Percent saved relative to the source file, if known.
    pub fn savings_percent(&self) -> Option<f64> {
        match self.source_bytes {
            Some(src) if src > 0 => Some((src as f64 - self.bytes as f64) / src as f64 * 100.0),
            _ => None,
        }
    }
}

/// What happened to one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// 0-based position in the job list.
    pub index: usize,
    pub label: String,
    pub document: PathBuf,
    pub view: ViewId,
    /// The capture PNG, once written.
    pub capture: Option<PathBuf>,
    pub optimized: Option<OptimizeResult>,
    pub error: Option<JobError>,
    pub duration_ms: u64,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failures grouped by error kind.
    pub failures_by_kind: BTreeMap<JobErrorKind, usize>,
    /// Successful jobs whose output still exceeds the size ceiling.
    pub over_budget: usize,
    pub total_duration_ms: u64,
}

impl BatchStats {
    /// Tally a finished list of outcomes.
    pub fn from_outcomes(outcomes: &[JobOutcome], total_duration_ms: u64) -> Self {
        let mut stats = BatchStats {
            total: outcomes.len(),
            total_duration_ms,
            ..Default::default()
        };
        for o in outcomes {
            match &o.error {
                None => {
                    stats.succeeded += 1;
                    if o.optimized.as_ref().is_some_and(|r| !r.within_budget) {
                        stats.over_budget += 1;
                    }
                }
                Some(e) => {
                    stats.failed += 1;
                    *stats.failures_by_kind.entry(e.kind()).or_insert(0) += 1;
                }
            }
        }
        stats
    }
}

/// Ordered job outcomes plus statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub jobs: Vec<JobOutcome>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn new(jobs: Vec<JobOutcome>, total_duration_ms: u64) -> Self {
        let stats = BatchStats::from_outcomes(&jobs, total_duration_ms);
        Self { jobs, stats }
    }

    /// Treat any failed job as an error.
    pub fn into_result(self) -> Result<Self, ShotpipeError> {
        if self.stats.failed > 0 {
            Err(ShotpipeError::PartialFailure {
                succeeded: self.stats.succeeded,
                failed: self.stats.failed,
                total: self.stats.total,
            })
        } else {
            Ok(self)
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.jobs.iter().filter(|j| !j.is_success())
    }
}

/// What inspect reports about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub kind: DocumentKind,
    /// Visible sheet names, for spreadsheets whose container can be read.
    pub sheets: Vec<String>,
    /// Slide count in deck order, hidden slides included.
    pub slides: Option<usize>,
    /// 1-based numbers of hidden slides; these cannot be captured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_slides: Vec<usize>,
    /// Page count, for PDFs.
    pub pages: Option<usize>,
}
