//! Optimize Stage: bitmap → web-ready WebP under a byte budget.
//!
//! Used two ways: on every fresh capture at the end of a job, and stand-alone
//! over existing PNGs via [`optimize_paths`] (the `shotpipe optimize`
//! subcommand).
//!
//! ```text
//! bitmap ─▶ flatten on white ─▶ cap width (Lanczos3) ─▶ WebP q85…q55 ─▶ write once
//!                                                    └▶ PNG (best) copy, optional
//! ```

use crate::capture::CapturedView;
use crate::config::PipelineConfig;
use crate::error::{JobError, ShotpipeError};
use crate::job::ViewId;
use crate::output::{BatchReport, JobOutcome, OptimizeResult};
use crate::pipeline::{encode, normalize};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Optimise `image` into `output` (a `.webp` path).
///
/// `protected` names a file that must never be overwritten, normally the
/// source the image was read from; the PNG copy is skipped when it would
/// land on it. `source_bytes` feeds the savings figure in the result.
pub fn optimize_image(
    image: &DynamicImage,
    output: &Path,
    source_bytes: Option<u64>,
    protected: Option<&Path>,
    config: &PipelineConfig,
) -> Result<OptimizeResult, JobError> {
    let rgb = normalize::normalize(image, config.max_width);
    let (width, height) = rgb.dimensions();

    let encoded = encode::encode_within_budget(&rgb, &config.encode_settings())?;
    encode::write_atomic(output, &encoded.bytes)
        .map_err(|e| JobError::encode(format!("writing '{}': {e}", output.display())))?;

    if !encoded.within_budget {
        warn!(
            "{}: {} KB at quality floor {} exceeds {} KB target",
            output.display(),
            encoded.bytes.len() / 1024,
            encoded.quality,
            config.target_bytes / 1024
        );
    }

    let png_copy = if config.png_copy {
        let copy = output.with_extension("png");
        if protected.is_some_and(|p| same_file(p, &copy)) {
            debug!("Skipping PNG copy over source {}", copy.display());
            None
        } else {
            let png = encode::encode_png_best(&rgb)?;
            encode::write_atomic(&copy, &png)
                .map_err(|e| JobError::encode(format!("writing '{}': {e}", copy.display())))?;
            Some(copy)
        }
    } else {
        None
    };

    let result = OptimizeResult {
        output: output.to_path_buf(),
        bytes: encoded.bytes.len() as u64,
        quality: encoded.quality,
        width,
        height,
        iterations: encoded.iterations,
        within_budget: encoded.within_budget,
        source_bytes,
        png_copy,
    };
    match result.savings_percent() {
        Some(pct) => info!(
            "Optimised {} → {}x{} q{} {} KB ({:.1}% smaller)",
            output.display(),
            width,
            height,
            result.quality,
            result.bytes / 1024,
            pct
        ),
        None => info!(
            "Optimised {} → {}x{} q{} {} KB",
            output.display(),
            width,
            height,
            result.quality,
            result.bytes / 1024
        ),
    }
    Ok(result)
}

/// Optimise a fresh capture. The capture PNG itself may be replaced by the
/// PNG copy, since it is a pipeline artefact rather than a user source.
pub fn optimize_capture(
    captured: &CapturedView,
    output: &Path,
    config: &PipelineConfig,
) -> Result<OptimizeResult, JobError> {
    optimize_image(captured.image(), output, Some(captured.bytes()), None, config)
}

/// Decode `input` and optimise it into `output`.
pub fn optimize_file(input: &Path, output: &Path, config: &PipelineConfig) -> Result<OptimizeResult, JobError> {
    if !input.exists() {
        return Err(JobError::DocumentNotFound {
            path: input.to_path_buf(),
        });
    }
    let image = image::open(input).map_err(|e| JobError::UnsupportedDocument {
        path: input.to_path_buf(),
        detail: format!("cannot decode image: {e}"),
    })?;
    let source_bytes = std::fs::metadata(input).ok().map(|m| m.len());
    optimize_image(&image, output, source_bytes, Some(input), config)
}

/// Expand directories into their `*.png` files, sorted by name; files pass
/// through as given.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ShotpipeError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .map_err(|e| ShotpipeError::InvalidConfig(format!("cannot read '{}': {e}", input.display())))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|e| e.eq_ignore_ascii_case("png"))
                })
                .collect();
            found.sort();
            debug!("{}: {} PNG files", input.display(), found.len());
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Where the WebP for `input` goes: next to it, or inside `output_dir`.
pub fn optimized_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.join(input.file_name().unwrap_or_default()).with_extension("webp"),
        None => input.with_extension("webp"),
    }
}

/// Optimise existing images as a batch, one outcome per file.
///
/// A missing or undecodable file fails its own entry only.
pub async fn optimize_paths(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    config: &PipelineConfig,
) -> Result<BatchReport, ShotpipeError> {
    let total_start = Instant::now();
    let files = collect_inputs(inputs)?;
    if files.is_empty() {
        return Err(ShotpipeError::InvalidConfig("no input images found".into()));
    }
    let total = files.len();
    info!("Optimising {} images", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut outcomes = Vec::with_capacity(total);
    for (index, input) in files.into_iter().enumerate() {
        let label = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        if let Some(ref cb) = config.progress_callback {
            cb.on_job_start(index, total, &label);
        }

        let started = Instant::now();
        let output = optimized_output_path(&input, output_dir);
        let cfg = config.clone();
        let src = input.clone();
        let result = tokio::task::spawn_blocking(move || optimize_file(&src, &output, &cfg))
            .await
            .map_err(|e| ShotpipeError::Internal(format!("optimize task panicked: {e}")))?;

        let (optimized, error) = match result {
            Ok(r) => (Some(r), None),
            Err(e) => {
                warn!("{}: {}", input.display(), e);
                (None, Some(e))
            }
        };
        let outcome = JobOutcome {
            index,
            label,
            document: input,
            view: ViewId::First,
            capture: None,
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
        outcomes.push(outcome);
    }

    let report = BatchReport::new(outcomes, total_start.elapsed().as_millis() as u64);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, report.stats.succeeded);
    }
    Ok(report)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
