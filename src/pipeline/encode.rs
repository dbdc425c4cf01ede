//! Image encoding: size-constrained WebP, max-compression PNG, atomic writes.
//!
//! The WebP loop encodes in memory at decreasing quality until the result
//! fits the byte budget or the quality floor is reached. Nothing touches the
//! destination until the final attempt is chosen, so an interrupted run never
//! leaves a half-written or intermediate-quality file behind.

use crate::config::EncodeSettings;
use crate::error::JobError;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};
use std::ffi::{c_int, OsString};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The chosen WebP encoding.
#[derive(Debug, Clone)]
pub struct EncodedWebp {
    pub bytes: Vec<u8>,
    pub quality: u8,
    /// Encode attempts made, including this one.
    pub iterations: usize,
    /// Whether `bytes` fits the configured ceiling.
    pub within_budget: bool,
}

/// libwebp effort level: 6 is the slowest and smallest.
const WEBP_METHOD: c_int = 6;

/// Lossy WebP at a single quality, maximum compression effort.
pub fn encode_webp(img: &RgbImage, quality: u8) -> Result<Vec<u8>, JobError> {
    let mut config =
        webp::WebPConfig::new().map_err(|_| JobError::encode("webp: cannot initialise encoder config"))?;
    config.lossless = 0;
    config.quality = quality as f32;
    config.method = WEBP_METHOD;

    let encoder = webp::Encoder::from_rgb(img.as_raw(), img.width(), img.height());
    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| JobError::encode(format!("webp at quality {quality}: {e:?}")))?;
    Ok(memory.to_vec())
}

/// Encode at `initial_quality`, stepping down until the output fits
/// `target_bytes` or `min_quality` has been tried.
///
/// Over-budget output at the floor is returned with `within_budget = false`
/// rather than failing. Never makes more than
/// [`EncodeSettings::max_iterations`] attempts.
pub fn encode_within_budget(img: &RgbImage, settings: &EncodeSettings) -> Result<EncodedWebp, JobError> {
    let step = settings.quality_step.max(1);
    let max_iterations = settings.max_iterations();
    let mut quality = settings.initial_quality;
    let mut iterations = 0;

    loop {
        let bytes = encode_webp(img, quality)?;
        iterations += 1;
        let size = bytes.len() as u64;
        let within_budget = size <= settings.target_bytes;
        debug!("WebP q{} → {} bytes (target {})", quality, size, settings.target_bytes);

        if within_budget || quality <= settings.min_quality || iterations >= max_iterations {
            return Ok(EncodedWebp {
                bytes,
                quality,
                iterations,
                within_budget,
            });
        }
        quality = quality.saturating_sub(step).max(settings.min_quality);
    }
}

/// Lossless PNG at the highest compression level with adaptive filtering.
pub fn encode_png_best(img: &RgbImage) -> Result<Vec<u8>, JobError> {
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .map_err(|e| JobError::encode(format!("png: {e}")))?;
    Ok(buf)
}

/// PNG of a captured view as rendered, alpha preserved.
pub fn encode_capture_png(img: &DynamicImage) -> Result<Vec<u8>, JobError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| JobError::encode(format!("capture png: {e}")))?;
    Ok(buf)
}

/// Replace `path` with `bytes` in one step: write a sibling temp file, then rename.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = (|| {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}
