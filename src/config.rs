//! Configuration types for capture and optimization.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The defaults are the portfolio asset
//! constraints: at most 1920 px wide, at most 200 KB, WebP quality 85
//! stepping down by 5 to a floor of 55.

use crate::error::ShotpipeError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum output width in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
/// Default output size ceiling: 200 KB.
pub const DEFAULT_TARGET_BYTES: u64 = 200 * 1024;
pub const DEFAULT_INITIAL_QUALITY: u8 = 85;
pub const DEFAULT_MIN_QUALITY: u8 = 55;
pub const DEFAULT_QUALITY_STEP: u8 = 5;

/// Configuration for a capture/optimize run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use shotpipe::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_width(1600)
///     .target_kb(150)
///     .png_copy(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_bytes, 150 * 1024);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Images wider than this are downscaled to exactly this width. Default: 1920.
    pub max_width: u32,

    /// Encoded-size ceiling in bytes. Default: 204 800 (200 KB).
    ///
    /// Best effort: when the floor quality still exceeds it, the oversized
    /// result is kept.
    pub target_bytes: u64,

    /// First WebP quality tried. Range 1–100. Default: 85.
    pub initial_quality: u8,

    /// Lowest WebP quality the encode loop will go to. Default: 55.
    pub min_quality: u8,

    /// Quality decrement between attempts. Default: 5.
    pub quality_step: u8,

    /// Width pdfium rasterises exported pages at. Default: 2560.
    ///
    /// Rendering wider than `max_width` and downscaling with Lanczos gives
    /// crisper text than rendering at the final size.
    pub render_width: u32,

    /// Upper bound on one office export, process start to PDF ready. Default: 120.
    pub export_timeout_secs: u64,

    /// How often the export completion predicate is polled. Default: 250.
    pub poll_interval_ms: u64,

    /// Also write the normalised bitmap as a max-compression PNG next to the
    /// WebP. Default: false.
    pub png_copy: bool,

    /// Run the Optimize Stage after capturing. Default: true.
    pub optimize: bool,

    /// Explicit `soffice` binary. If None, discovered (see `office-headless`).
    pub soffice_path: Option<PathBuf>,

    /// Explicit pdfium library. If None, `PDFIUM_LIB_PATH` then the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Per-job progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            target_bytes: DEFAULT_TARGET_BYTES,
            initial_quality: DEFAULT_INITIAL_QUALITY,
            min_quality: DEFAULT_MIN_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
            render_width: 2560,
            export_timeout_secs: 120,
            poll_interval_ms: 250,
            png_copy: false,
            optimize: true,
            soffice_path: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_width", &self.max_width)
            .field("target_bytes", &self.target_bytes)
            .field("initial_quality", &self.initial_quality)
            .field("min_quality", &self.min_quality)
            .field("quality_step", &self.quality_step)
            .field("render_width", &self.render_width)
            .field("export_timeout_secs", &self.export_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("png_copy", &self.png_copy)
            .field("optimize", &self.optimize)
            .field("soffice_path", &self.soffice_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The encode-loop parameters.
    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            initial_quality: self.initial_quality,
            min_quality: self.min_quality,
            quality_step: self.quality_step,
            target_bytes: self.target_bytes,
        }
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Parameters of the size-constrained encode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub initial_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
    pub target_bytes: u64,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        PipelineConfig::default().encode_settings()
    }
}

impl EncodeSettings {
    /// Upper bound on encode attempts: 7 for 85 → 55 in steps of 5.
    pub fn max_iterations(&self) -> usize {
        let span = self.initial_quality.saturating_sub(self.min_quality) as usize;
        let step = self.quality_step.max(1) as usize;
        span.div_ceil(step) + 1
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_width(mut self, px: u32) -> Self {
        self.config.max_width = px.max(16);
        self
    }

    pub fn target_bytes(mut self, bytes: u64) -> Self {
        self.config.target_bytes = bytes;
        self
    }

    pub fn target_kb(mut self, kb: u64) -> Self {
        self.config.target_bytes = kb.saturating_mul(1024);
        self
    }

    pub fn initial_quality(mut self, q: u8) -> Self {
        self.config.initial_quality = q.clamp(1, 100);
        self
    }

    pub fn min_quality(mut self, q: u8) -> Self {
        self.config.min_quality = q.clamp(1, 100);
        self
    }

    pub fn quality_step(mut self, step: u8) -> Self {
        self.config.quality_step = step.max(1);
        self
    }

    pub fn render_width(mut self, px: u32) -> Self {
        self.config.render_width = px.clamp(256, 8192);
        self
    }

    pub fn export_timeout_secs(mut self, secs: u64) -> Self {
        self.config.export_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn png_copy(mut self, v: bool) -> Self {
        self.config.png_copy = v;
        self
    }

    pub fn optimize(mut self, v: bool) -> Self {
        self.config.optimize = v;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ShotpipeError> {
        let c = &self.config;
        if c.min_quality > c.initial_quality {
            return Err(ShotpipeError::InvalidConfig(format!(
                "minimum quality {} is above initial quality {}",
                c.min_quality, c.initial_quality
            )));
        }
        if c.target_bytes == 0 {
            return Err(ShotpipeError::InvalidConfig(
                "target size must be > 0 bytes".into(),
            ));
        }
        if c.export_timeout_secs == 0 {
            return Err(ShotpipeError::InvalidConfig(
                "export timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_asset_constraints() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_width, 1920);
        assert_eq!(c.target_bytes, 204_800);
        assert_eq!(c.initial_quality, 85);
        assert_eq!(c.min_quality, 55);
        assert_eq!(c.quality_step, 5);
    }

    #[test]
    fn default_loop_is_seven_iterations() {
        assert_eq!(EncodeSettings::default().max_iterations(), 7);
    }

    #[test]
    fn uneven_step_rounds_up() {
        let s = EncodeSettings {
            initial_quality: 85,
            min_quality: 55,
            quality_step: 7,
            target_bytes: 1,
        };
        // 85, 78, 71, 64, 57, 55
        assert_eq!(s.max_iterations(), 6);
    }

    #[test]
    fn builder_clamps_quality() {
        let c = PipelineConfig::builder()
            .initial_quality(150)
            .min_quality(0)
            .build()
            .unwrap();
        assert_eq!(c.initial_quality, 100);
        assert_eq!(c.min_quality, 1);
    }

    #[test]
    fn builder_rejects_inverted_quality_range() {
        let err = PipelineConfig::builder()
            .initial_quality(50)
            .min_quality(60)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("minimum quality"));
    }

    #[test]
    fn builder_rejects_zero_target() {
        assert!(PipelineConfig::builder().target_bytes(0).build().is_err());
    }
}
