// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanner configuration, persisted as pretty-printed JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScanwerkError};
use crate::types::{OutputFormat, PageSize};

/// Complete scanner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Encoding and page-size options for processed documents.
    pub output: OutputConfig,
    /// Start the batch automatically as soon as documents are enqueued.
    pub auto_processing: bool,
    /// Clamp applied to the rectified output size.
    pub geometry: SizeClamp,
    /// Thresholds for the document boundary detector.
    pub detector: DetectorConfig,
    /// Parameters of the enhancement filter chain.
    pub enhance: EnhanceConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            auto_processing: true,
            geometry: SizeClamp::default(),
            detector: DetectorConfig::default(),
            enhance: EnhanceConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Read a configuration file. Missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    /// Like [`ScanConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if !path.as_ref().exists() {
            debug!(path = %path.as_ref().display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let out = &self.output;
        if !(0.1..=1.0).contains(&out.jpeg_quality) {
            return Err(ScanwerkError::Config(format!(
                "jpeg_quality must be within 0.1..=1.0, got {}",
                out.jpeg_quality
            )));
        }
        if out.page_width == 0 || out.page_height == 0 {
            return Err(ScanwerkError::Config("page size must be non-zero".into()));
        }

        let geo = &self.geometry;
        if geo.min_dimension == 0 || geo.min_dimension > geo.max_dimension {
            return Err(ScanwerkError::Config(format!(
                "size clamp {}..={} is empty",
                geo.min_dimension, geo.max_dimension
            )));
        }

        let det = &self.detector;
        if !(det.min_aspect_ratio > 0.0
            && det.min_aspect_ratio <= det.max_aspect_ratio
            && det.max_aspect_ratio <= 1.0)
        {
            return Err(ScanwerkError::Config(format!(
                "aspect ratio bounds {}..={} must satisfy 0 < min <= max <= 1",
                det.min_aspect_ratio, det.max_aspect_ratio
            )));
        }
        if !(0.0..=1.0).contains(&det.min_size) || !(0.0..=1.0).contains(&det.min_confidence) {
            return Err(ScanwerkError::Config(
                "min_size and min_confidence must be within 0..=1".into(),
            ));
        }
        if det.max_observations == 0 {
            return Err(ScanwerkError::Config("max_observations must be at least 1".into()));
        }

        let enh = &self.enhance;
        if enh.illumination_radius <= 0.0
            || enh.sharpen_radius <= 0.0
            || enh.fallback_blur_radius <= 0.0
        {
            return Err(ScanwerkError::Config("filter radii must be positive".into()));
        }
        if enh.gamma <= 0.0 {
            return Err(ScanwerkError::Config("gamma must be positive".into()));
        }
        Ok(())
    }
}

/// Output encoding options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Lossy quality factor, 0.1 (smallest) to 1.0 (best).
    pub jpeg_quality: f32,
    /// Letterbox every result onto a page of `page_width` x `page_height`.
    pub uniform_size: bool,
    pub page_width: u32,
    pub page_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let (page_width, page_height) = PageSize::A4.pixels_at_dpi(300);
        Self {
            format: OutputFormat::Jpeg,
            jpeg_quality: 0.9,
            uniform_size: false,
            page_width,
            page_height,
        }
    }
}

/// Bounds for each dimension of a rectified document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeClamp {
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for SizeClamp {
    fn default() -> Self {
        Self {
            min_dimension: 300,
            max_dimension: 4000,
        }
    }
}

impl SizeClamp {
    pub fn clamp(&self, value: f32) -> u32 {
        let rounded = if value.is_finite() { value.round() } else { 0.0 };
        (rounded.max(0.0) as u32).clamp(self.min_dimension, self.max_dimension)
    }
}

/// Thresholds for the rectangle detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest accepted short-side / long-side ratio.
    pub min_aspect_ratio: f32,
    /// Largest accepted short-side / long-side ratio (at most 1.0).
    pub max_aspect_ratio: f32,
    /// Minimum short side of a candidate, relative to the image's short side.
    pub min_size: f32,
    pub min_confidence: f32,
    pub max_observations: usize,
    /// Inset of the fallback boundary, relative to the image's short side.
    /// Clamped to 0.05..=0.10 when used.
    pub fallback_margin: f32,
    /// When false, an image without a detectable rectangle fails detection
    /// instead of falling back to the inset frame.
    pub fallback_enabled: bool,
    /// Detection runs on a copy downscaled to at most this many pixels on the
    /// long side.
    pub max_working_dimension: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_aspect_ratio: 0.2,
            max_aspect_ratio: 1.0,
            min_size: 0.2,
            min_confidence: 0.6,
            max_observations: 10,
            fallback_margin: 0.05,
            fallback_enabled: true,
            max_working_dimension: 1024,
        }
    }
}

/// Noise-reduction backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseMethod {
    /// Threshold-based smoothing that keeps edges.
    EdgePreserving,
    /// Very mild Gaussian blur.
    GaussianApprox,
}

/// Enhancement filter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Blur radius of the background-lighting estimate, in pixels.
    pub illumination_radius: f32,
    pub contrast: f32,
    /// 1.0 keeps colours, 0.0 produces grayscale (useful before OCR).
    pub saturation: f32,
    pub brightness: f32,
    pub gamma: f32,
    pub sharpen_intensity: f32,
    pub sharpen_radius: f32,
    pub noise_level: f32,
    pub noise_sharpness: f32,
    pub fallback_blur_radius: f32,
    pub denoise: DenoiseMethod,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            illumination_radius: 50.0,
            contrast: 1.2,
            saturation: 1.1,
            brightness: 0.1,
            gamma: 0.9,
            sharpen_intensity: 0.8,
            sharpen_radius: 2.5,
            noise_level: 0.02,
            noise_sharpness: 0.4,
            fallback_blur_radius: 0.3,
            denoise: DenoiseMethod::EdgePreserving,
        }
    }
}
