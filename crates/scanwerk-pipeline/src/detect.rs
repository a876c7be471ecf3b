// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document boundary detection.
//
// A `RectangleDetector` proposes candidate rectangles with a confidence score.
// `CornerDetector` picks the best one and, when nothing usable comes back,
// falls back to an inset of the full frame so the pipeline can still proceed.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::filter::gaussian_blur_f32;
use scanwerk_core::config::DetectorConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::{Point, Quad};
use tracing::{debug, info, instrument, warn};

use crate::geometry::{
    edge_length, inset_quad, normalized_to_pixel, order_corners, polygon_area, quad_area,
};

/// Fallback inset bounds, relative to the image's short side.
const FALLBACK_MARGIN_MIN: f32 = 0.05;
const FALLBACK_MARGIN_MAX: f32 = 0.10;

/// Candidates covering more than this share of the frame are the frame itself.
const MAX_FRAME_COVERAGE: f32 = 0.97;

/// Minimum distance between the two Otsu class means for the image to count
/// as having a foreground at all.
const MIN_CLASS_CONTRAST: f64 = 40.0;

/// A candidate document outline.
///
/// Corners are normalised to `0.0..=1.0` with the origin at the bottom-left,
/// so `top_left.y` is close to 1.0 for an upright document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectangleObservation {
    pub corners: Quad,
    pub confidence: f32,
}

/// A rectangle-finding primitive.
pub trait RectangleDetector: Send + Sync {
    /// Return candidate rectangles that satisfy the thresholds in `config`,
    /// at most `config.max_observations` of them.
    fn detect_rectangles(
        &self,
        image: &DynamicImage,
        config: &DetectorConfig,
    ) -> Result<Vec<RectangleObservation>>;
}

/// Finds bright (or dark) quadrilateral blobs with contour tracing.
///
/// The image is downscaled, blurred, and split with an Otsu threshold. Every
/// outer contour is reduced to its four extreme points, and the ratio of the
/// contour's area to that quad's area is used as the confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContourRectangleDetector;

impl RectangleDetector for ContourRectangleDetector {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn detect_rectangles(
        &self,
        image: &DynamicImage,
        config: &DetectorConfig,
    ) -> Result<Vec<RectangleObservation>> {
        let working = downscale(image, config.max_working_dimension);
        let gray = gaussian_blur_f32(&working.to_luma8(), 1.0);
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return Ok(Vec::new());
        }

        let split = otsu_split(&gray);
        debug!(
            threshold = split.threshold,
            low_mean = split.low_mean,
            high_mean = split.high_mean,
            "Otsu split computed"
        );
        if split.high_mean - split.low_mean < MIN_CLASS_CONTRAST {
            debug!("Image has no distinct foreground");
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for bright_foreground in [true, false] {
            let mask = binarize(&gray, split.threshold, bright_foreground);
            collect_candidates(&mask, config, &mut candidates);
        }

        // Stable sort keeps contour order for equal confidences.
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(config.max_observations);
        debug!(count = candidates.len(), "Rectangle candidates found");
        Ok(candidates)
    }
}

/// A detector for platforms without a rectangle-finding backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDetector;

impl RectangleDetector for UnavailableDetector {
    fn detect_rectangles(
        &self,
        _image: &DynamicImage,
        _config: &DetectorConfig,
    ) -> Result<Vec<RectangleObservation>> {
        warn!("rectangle detection backend not available");
        Err(ScanwerkError::FilterUnavailable(
            "rectangle detection backend not available".into(),
        ))
    }
}

/// Locates the document boundary in a decoded image.
pub struct CornerDetector {
    primary: std::sync::Arc<dyn RectangleDetector>,
    config: DetectorConfig,
}

impl CornerDetector {
    pub fn new(primary: std::sync::Arc<dyn RectangleDetector>, config: DetectorConfig) -> Self {
        Self { primary, config }
    }

    /// Contour-based detection with the given thresholds.
    pub fn with_config(config: DetectorConfig) -> Self {
        Self::new(std::sync::Arc::new(ContourRectangleDetector), config)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Return the document outline in pixel coordinates (origin top-left).
    ///
    /// The highest-confidence candidate wins; among equal scores the first one
    /// reported by the primary detector is kept. If the primary detector
    /// errors or finds nothing, the frame inset by 5-10% of the short side is
    /// returned instead.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Result<Quad> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ScanwerkError::DetectionFailed("image has no pixels".into()));
        }

        let observations = match self.primary.detect_rectangles(image, &self.config) {
            Ok(observations) => observations,
            Err(err) => {
                warn!(error = %err, "Primary rectangle detection failed");
                Vec::new()
            }
        };

        let best = observations.iter().fold(None::<&RectangleObservation>, |best, obs| match best {
            Some(current) if current.confidence >= obs.confidence => Some(current),
            _ => Some(obs),
        });

        if let Some(best) = best {
            let corners = best.corners;
            let quad = Quad::new(
                normalized_to_pixel(corners.top_left, width, height),
                normalized_to_pixel(corners.top_right, width, height),
                normalized_to_pixel(corners.bottom_right, width, height),
                normalized_to_pixel(corners.bottom_left, width, height),
            );
            info!(confidence = best.confidence, ?quad, "Document boundary detected");
            return Ok(quad);
        }

        if !self.config.fallback_enabled {
            return Err(ScanwerkError::DetectionFailed(
                "no document boundary found".into(),
            ));
        }

        let margin = self
            .config
            .fallback_margin
            .clamp(FALLBACK_MARGIN_MIN, FALLBACK_MARGIN_MAX);
        warn!(margin, "No rectangle found; using inset frame");
        Ok(inset_quad(width, height, margin))
    }
}

// -- Contour helpers ----------------------------------------------------------

fn downscale(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let long_side = image.width().max(image.height());
    if max_dimension == 0 || long_side <= max_dimension {
        return image.clone();
    }
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

fn binarize(gray: &GrayImage, threshold: u8, bright_foreground: bool) -> GrayImage {
    let mut mask = gray.clone();
    for pixel in mask.pixels_mut() {
        let on = (pixel.0[0] > threshold) == bright_foreground;
        *pixel = Luma([if on { 255 } else { 0 }]);
    }
    mask
}

fn collect_candidates(
    mask: &GrayImage,
    config: &DetectorConfig,
    out: &mut Vec<RectangleObservation>,
) {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as f32, height as f32);
    let frame_area = w * h;
    let min_side = w.min(h) * config.min_size;

    for contour in find_contours::<i32>(mask) {
        if contour.border_type != BorderType::Outer || contour.points.len() < 4 {
            continue;
        }

        let points: Vec<Point> = contour
            .points
            .iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect();
        let quad = order_corners(&points);

        let area = quad_area(&quad);
        if area < 1.0 || area >= frame_area * MAX_FRAME_COVERAGE {
            continue;
        }

        let horizontal = edge_length(quad.top_left, quad.top_right)
            .max(edge_length(quad.bottom_left, quad.bottom_right));
        let vertical = edge_length(quad.top_left, quad.bottom_left)
            .max(edge_length(quad.top_right, quad.bottom_right));
        let (short, long) = (horizontal.min(vertical), horizontal.max(vertical));
        if short < min_side || long <= 0.0 {
            continue;
        }
        let aspect = short / long;
        if aspect < config.min_aspect_ratio || aspect > config.max_aspect_ratio {
            continue;
        }

        let confidence = (polygon_area(&points) / area).min(1.0);
        if confidence < config.min_confidence {
            continue;
        }

        let normalize = |p: Point| Point::new(p.x / w, 1.0 - p.y / h);
        out.push(RectangleObservation {
            corners: Quad::new(
                normalize(quad.top_left),
                normalize(quad.top_right),
                normalize(quad.bottom_right),
                normalize(quad.bottom_left),
            ),
            confidence,
        });
    }
}

struct OtsuSplit {
    threshold: u8,
    low_mean: f64,
    high_mean: f64,
}

/// Otsu's threshold together with the means of the two classes it separates.
fn otsu_split(gray: &GrayImage) -> OtsuSplit {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total_pixels = gray.width() as u64 * gray.height() as u64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut split = OtsuSplit {
        threshold: 0,
        low_mean: 0.0,
        high_mean: 0.0,
    };
    let mut sum_background = 0.0f64;
    let mut weight_background = 0u64;
    let mut max_variance = 0.0f64;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;

        let between_variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            split = OtsuSplit {
                threshold: t as u8,
                low_mean: mean_background,
                high_mean: mean_foreground,
            };
        }
    }

    split
}
