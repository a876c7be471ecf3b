// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Enhancement filter chain for rectified documents.
//
// Stages run in a fixed order: illumination normalisation, colour controls
// with gamma, luminance sharpening, then noise reduction. A stage that cannot
// run is skipped (or, for noise reduction, replaced by a mild blur); the chain
// as a whole never fails.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use scanwerk_core::config::{DenoiseMethod, EnhanceConfig};
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{debug, info, instrument, warn};

/// Long side of the downscaled copy used to estimate background lighting.
const BACKGROUND_WORKING_SIZE: u32 = 256;

/// Blur used to split signal from noise in the edge-preserving denoiser.
const DENOISE_SIGMA: f32 = 1.0;

/// Applies the enhancement stages to a raster.
#[derive(Debug, Clone, Default)]
pub struct Enhancer {
    config: EnhanceConfig,
}

impl Enhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    /// Run the full chain. The result always has the input's dimensions.
    ///
    /// Applying the chain twice is not the same as applying it once: contrast
    /// and sharpening compound.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return DynamicImage::ImageRgb8(rgb);
        }

        let rgb = or_identity("illumination", rgb, |img| self.normalize_illumination(img));
        let rgb = self.adjust_color(&rgb);
        let rgb = or_identity("sharpen", rgb, |img| self.sharpen_luminance(img));
        let rgb = match self.config.denoise {
            DenoiseMethod::EdgePreserving => match self.reduce_noise(&rgb) {
                Ok(out) => out,
                Err(err) => {
                    warn!(error = %err, "Noise reduction unavailable; using mild blur");
                    self.approximate_denoise(&rgb)
                }
            },
            DenoiseMethod::GaussianApprox => self.approximate_denoise(&rgb),
        };

        info!("Enhancement complete");
        DynamicImage::ImageRgb8(rgb)
    }

    // -- Stages ---------------------------------------------------------------

    /// Divide by a heavily blurred copy to flatten shadows and uneven light.
    ///
    /// The background is estimated on a downscaled copy and scaled back up,
    /// which keeps the large blur radius affordable.
    pub fn normalize_illumination(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width < 2 || height < 2 {
            return Err(ScanwerkError::FilterUnavailable(
                "illumination estimate needs at least 2x2 pixels".into(),
            ));
        }

        let scale = (BACKGROUND_WORKING_SIZE as f32 / width.max(height) as f32).min(1.0);
        let small_w = ((width as f32 * scale).round() as u32).max(1);
        let small_h = ((height as f32 * scale).round() as u32).max(1);
        let sigma = (self.config.illumination_radius * scale).max(0.5);
        debug!(small_w, small_h, sigma, "Estimating background lighting");

        let small = imageops::resize(image, small_w, small_h, FilterType::Triangle);
        let blurred = gaussian_blur_f32(&small, sigma);
        let background = imageops::resize(&blurred, width, height, FilterType::Triangle);

        let mut out = RgbImage::new(width, height);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let src = image.get_pixel(x, y);
            let bg = background.get_pixel(x, y);
            *pixel = Rgb(std::array::from_fn(|c| {
                let value = src.0[c] as f32 / 255.0;
                let light = (bg.0[c] as f32 / 255.0).max(1.0 / 255.0);
                to_channel(value / light)
            }));
        }
        Ok(out)
    }

    /// Saturation, brightness and contrast, followed by a gamma curve.
    pub fn adjust_color(&self, image: &RgbImage) -> RgbImage {
        let cfg = &self.config;
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            let rgb = pixel.0.map(|v| v as f32 / 255.0);
            let luma = luminance(rgb);
            *pixel = Rgb(rgb.map(|v| {
                let v = luma + (v - luma) * cfg.saturation;
                let v = v + cfg.brightness;
                let v = (v - 0.5) * cfg.contrast + 0.5;
                to_channel(v.clamp(0.0, 1.0).powf(cfg.gamma))
            }));
        }
        out
    }

    /// Add the difference between luminance and its blur, scaled by the
    /// configured intensity, to every channel.
    pub fn sharpen_luminance(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width < 3 || height < 3 {
            return Err(ScanwerkError::FilterUnavailable(
                "sharpening needs at least 3x3 pixels".into(),
            ));
        }

        let blurred = gaussian_blur_f32(image, self.config.sharpen_radius.max(0.01));
        let mut out = image.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let src = normalized(pixel);
            let detail = luminance(src) - luminance(normalized(blurred.get_pixel(x, y)));
            let boost = detail * self.config.sharpen_intensity;
            *pixel = Rgb(src.map(|v| to_channel(v + boost)));
        }
        Ok(out)
    }

    /// Smooth small fluctuations and keep (slightly sharpen) real edges.
    ///
    /// Differences from a local blur that stay within `noise_level` are
    /// treated as noise and replaced by the blur. Larger differences are
    /// edges and get amplified by `noise_sharpness`.
    pub fn reduce_noise(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width < 3 || height < 3 {
            return Err(ScanwerkError::FilterUnavailable(
                "edge-preserving noise reduction needs at least 3x3 pixels".into(),
            ));
        }

        let level = self.config.noise_level;
        let sharpness = self.config.noise_sharpness;
        let blurred = gaussian_blur_f32(image, DENOISE_SIGMA);
        let mut out = image.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let src = normalized(pixel);
            let smooth = normalized(blurred.get_pixel(x, y));
            *pixel = Rgb(std::array::from_fn(|c| {
                let delta = src[c] - smooth[c];
                if delta.abs() <= level {
                    to_channel(smooth[c])
                } else {
                    to_channel(src[c] + delta * sharpness)
                }
            }));
        }
        Ok(out)
    }

    /// Very mild Gaussian blur standing in for a real denoiser.
    pub fn approximate_denoise(&self, image: &RgbImage) -> RgbImage {
        gaussian_blur_f32(image, self.config.fallback_blur_radius.max(0.01))
    }
}

// -- Helpers ------------------------------------------------------------------

fn or_identity(
    stage: &'static str,
    image: RgbImage,
    filter: impl FnOnce(&RgbImage) -> Result<RgbImage>,
) -> RgbImage {
    match filter(&image) {
        Ok(out) => out,
        Err(err) => {
            warn!(stage, error = %err, "Filter skipped");
            image
        }
    }
}

fn normalized(pixel: &Rgb<u8>) -> [f32; 3] {
    pixel.0.map(|v| v as f32 / 255.0)
}

/// Rec. 709 luma of a normalised sRGB triple.
fn luminance([r, g, b]: [f32; 3]) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Light paper with a gentle shadow gradient and a few dark strokes.
    fn page(w: u32, h: u32) -> DynamicImage {
        let img = RgbImage::from_fn(w, h, |x, y| {
            let shade = 200 - (x * 60 / w.max(1)) as u8;
            if y % 16 < 3 && x % 40 > 8 {
                Rgb([40, 40, 45])
            } else {
                Rgb([shade, shade, shade.saturating_sub(8)])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn preserves_dimensions() {
        let enhancer = Enhancer::default();
        for (w, h) in [(120, 90), (37, 23), (2, 2), (1, 1), (0, 0)] {
            let out = enhancer.enhance(&page(w, h));
            assert_eq!((out.width(), out.height()), (w, h));
        }
    }

    #[test]
    fn is_not_idempotent() {
        let enhancer = Enhancer::default();
        let once = enhancer.enhance(&page(160, 120));
        let twice = enhancer.enhance(&once);
        assert_ne!(once.as_bytes(), twice.as_bytes());
    }

    #[test]
    fn illumination_flattens_shadow_gradient() {
        let enhancer = Enhancer::default();
        let gradient = RgbImage::from_fn(200, 100, |x, _| {
            let v = 110 + (x / 2) as u8;
            Rgb([v, v, v])
        });
        let flat = enhancer.normalize_illumination(&gradient).expect("filter");
        let left = flat.get_pixel(50, 50).0[0] as i32;
        let right = flat.get_pixel(150, 50).0[0] as i32;
        let before =
            gradient.get_pixel(150, 50).0[0] as i32 - gradient.get_pixel(50, 50).0[0] as i32;
        assert!((right - left).abs() < before, "left {left}, right {right}");
    }

    #[test]
    fn zero_saturation_yields_gray() {
        let enhancer = Enhancer::new(EnhanceConfig {
            saturation: 0.0,
            ..EnhanceConfig::default()
        });
        let colour = RgbImage::from_pixel(4, 4, Rgb([200, 40, 90]));
        let out = enhancer.adjust_color(&colour);
        let [r, g, b] = out.get_pixel(0, 0).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn tiny_images_report_unavailable_filters() {
        let enhancer = Enhancer::default();
        let tiny = RgbImage::from_pixel(2, 2, Rgb([10, 10, 10]));
        assert!(matches!(
            enhancer.reduce_noise(&tiny),
            Err(ScanwerkError::FilterUnavailable(_))
        ));
        assert!(enhancer.sharpen_luminance(&tiny).is_err());
    }

    #[test]
    fn denoise_smooths_flat_noise() {
        let enhancer = Enhancer::default();
        let noisy = RgbImage::from_fn(32, 32, |x, y| {
            let v = if (x + y) % 2 == 0 { 128 } else { 131 };
            Rgb([v, v, v])
        });
        let out = enhancer.reduce_noise(&noisy).expect("filter");
        let a = out.get_pixel(10, 10).0[0] as i32;
        let b = out.get_pixel(11, 10).0[0] as i32;
        assert!((a - b).abs() <= 1);
    }
}
