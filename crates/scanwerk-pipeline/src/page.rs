// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Uniform page sizing: letterbox a result onto a fixed-size white page.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, instrument};

/// Scale `image` to fit inside a `width` x `height` page, preserving its
/// aspect ratio, and centre it on a white background.
#[instrument(skip(image), fields(src_w = image.width(), src_h = image.height()))]
pub fn normalize_to_page(image: &DynamicImage, (width, height): (u32, u32)) -> RgbImage {
    let mut page = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let (src_w, src_h) = (image.width(), image.height());
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return page;
    }

    let scale = (width as f64 / src_w as f64).min(height as f64 / src_h as f64);
    let fit_w = ((src_w as f64 * scale).round() as u32).clamp(1, width);
    let fit_h = ((src_h as f64 * scale).round() as u32).clamp(1, height);
    let resized = imageops::resize(&image.to_rgb8(), fit_w, fit_h, FilterType::Lanczos3);

    let x = (width - fit_w) / 2;
    let y = (height - fit_h) / 2;
    imageops::overlay(&mut page, &resized, x as i64, y as i64);
    debug!(fit_w, fit_h, x, y, "Image placed on page");
    page
}
