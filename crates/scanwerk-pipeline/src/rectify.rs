// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective correction: warp a document quadrilateral onto an upright
// rectangle.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use scanwerk_core::config::SizeClamp;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::{Point, Quad};
use tracing::{debug, info, instrument};

use crate::geometry::{estimate_target_size, quad_area};

/// Maps a quadrilateral in the source image onto an axis-aligned raster.
///
/// Corners are pixel coordinates with the origin at the top-left. The mapping
/// is direct: `top_left` lands on `(0, 0)`, `top_right` on `(w, 0)`,
/// `bottom_right` on `(w, h)` and `bottom_left` on `(0, h)`. Samples that fall
/// outside the source are filled with white.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rectifier {
    clamp: SizeClamp,
}

impl Rectifier {
    pub fn new(clamp: SizeClamp) -> Self {
        Self { clamp }
    }

    /// Output dimensions for `quad`.
    pub fn target_size(&self, quad: &Quad) -> (u32, u32) {
        estimate_target_size(quad, &self.clamp)
    }

    /// Rectify using a caller-supplied corner list in
    /// `[top_left, top_right, bottom_right, bottom_left]` order.
    pub fn rectify_points(&self, image: &DynamicImage, corners: &[Point]) -> Result<DynamicImage> {
        let quad = Quad::from_points(corners)?;
        self.rectify(image, &quad)
    }

    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn rectify(&self, image: &DynamicImage, quad: &Quad) -> Result<DynamicImage> {
        if !quad.is_finite() {
            return Err(ScanwerkError::RectificationFailed(
                "corner coordinates are not finite".into(),
            ));
        }
        let area = quad_area(quad);
        if area < 1.0 {
            return Err(ScanwerkError::RectificationFailed(format!(
                "quadrilateral is degenerate (area {area:.2})"
            )));
        }

        let (out_w, out_h) = self.target_size(quad);
        let (w, h) = (out_w as f32, out_h as f32);
        let src = quad.points().map(|p| p.as_tuple());
        let dst = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        debug!(?src, out_w, out_h, "Computing projective transform");

        let projection = Projection::from_control_points(src, dst).ok_or_else(|| {
            ScanwerkError::RectificationFailed("projective transform is singular".into())
        })?;

        let rgb = image.to_rgb8();
        let mut output = RgbImage::new(out_w, out_h);
        warp_into(
            &rgb,
            &projection,
            Interpolation::Bilinear,
            Rgb([255u8, 255, 255]),
            &mut output,
        );

        info!(out_w, out_h, "Perspective correction applied");
        Ok(DynamicImage::ImageRgb8(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb<u8> = Rgb([220, 20, 20]);
    const GREEN: Rgb<u8> = Rgb([20, 200, 20]);
    const BLUE: Rgb<u8> = Rgb([20, 20, 220]);
    const YELLOW: Rgb<u8> = Rgb([230, 220, 20]);

    /// 400x400 gray image with a coloured 80x80 block inside each corner of
    /// the region (40,40)-(360,360).
    fn marked_image() -> DynamicImage {
        let img = RgbImage::from_fn(400, 400, |x, y| {
            let left = (40..120).contains(&x);
            let right = (280..360).contains(&x);
            let top = (40..120).contains(&y);
            let bottom = (280..360).contains(&y);
            match (left, right, top, bottom) {
                (true, _, true, _) => RED,
                (_, true, true, _) => GREEN,
                (_, true, _, true) => BLUE,
                (true, _, _, true) => YELLOW,
                _ => Rgb([128, 128, 128]),
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn marked_quad() -> Quad {
        Quad::new(
            Point::new(40.0, 40.0),
            Point::new(360.0, 40.0),
            Point::new(360.0, 360.0),
            Point::new(40.0, 360.0),
        )
    }

    fn near(actual: &Rgb<u8>, expected: Rgb<u8>) -> bool {
        actual
            .0
            .iter()
            .zip(expected.0.iter())
            .all(|(a, e)| (*a as i32 - *e as i32).abs() <= 10)
    }

    #[test]
    fn corners_map_directly_onto_output_corners() {
        let out = Rectifier::default()
            .rectify(&marked_image(), &marked_quad())
            .expect("rectify")
            .to_rgb8();
        assert_eq!(out.dimensions(), (320, 320));

        assert!(near(out.get_pixel(30, 30), RED));
        assert!(near(out.get_pixel(290, 30), GREEN));
        assert!(near(out.get_pixel(290, 290), BLUE));
        assert!(near(out.get_pixel(30, 290), YELLOW));
    }

    #[test]
    fn relabelled_corners_rotate_the_output() {
        let quad = marked_quad().rotated_labels();
        let out = Rectifier::default()
            .rectify(&marked_image(), &quad)
            .expect("rectify")
            .to_rgb8();

        // The old top-right corner is now the output's top-left.
        assert!(near(out.get_pixel(30, 30), GREEN));
        assert!(near(out.get_pixel(290, 30), BLUE));
        assert!(near(out.get_pixel(290, 290), YELLOW));
        assert!(near(out.get_pixel(30, 290), RED));
    }

    #[test]
    fn output_matches_estimated_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(900, 700, Rgb([200, 200, 200])));
        let quad = Quad::new(
            Point::new(60.0, 40.0),
            Point::new(820.0, 90.0),
            Point::new(780.0, 650.0),
            Point::new(30.0, 600.0),
        );
        let rectifier = Rectifier::default();
        let out = rectifier.rectify(&image, &quad).expect("rectify");
        assert_eq!((out.width(), out.height()), rectifier.target_size(&quad));
    }

    #[test]
    fn small_quads_are_clamped_up() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])));
        let quad = Quad::new(
            Point::new(10.0, 10.0),
            Point::new(60.0, 10.0),
            Point::new(60.0, 90.0),
            Point::new(10.0, 90.0),
        );
        let out = Rectifier::default().rectify(&image, &quad).expect("rectify");
        assert_eq!((out.width(), out.height()), (300, 300));
    }

    #[test]
    fn collinear_corners_fail() {
        let image = marked_image();
        let quad = Quad::new(
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(200.0, 200.0),
            Point::new(300.0, 300.0),
        );
        assert!(matches!(
            Rectifier::default().rectify(&image, &quad),
            Err(ScanwerkError::RectificationFailed(_))
        ));
    }

    #[test]
    fn non_finite_corners_fail() {
        let mut quad = marked_quad();
        quad.top_right.x = f32::NAN;
        assert!(matches!(
            Rectifier::default().rectify(&marked_image(), &quad),
            Err(ScanwerkError::RectificationFailed(_))
        ));
    }

    #[test]
    fn wrong_corner_count_fails() {
        let corners = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)];
        assert!(matches!(
            Rectifier::default().rectify_points(&marked_image(), &corners),
            Err(ScanwerkError::InvalidCornerCount(3))
        ));
    }
}
