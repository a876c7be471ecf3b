// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Point and quadrilateral math used by the detector and the rectifier.

use scanwerk_core::config::SizeClamp;
use scanwerk_core::{Point, Quad};

/// Euclidean distance between two points.
pub fn edge_length(a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Output size for rectifying `quad`.
///
/// Width is the longer of the top and bottom edges, height the longer of the
/// left and right edges. Each dimension is rounded and clamped.
pub fn estimate_target_size(quad: &Quad, clamp: &SizeClamp) -> (u32, u32) {
    let top = edge_length(quad.top_left, quad.top_right);
    let bottom = edge_length(quad.bottom_left, quad.bottom_right);
    let left = edge_length(quad.top_left, quad.bottom_left);
    let right = edge_length(quad.top_right, quad.bottom_right);

    (clamp.clamp(top.max(bottom)), clamp.clamp(left.max(right)))
}

/// Convert a normalised point with its origin at the bottom-left into pixel
/// coordinates with the origin at the top-left.
pub fn normalized_to_pixel(p: Point, width: u32, height: u32) -> Point {
    Point::new(p.x * width as f32, (1.0 - p.y) * height as f32)
}

/// The image frame inset by `margin_ratio * min(width, height)` on every side.
pub fn inset_quad(width: u32, height: u32, margin_ratio: f32) -> Quad {
    let (w, h) = (width as f32, height as f32);
    let margin = w.min(h) * margin_ratio;
    Quad::new(
        Point::new(margin, margin),
        Point::new(w - margin, margin),
        Point::new(w - margin, h - margin),
        Point::new(margin, h - margin),
    )
}

/// Area of a quadrilateral (shoelace formula). Self-intersecting outlines
/// yield the absolute signed area, which is smaller than the visual one.
pub fn quad_area(quad: &Quad) -> f32 {
    polygon_area(&quad.points())
}

/// Area of a closed polygon given by its vertices in order (CW or CCW).
pub fn polygon_area(points: &[Point]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x as f64 * points[j].y as f64;
        area -= points[j].x as f64 * points[i].y as f64;
    }
    (area.abs() / 2.0) as f32
}

/// Pick the four corners of a roughly rectangular point set.
///
/// The top-left corner minimises `x + y`, bottom-right maximises it.
/// Top-right maximises `x - y`, bottom-left minimises it. Ties keep the
/// earliest point. An empty input yields a quad of origin points.
pub fn order_corners(points: &[Point]) -> Quad {
    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.x - p.y;

    let mut tl = points.first().copied().unwrap_or_default();
    let (mut tr, mut br, mut bl) = (tl, tl, tl);
    for p in points.iter().skip(1) {
        if sum(p) < sum(&tl) {
            tl = *p;
        }
        if sum(p) > sum(&br) {
            br = *p;
        }
        if diff(p) > diff(&tr) {
            tr = *p;
        }
        if diff(p) < diff(&bl) {
            bl = *p;
        }
    }
    Quad::new(tl, tr, br, bl)
}
