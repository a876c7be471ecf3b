// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the scanwerk-pipeline crate: rectification and
// enhancement of a synthetic photographed page.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};

use scanwerk_core::config::EnhanceConfig;
use scanwerk_core::{Point, Quad};
use scanwerk_pipeline::{Enhancer, Rectifier};

/// 600x800 dark frame with a light, slightly skewed page in the middle.
fn synthetic_photo() -> (DynamicImage, Quad) {
    let img = RgbImage::from_fn(600, 800, |x, y| {
        let inside = (90..510).contains(&x) && (120..680).contains(&y);
        if inside && y % 24 < 3 {
            Rgb([35, 35, 35])
        } else if inside {
            Rgb([235, 232, 225])
        } else {
            Rgb([40, 44, 48])
        }
    });
    let quad = Quad::new(
        Point::new(95.0, 118.0),
        Point::new(508.0, 125.0),
        Point::new(505.0, 682.0),
        Point::new(88.0, 676.0),
    );
    (DynamicImage::ImageRgb8(img), quad)
}

fn bench_rectify(c: &mut Criterion) {
    let (photo, quad) = synthetic_photo();
    let rectifier = Rectifier::default();

    c.bench_function("rectify (600x800 -> ~420x560)", |b| {
        b.iter(|| {
            let out = rectifier.rectify(black_box(&photo), black_box(&quad));
            black_box(out.ok());
        });
    });
}

fn bench_enhance(c: &mut Criterion) {
    let (photo, quad) = synthetic_photo();
    let page = Rectifier::default()
        .rectify(&photo, &quad)
        .unwrap_or(photo);
    let enhancer = Enhancer::new(EnhanceConfig::default());

    c.bench_function("enhance (~420x560)", |b| {
        b.iter(|| black_box(enhancer.enhance(black_box(&page))));
    });
}

criterion_group!(benches, bench_rectify, bench_enhance);
criterion_main!(benches);
