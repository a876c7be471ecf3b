// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-document processing: decode, detect, rectify, enhance, encode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use scanwerk_core::config::{OutputConfig, ScanConfig};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::{OutputFormat, Point, Quad};
use tracing::{debug, info, instrument};

use crate::codec;
use crate::detect::{CornerDetector, RectangleDetector};
use crate::enhance::Enhancer;
use crate::page::normalize_to_page;
use crate::rectify::Rectifier;

/// Progress checkpoints reported after each stage.
pub const PROGRESS_DECODED: f32 = 0.1;
pub const PROGRESS_DETECTED: f32 = 0.2;
pub const PROGRESS_RECTIFIED: f32 = 0.5;
pub const PROGRESS_ENHANCED: f32 = 0.8;
pub const PROGRESS_DONE: f32 = 1.0;

/// Receives progress updates in `0.0..=1.0` while a document is processed.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: f32);
}

impl<F> ProgressReporter for F
where
    F: Fn(f32) + Send + Sync,
{
    fn report(&self, progress: f32) {
        self(progress)
    }
}

/// Discards progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: f32) {}
}

/// Cooperative cancellation signal, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag has been raised.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ScanwerkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The result of processing one document.
#[derive(Debug, Clone)]
pub struct ProcessingOutput {
    /// Outline the result was rectified from.
    pub quad: Quad,
    /// Final raster, before encoding.
    pub raster: DynamicImage,
    /// Encoded bytes in `format`.
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// Stateless composition of the processing stages.
///
/// Holds only configuration, so one instance can be shared between threads.
pub struct ProcessingPipeline {
    detector: CornerDetector,
    rectifier: Rectifier,
    enhancer: Enhancer,
    output: OutputConfig,
}

impl ProcessingPipeline {
    /// Pipeline with the contour detector and the thresholds from `config`.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            detector: CornerDetector::with_config(config.detector.clone()),
            rectifier: Rectifier::new(config.geometry),
            enhancer: Enhancer::new(config.enhance.clone()),
            output: config.output.clone(),
        }
    }

    /// Swap in a different rectangle-detection primitive.
    pub fn with_detector(mut self, detector: Arc<dyn RectangleDetector>) -> Self {
        let config = self.detector.config().clone();
        self.detector = CornerDetector::new(detector, config);
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output.format
    }

    /// Detect, rectify, enhance and encode.
    #[instrument(skip_all, fields(data_len = source.len()))]
    pub fn auto_process(
        &self,
        source: &[u8],
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<ProcessingOutput> {
        cancel.check()?;
        let image = codec::decode(source)?;
        progress.report(PROGRESS_DECODED);

        cancel.check()?;
        let quad = self.detector.detect(&image)?;
        progress.report(PROGRESS_DETECTED);

        self.finish(&image, quad, progress, cancel)
    }

    /// Rectify with caller-supplied corners
    /// (`[top_left, top_right, bottom_right, bottom_left]`), then enhance and
    /// encode.
    #[instrument(skip_all, fields(data_len = source.len(), corners = corners.len()))]
    pub fn manual_process(
        &self,
        source: &[u8],
        corners: &[Point],
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<ProcessingOutput> {
        cancel.check()?;
        let image = codec::decode(source)?;
        progress.report(PROGRESS_DECODED);

        let quad = Quad::from_points(corners)?;
        progress.report(PROGRESS_DETECTED);

        self.finish(&image, quad, progress, cancel)
    }

    /// Detection only, for showing an editable outline before processing.
    #[instrument(skip_all, fields(data_len = source.len()))]
    pub fn detect_corners(&self, source: &[u8]) -> Result<Quad> {
        let image = codec::decode(source)?;
        self.detector.detect(&image)
    }

    fn finish(
        &self,
        image: &DynamicImage,
        quad: Quad,
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<ProcessingOutput> {
        cancel.check()?;
        let rectified = self.rectifier.rectify(image, &quad)?;
        progress.report(PROGRESS_RECTIFIED);

        cancel.check()?;
        let mut raster = self.enhancer.enhance(&rectified);
        if self.output.uniform_size {
            let page = (self.output.page_width, self.output.page_height);
            raster = DynamicImage::ImageRgb8(normalize_to_page(&raster, page));
            debug!(page_w = page.0, page_h = page.1, "Result normalised to page size");
        }
        progress.report(PROGRESS_ENHANCED);

        cancel.check()?;
        let bytes = codec::encode(&raster, self.output.format, self.output.jpeg_quality)?;
        progress.report(PROGRESS_DONE);

        info!(
            width = raster.width(),
            height = raster.height(),
            bytes = bytes.len(),
            "Document processed"
        );
        Ok(ProcessingOutput {
            quad,
            raster,
            bytes,
            format: self.output.format,
        })
    }
}
