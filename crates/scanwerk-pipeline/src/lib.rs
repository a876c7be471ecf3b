// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-pipeline: the per-document image processing pipeline.
//
// Finds the document boundary in a photo, corrects perspective, enhances the
// flattened page, and encodes the result. Also provides page normalisation
// and multi-page PDF export for finished documents.

pub mod codec;
pub mod detect;
pub mod enhance;
pub mod geometry;
pub mod page;
pub mod pdf;
pub mod pipeline;
pub mod rectify;

pub use detect::{ContourRectangleDetector, CornerDetector, RectangleDetector, UnavailableDetector};
pub use enhance::Enhancer;
pub use pdf::PdfAssembler;
pub use pipeline::{CancelFlag, NoProgress, ProcessingOutput, ProcessingPipeline, ProgressReporter};
pub use rectify::Rectifier;
