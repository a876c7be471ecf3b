// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk document scanner.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanwerkError};

/// Unique identifier for a document in the batch queue.
///
/// Assigned when the document is enqueued and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D point in source-image pixel space (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn as_tuple(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Four ordered corners describing a document boundary.
///
/// No convexity is enforced: a self-intersecting quad is representable and
/// is rejected (or produces degenerate output) further down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quad {
    pub const fn new(
        top_left: Point,
        top_right: Point,
        bottom_right: Point,
        bottom_left: Point,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Build a quad from a `[top_left, top_right, bottom_right, bottom_left]`
    /// slice. Fails with `InvalidCornerCount` unless exactly four points are given.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        match points {
            [tl, tr, br, bl] => Ok(Self::new(*tl, *tr, *br, *bl)),
            _ => Err(ScanwerkError::InvalidCornerCount(points.len())),
        }
    }

    /// Corners in `[top_left, top_right, bottom_right, bottom_left]` order.
    pub fn points(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Shift every label one position clockwise: the old top-right becomes
    /// the new top-left, and so on. Geometrically the same outline, viewed
    /// as rotated by 90 degrees.
    pub fn rotated_labels(&self) -> Self {
        Self::new(
            self.top_right,
            self.bottom_right,
            self.bottom_left,
            self.top_left,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.points().iter().all(Point::is_finite)
    }
}

/// Lifecycle states of a document in the batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Queued, waiting for the batch to reach it.
    Pending,
    /// The pipeline is currently running for this document.
    Processing,
    /// A result is available.
    Completed,
    /// The last attempt failed. See the entry's error fields.
    Failed,
    /// A completed result is awaiting user confirmation.
    Reviewing,
}

impl DocumentStatus {
    /// Short label for list views.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting",
            Self::Processing => "Processing",
            Self::Completed => "Done",
            Self::Failed => "Failed",
            Self::Reviewing => "Reviewing",
        }
    }

    /// Whether the batch has finished with this document (successfully or not).
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Reviewing)
    }

    /// Whether the user can trigger a retry.
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Whether `reprocess` is allowed from this state.
    pub fn can_reprocess(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Reviewing)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Reviewing => "reviewing",
        };
        f.write_str(s)
    }
}

/// Encoded output formats for processed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Heic,
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Heic => "heic",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Heic => "image/heic",
        }
    }

    /// Parse a user-supplied format name or extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }
}

/// Standard page sizes for uniform-size export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    A4,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PageSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// Pixel dimensions at the given resolution.
    ///
    /// A4 at 300 DPI is 2480 x 3508.
    pub fn pixels_at_dpi(&self, dpi: u32) -> (u32, u32) {
        let (w_mm, h_mm) = self.dimensions_mm();
        let to_px = |mm: u32| (mm as f64 * dpi as f64 / 25.4).round() as u32;
        (to_px(w_mm), to_px(h_mm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Quad {
        Quad::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        )
    }

    #[test]
    fn from_points_requires_exactly_four() {
        let pts = square().points();
        assert!(Quad::from_points(&pts).is_ok());

        match Quad::from_points(&pts[..3]) {
            Err(ScanwerkError::InvalidCornerCount(3)) => {}
            other => panic!("expected InvalidCornerCount(3), got {other:?}"),
        }
        assert!(Quad::from_points(&[]).is_err());
    }

    #[test]
    fn rotated_labels_cycles_back_after_four_turns() {
        let q = square();
        let r = q.rotated_labels();
        assert_eq!(r.top_left, q.top_right);
        assert_eq!(r.bottom_left, q.top_left);
        assert_eq!(
            q.rotated_labels()
                .rotated_labels()
                .rotated_labels()
                .rotated_labels(),
            q
        );
    }

    #[test]
    fn status_transitions_helpers() {
        assert!(DocumentStatus::Failed.can_retry());
        assert!(!DocumentStatus::Completed.can_retry());
        assert!(DocumentStatus::Reviewing.can_reprocess());
        assert!(!DocumentStatus::Pending.can_reprocess());
        assert!(!DocumentStatus::Processing.is_final());
        assert_eq!(DocumentStatus::Reviewing.to_string(), "reviewing");
    }

    #[test]
    fn a4_at_300_dpi() {
        assert_eq!(PageSize::A4.pixels_at_dpi(300), (2480, 3508));
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!(OutputFormat::from_name("JPEG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_name("png"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_name("gif"), None);
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
    }
}
