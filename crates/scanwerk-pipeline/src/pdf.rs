// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multi-page PDF export of processed documents using `printpdf` 0.8.
//
// Each document becomes one page: the raster is letterboxed onto a page-sized
// image at the configured resolution and placed edge to edge.

use std::path::Path;

use image::DynamicImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use scanwerk_core::PageSize;
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{debug, info, instrument};

use crate::page::normalize_to_page;

/// Builds a PDF with one page per processed document.
pub struct PdfAssembler {
    page_size: PageSize,
    dpi: u32,
    title: String,
}

impl PdfAssembler {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            dpi: 300,
            title: "Scanwerk Scan".into(),
        }
    }

    /// Resolution of the embedded page images.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi.max(1);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Page image size in pixels at the configured resolution.
    pub fn page_pixels(&self) -> (u32, u32) {
        self.page_size.pixels_at_dpi(self.dpi)
    }

    #[instrument(skip(self, pages), fields(pages = pages.len(), dpi = self.dpi))]
    pub fn assemble(&self, pages: &[DynamicImage]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(ScanwerkError::Export("no pages to export".into()));
        }

        let (w_mm, h_mm) = self.page_size.dimensions_mm();
        let (page_w, page_h) = (Mm(w_mm as f32), Mm(h_mm as f32));
        let pixels = self.page_pixels();
        info!(paper = ?self.page_size, title = %self.title, "Assembling PDF");

        let mut doc = PdfDocument::new(&self.title);
        let mut pdf_pages = Vec::with_capacity(pages.len());

        for image in pages {
            let page_image = normalize_to_page(image, pixels);
            let (width, height) = page_image.dimensions();
            let raw = RawImage {
                pixels: RawImageData::U8(page_image.into_raw()),
                width: width as usize,
                height: height as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: Some(1.0),
                    scale_y: Some(1.0),
                    dpi: Some(self.dpi as f32),
                    rotate: None,
                },
            }];
            pdf_pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pdf_pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(bytes = output.len(), warnings = warnings.len(), "PDF serialised");
        Ok(output)
    }

    /// Assemble and write straight to `path`.
    pub fn write_to_file(&self, pages: &[DynamicImage], path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.assemble(pages)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(path = %path.as_ref().display(), "PDF written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sheet(shade: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 80, Rgb([shade, shade, shade])))
    }

    #[test]
    fn assembles_one_page_per_document() {
        let assembler = PdfAssembler::new(PageSize::A4).with_dpi(20);
        let bytes = assembler
            .assemble(&[sheet(40), sheet(200)])
            .expect("assemble");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_export_is_rejected() {
        let assembler = PdfAssembler::new(PageSize::A4);
        assert!(matches!(
            assembler.assemble(&[]),
            Err(ScanwerkError::Export(_))
        ));
    }

    #[test]
    fn page_pixels_follow_dpi() {
        assert_eq!(PdfAssembler::new(PageSize::A4).page_pixels(), (2480, 3508));
    }
}
