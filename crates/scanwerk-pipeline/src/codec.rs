// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decoding of source photos and encoding of processed results.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use scanwerk_core::OutputFormat;
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{debug, instrument};

/// Decode JPEG, PNG, TIFF, BMP, or any other container the `image` crate
/// recognises.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)
        .map_err(|err| ScanwerkError::DecodeFailed(format!("failed to decode image: {}", err)))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ScanwerkError::DecodeFailed("image has no pixels".into()));
    }
    debug!(width = image.width(), height = image.height(), "Image decoded");
    Ok(image)
}

/// Map a `0.1..=1.0` quality factor to the encoder's 1-100 scale.
pub fn jpeg_quality_percent(quality: f32) -> u8 {
    let quality = if quality.is_finite() { quality } else { 0.9 };
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}

/// Encode a raster. `quality` only affects lossy formats.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn encode(image: &DynamicImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>> {
    let bytes = match format {
        OutputFormat::Jpeg => {
            let mut buffer = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality_percent(quality));
            image.to_rgb8().write_with_encoder(encoder).map_err(|err| {
                ScanwerkError::EncodeFailed(format!("JPEG encoding failed: {}", err))
            })?;
            buffer
        }
        OutputFormat::Png => {
            let mut buffer = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut buffer);
            image
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|err| {
                    ScanwerkError::EncodeFailed(format!("PNG encoding failed: {}", err))
                })?;
            buffer
        }
        OutputFormat::Heic => {
            return Err(ScanwerkError::EncodeFailed(
                "no HEIC encoder is available".into(),
            ));
        }
    };
    debug!(bytes = bytes.len(), ?format, "Image encoded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 4) as u8, (y * 5) as u8, 128])
        }))
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ScanwerkError::DecodeFailed(_)));
    }

    #[test]
    fn jpeg_output_decodes_back() {
        let bytes = encode(&sample(), OutputFormat::Jpeg, 0.9).expect("encode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let back = decode(&bytes).expect("decode");
        assert_eq!((back.width(), back.height()), (64, 48));
    }

    #[test]
    fn lower_quality_is_smaller() {
        let high = encode(&sample(), OutputFormat::Jpeg, 1.0).expect("encode");
        let low = encode(&sample(), OutputFormat::Jpeg, 0.1).expect("encode");
        assert!(low.len() < high.len());
    }

    #[test]
    fn png_is_lossless() {
        let bytes = encode(&sample(), OutputFormat::Png, 0.5).expect("encode");
        let back = decode(&bytes).expect("decode").to_rgb8();
        assert_eq!(back, sample().to_rgb8());
    }

    #[test]
    fn heic_is_not_encodable() {
        assert!(matches!(
            encode(&sample(), OutputFormat::Heic, 0.9),
            Err(ScanwerkError::EncodeFailed(_))
        ));
    }

    #[test]
    fn quality_mapping() {
        assert_eq!(jpeg_quality_percent(0.9), 90);
        assert_eq!(jpeg_quality_percent(0.95), 95);
        assert_eq!(jpeg_quality_percent(3.0), 100);
        assert_eq!(jpeg_quality_percent(f32::NAN), 90);
    }
}
