//! Resize-and-reencode codec for size-limited backends.
//!
//! The long edge is brought down to `MAX_LONG_EDGE` (never up) and the result
//! is written as JPEG. Smaller output is likely but not guaranteed, so the
//! caller still has to chunk it.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use tracing::debug;

use crate::codec::BlobCodec;
use crate::error::{BlobError, Result};
use crate::utils::limits::{JPEG_QUALITY, MAX_LONG_EDGE};

/// Output dimensions for a `width` x `height` source.
///
/// `scale = min(1, MAX_LONG_EDGE / max(w, h))`; each side is truncated and
/// kept at least one pixel.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let long_edge = width.max(height);
    if long_edge <= MAX_LONG_EDGE {
        return (width, height);
    }

    let scale = MAX_LONG_EDGE as f64 / long_edge as f64;
    let scaled = |side: u32| ((side as f64 * scale) as u32).max(1);
    (scaled(width), scaled(height))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReencodeCodec;

impl ReencodeCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_blocking(source: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory(source).map_err(|e| BlobError::Decode(e.to_string()))?;
        let (width, height) = img.dimensions();
        let (new_width, new_height) = target_dimensions(width, height);

        let img = if (new_width, new_height) == (width, height) {
            img
        } else {
            img.resize_exact(new_width, new_height, FilterType::Triangle)
        };

        // JPEG carries no alpha channel
        let rgb = img.to_rgb8();

        let mut out = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            encoder
                .encode_image(&rgb)
                .map_err(|e| BlobError::Encode(e.to_string()))?;
        }

        debug!(
            width,
            height,
            new_width,
            new_height,
            source_bytes = source.len(),
            encoded_bytes = out.len(),
            "image re-encoded"
        );
        Ok(out)
    }
}

#[async_trait]
impl BlobCodec for ReencodeCodec {
    async fn encode(&self, source: &[u8]) -> Result<Vec<u8>> {
        let source = source.to_vec();
        tokio::task::spawn_blocking(move || Self::encode_blocking(&source))
            .await
            .map_err(|e| BlobError::Encode(format!("encoder task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(target_dimensions(4000, 2000), (800, 400));
        assert_eq!(target_dimensions(2000, 4000), (400, 800));
        assert_eq!(target_dimensions(400, 300), (400, 300));
        assert_eq!(target_dimensions(800, 800), (800, 800));
        assert_eq!(target_dimensions(1000, 333), (800, 266));
        assert_eq!(target_dimensions(10_000, 1), (800, 1));
    }

    #[tokio::test]
    async fn test_large_image_is_downscaled() {
        let source = png(gradient(4000, 2000));

        let encoded = ReencodeCodec::new().encode(&source).await.unwrap();

        assert_eq!(image::guess_format(&encoded).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (800, 400));
    }

    #[tokio::test]
    async fn test_small_image_is_not_upscaled() {
        let source = png(gradient(400, 300));

        let encoded = ReencodeCodec::new().encode(&source).await.unwrap();

        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (400, 300));
    }

    #[tokio::test]
    async fn test_alpha_is_flattened() {
        let source = png(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            64,
            48,
            Rgba([255, 0, 0, 128]),
        )));

        let encoded = ReencodeCodec::new().encode(&source).await.unwrap();

        assert_eq!(image::guess_format(&encoded).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_undecodable_source() {
        let err = ReencodeCodec::new()
            .encode(b"definitely not an image")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Decode(_)), "{:?}", err);
    }
}
