//! Local image processing built on the `image` crate.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;

use crate::core::{AppError, AppResult};

const JPEG_QUALITY: u8 = 90;
const COMPRESS_MAX_WIDTH: u32 = 1920;

/// Target format for a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Png,
    Jpeg,
    WebP,
}

impl TargetFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    fn as_image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

/// Result of a compression pass.
#[derive(Debug, Serialize)]
pub struct CompressedImage {
    #[serde(skip)]
    pub buffer: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
    /// Percentage saved relative to the original, may be negative.
    pub saved_percent: f64,
}

/// Basic image metadata.
#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: usize,
}

fn decode(bytes: &[u8]) -> AppResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(AppError::from)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> AppResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        // JPEG has no alpha channel, flatten before encoding.
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)?;
        }
        _ => img.write_to(&mut out, format)?,
    }
    Ok(out.into_inner())
}

/// Re-encodes an image into `target` format.
pub fn convert(bytes: &[u8], target: TargetFormat) -> AppResult<Vec<u8>> {
    let img = decode(bytes)?;
    encode(&img, target.as_image_format())
}

/// Compresses an image: caps the width and re-encodes as quality-90 JPEG.
pub fn compress(bytes: &[u8]) -> AppResult<CompressedImage> {
    let img = decode(bytes)?;

    let img = if img.width() > COMPRESS_MAX_WIDTH {
        img.resize(
            COMPRESS_MAX_WIDTH,
            u32::MAX,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    let buffer = encode(&img, ImageFormat::Jpeg)?;
    let original_size = bytes.len();
    let compressed_size = buffer.len();
    let saved_percent = if original_size == 0 {
        0.0
    } else {
        (1.0 - compressed_size as f64 / original_size as f64) * 100.0
    };

    Ok(CompressedImage { buffer, original_size, compressed_size, saved_percent })
}

/// Resizes an image to exactly `width` x `height`, keeping the source format
/// where possible (falls back to PNG).
pub fn resize(bytes: &[u8], width: u32, height: u32) -> AppResult<Vec<u8>> {
    if width == 0 || height == 0 || width > 10_000 || height > 10_000 {
        return Err(AppError::Validation(format!(
            "Unsupported target size {width}x{height}"
        )));
    }

    let format = image::guess_format(bytes).unwrap_or(ImageFormat::Png);
    let img = decode(bytes)?;
    let resized = img.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
    encode(&resized, format)
}

/// Reads dimensions and format without re-encoding.
pub fn info(bytes: &[u8]) -> AppResult<ImageInfo> {
    let format = image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("unknown")
        .to_string();
    let img = decode(bytes)?;

    Ok(ImageInfo {
        width: img.width(),
        height: img.height(),
        format,
        size_bytes: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        encode(&img, ImageFormat::Png).unwrap()
    }

    #[test]
    fn parses_target_formats() {
        assert_eq!(TargetFormat::parse("PNG"), Some(TargetFormat::Png));
        assert_eq!(TargetFormat::parse("jpg"), Some(TargetFormat::Jpeg));
        assert_eq!(TargetFormat::parse(" webp "), Some(TargetFormat::WebP));
        assert_eq!(TargetFormat::parse("gif"), None);
    }

    #[test]
    fn converts_png_to_jpeg() {
        let png = sample_png(8, 8);
        let jpeg = convert(&png, TargetFormat::Jpeg).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn resize_produces_exact_dimensions() {
        let png = sample_png(16, 8);
        let resized = resize(&png, 4, 4).unwrap();
        let img = image::load_from_memory(&resized).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn resize_rejects_zero_dimensions() {
        let png = sample_png(4, 4);
        assert!(resize(&png, 0, 10).is_err());
    }

    #[test]
    fn compress_caps_width() {
        let png = sample_png(COMPRESS_MAX_WIDTH + 100, 64);
        let out = compress(&png).unwrap();
        let img = image::load_from_memory(&out.buffer).unwrap();
        assert_eq!(img.width(), COMPRESS_MAX_WIDTH);
    }

    #[test]
    fn info_reports_dimensions_and_format() {
        let png = sample_png(10, 6);
        let meta = info(&png).unwrap();
        assert_eq!((meta.width, meta.height), (10, 6));
        assert_eq!(meta.format, "png");
        assert_eq!(meta.size_bytes, png.len());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(info(b"definitely not an image").is_err());
    }
}
