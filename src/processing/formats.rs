//! Format mapping and in-memory encoding

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};

use crate::config::ImageFormat;
use crate::error::{Result, SweetenerError};

impl ImageFormat {
    /// Map a format sniffed by the `image` crate onto ours
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }
}

/// Encode an image in memory. JPEG output is always flattened to RGB first;
/// WebP keeps an alpha channel when the image has one.
pub fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let quality = quality.clamp(1, 100);

    match format {
        ImageFormat::Jpeg => encode_jpeg(image, quality),
        ImageFormat::WebP => encode_webp(image, quality),
        other => Err(SweetenerError::encode(
            other.extension(),
            "only JPEG and WebP exports are supported",
            None,
        )),
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = super::codec::to_opaque(image);
    let mut buffer = Vec::new();

    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| SweetenerError::encode("jpeg", e.to_string(), None))?;

    Ok(buffer)
}

fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut config = webp::WebPConfig::new()
        .map_err(|_| SweetenerError::encode("webp", "failed to create WebPConfig", None))?;
    config.quality = f32::from(quality);
    config.method = 6;

    let memory = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
            .encode_advanced(&config)
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
            .encode_advanced(&config)
    }
    .map_err(|e| SweetenerError::encode("webp", format!("WebP encode failed: {e:?}"), None))?;

    Ok(memory.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_encode_jpeg_from_rgba() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(32, 16, Rgba([10, 20, 30, 128])));
        let bytes = encode(&rgba, ImageFormat::Jpeg, 100).unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_encode_webp_quality_shrinks_output() {
        let image = gradient(256, 256);
        let high = encode(&image, ImageFormat::WebP, 100).unwrap();
        let low = encode(&image, ImageFormat::WebP, 10).unwrap();

        assert_eq!(image::guess_format(&high).unwrap(), image::ImageFormat::WebP);
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_encode_rejects_other_formats() {
        assert!(matches!(
            encode(&gradient(4, 4), ImageFormat::Png, 90),
            Err(SweetenerError::Encode { .. })
        ));
    }
}
