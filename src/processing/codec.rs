//! Decoding and pixel operations shared by the watermark and export passes

use std::path::Path;

use image::imageops;
use image::io::Reader as ImageReader;
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

use crate::config::ImageFormat;
use crate::error::{Result, SweetenerError};

/// A decoded raster plus the container format its bytes were sniffed as
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }
}

/// Open and decode an image. The format is guessed from the content, so a
/// JPEG saved under a `.png` name still decodes.
pub fn open(path: &Path) -> Result<DecodedImage> {
    let decode_error = |e: &dyn std::fmt::Display| SweetenerError::decode(e.to_string(), Some(path.to_path_buf()));

    let reader = ImageReader::open(path)
        .map_err(|e| decode_error(&e))?
        .with_guessed_format()
        .map_err(|e| decode_error(&e))?;

    let format = reader.format().and_then(ImageFormat::from_image_format);
    let image = reader.decode().map_err(|e| decode_error(&e))?;

    debug!(
        "Decoded {:?}: {}x{} {:?} ({:?})",
        path,
        image.width(),
        image.height(),
        image.color(),
        format
    );

    Ok(DecodedImage { image, format })
}

/// Drop any alpha channel, giving a 3-channel opaque image
pub fn to_opaque(image: &DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    }
}

/// Multiply every pixel's alpha by `factor` (clamped to 0..=1).
/// A factor of 1.0 leaves the image untouched, 0.0 makes it fully transparent.
pub fn scale_alpha(image: &mut RgbaImage, factor: f32) {
    let factor = factor.clamp(0.0, 1.0);
    if factor >= 1.0 {
        return;
    }

    for pixel in image.pixels_mut() {
        pixel[3] = (f32::from(pixel[3]) * factor) as u8;
    }
}

/// Canvas size that fully contains a `width`x`height` image rotated by
/// `degrees`
pub fn rotated_bounds(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let (w, h) = (f64::from(width), f64::from(height));
    let (sin, cos) = (f64::from(sin), f64::from(cos));

    // Snap values within float noise of an integer before rounding up
    let snap = |v: f64| {
        let rounded = v.round();
        if (v - rounded).abs() < 1e-4 { rounded } else { v.ceil() }
    };

    let new_w = snap(w * cos + h * sin).max(1.0) as u32;
    let new_h = snap(w * sin + h * cos).max(1.0) as u32;
    (new_w, new_h)
}

/// Rotate counter-clockwise about the center with bicubic sampling. The
/// canvas grows to contain the whole rotated image and the newly exposed
/// area is fully transparent.
pub fn rotate_expand(image: &RgbaImage, degrees: f32) -> RgbaImage {
    if degrees.rem_euclid(360.0) == 0.0 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let (out_w, out_h) = rotated_bounds(width, height, degrees);
    let canvas_w = out_w.max(width);
    let canvas_h = out_h.max(height);

    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
    imageops::replace(
        &mut canvas,
        image,
        i64::from((canvas_w - width) / 2),
        i64::from((canvas_h - height) / 2),
    );

    // imageproc rotates clockwise for positive angles
    let rotated = rotate_about_center(
        &canvas,
        -degrees.to_radians(),
        Interpolation::Bicubic,
        Rgba([0, 0, 0, 0]),
    );

    imageops::crop_imm(
        &rotated,
        (canvas_w - out_w) / 2,
        (canvas_h - out_h) / 2,
        out_w,
        out_h,
    )
    .to_image()
}

/// Alpha-blend `overlay` onto `base` with its top-left corner at (x, y).
/// Parts of the overlay outside the base are clipped and the base alpha is
/// combined with the overlay's rather than replaced.
pub fn composite_over(base: &mut RgbaImage, overlay: &RgbaImage, x: i64, y: i64) {
    imageops::overlay(base, overlay, x, y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, pixel: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, pixel)
    }

    #[test]
    fn test_open_sniffs_content_not_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mislabelled.png");
        let rgb: RgbImage = ImageBuffer::from_pixel(20, 10, Rgb([200, 10, 10]));
        rgb.save_with_format(&path, image::ImageFormat::Jpeg).unwrap();

        let decoded = open(&path).unwrap();
        assert_eq!(decoded.format, Some(ImageFormat::Jpeg));
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
        assert!(!decoded.has_alpha());
    }

    #[test]
    fn test_open_rejects_non_images() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = open(&path).unwrap_err();
        assert!(matches!(err, SweetenerError::Decode { .. }));
        assert_eq!(err.file_path(), Some(&path));
    }

    #[test]
    fn test_scale_alpha_identity_and_zero() {
        let original = solid(4, 4, Rgba([1, 2, 3, 200]));

        let mut unchanged = original.clone();
        scale_alpha(&mut unchanged, 1.0);
        assert_eq!(unchanged, original);

        let mut cleared = original.clone();
        scale_alpha(&mut cleared, 0.0);
        assert!(cleared.pixels().all(|p| p[3] == 0));
        assert!(cleared.pixels().all(|p| p[0] == 1 && p[1] == 2 && p[2] == 3));
    }

    #[test]
    fn test_scale_alpha_is_linear() {
        let mut image = solid(2, 2, Rgba([0, 0, 0, 255]));
        scale_alpha(&mut image, 0.5);
        assert!(image.pixels().all(|p| p[3] == 127));

        let mut image = solid(2, 2, Rgba([0, 0, 0, 200]));
        scale_alpha(&mut image, 0.25);
        assert!(image.pixels().all(|p| p[3] == 50));
    }

    #[test]
    fn test_rotated_bounds() {
        assert_eq!(rotated_bounds(100, 50, 0.0), (100, 50));
        assert_eq!(rotated_bounds(100, 50, 90.0), (50, 100));
        assert_eq!(rotated_bounds(100, 50, 180.0), (100, 50));
        // 45 degrees: (100 + 50) * sqrt(2)/2 = 106.07 -> 107
        assert_eq!(rotated_bounds(100, 50, 45.0), (107, 107));
    }

    #[test]
    fn test_rotate_expand_grows_canvas_with_transparent_corners() {
        let image = solid(100, 50, Rgba([255, 0, 0, 255]));
        let rotated = rotate_expand(&image, 45.0);

        assert_eq!(rotated.dimensions(), (107, 107));
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
        assert_eq!(rotated.get_pixel(106, 106)[3], 0);
        let center = rotated.get_pixel(53, 53);
        assert!(center[3] >= 250, "got {:?}", center);
        assert!(center[0] >= 250, "got {:?}", center);
    }

    #[test]
    fn test_rotate_expand_quarter_turn_swaps_dimensions() {
        let image = solid(60, 20, Rgba([0, 0, 255, 255]));
        let rotated = rotate_expand(&image, 90.0);
        assert_eq!(rotated.dimensions(), (20, 60));

        assert_eq!(rotate_expand(&image, 0.0), image);
    }

    #[test]
    fn test_composite_over_blends_and_clips() {
        let mut base = solid(10, 10, Rgba([0, 0, 0, 255]));
        let overlay = solid(4, 4, Rgba([255, 255, 255, 255]));

        composite_over(&mut base, &overlay, 8, 8);
        assert_eq!(base.get_pixel(9, 9), &Rgba([255, 255, 255, 255]));
        assert_eq!(base.get_pixel(7, 7), &Rgba([0, 0, 0, 255]));

        composite_over(&mut base, &overlay, -3, -3);
        assert_eq!(base.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(base.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));

        let transparent = solid(4, 4, Rgba([255, 255, 255, 0]));
        composite_over(&mut base, &transparent, 4, 4);
        assert_eq!(base.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_composite_over_keeps_base_alpha() {
        let mut base = solid(4, 4, Rgba([0, 0, 0, 255]));
        let half = solid(4, 4, Rgba([255, 255, 255, 128]));

        composite_over(&mut base, &half, 0, 0);
        let pixel = base.get_pixel(1, 1);
        assert_eq!(pixel[3], 255);
        assert!(pixel[0] > 100 && pixel[0] < 160);
    }

    #[test]
    fn test_rotate_expand_turns_counter_clockwise() {
        // Red left half, green right half
        let image = RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        });

        let rotated = rotate_expand(&image, 90.0);
        assert_eq!(rotated.dimensions(), (20, 40));

        let top = rotated.get_pixel(10, 5);
        let bottom = rotated.get_pixel(10, 34);
        assert!(top[1] > 200 && top[0] < 50, "top {:?}", top);
        assert!(bottom[0] > 200 && bottom[1] < 50, "bottom {:?}", bottom);
    }

    #[test]
    fn test_to_opaque_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(solid(3, 3, Rgba([9, 8, 7, 10])));
        let rgb = to_opaque(&rgba);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([9, 8, 7]));
    }
}
