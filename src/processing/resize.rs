//! Image resizing algorithms and utilities

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::debug;

use crate::config::AspectRatio;

/// Every resize uses Lanczos3
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Largest size with the source's aspect ratio that fits in
/// `max_width`x`max_height`. The constraining axis lands exactly on its
/// bound and the other axis is truncated. Images that already fit keep
/// their size.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let (max_w, max_h) = (u64::from(max_width), u64::from(max_height));

    // Compare w/h against max_w/max_h without floats
    if w * max_h >= h * max_w {
        let new_height = (h * max_w / w).max(1);
        (max_width, new_height as u32)
    } else {
        let new_width = (w * max_h / h).max(1);
        (new_width as u32, max_height)
    }
}

/// Canvas dimensions scaled down so that neither side exceeds `max_edge`,
/// keeping the ratio. Derived sides are truncated.
pub fn cap_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    let (w, h, edge) = (u64::from(width), u64::from(height), u64::from(max_edge));
    if w >= h {
        (max_edge, (h * edge / w).max(1) as u32)
    } else {
        ((w * edge / h).max(1) as u32, max_edge)
    }
}

/// Aspect-preserving resizes and letterboxing with [`RESIZE_FILTER`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageResizer;

impl ImageResizer {
    pub fn new() -> Self {
        Self
    }

    /// Aspect-preserving downscale into the bound; never upscales
    pub fn resize_to_fit(&self, image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = fit_dimensions(width, height, max_width, max_height);

        if (target_width, target_height) == (width, height) {
            return image.clone();
        }

        debug!(
            "Resizing {}x{} -> {}x{}",
            width, height, target_width, target_height
        );
        self.resize_exact(image, target_width, target_height)
    }

    /// Resize to exactly the given size, ignoring aspect ratio
    pub fn resize_exact(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        image.resize_exact(width.max(1), height.max(1), RESIZE_FILTER)
    }

    /// Letterbox onto a black canvas of exactly `ratio`, then cap the long
    /// edge at `max_edge`.
    ///
    /// The canvas long side equals the source's longer side. The source is
    /// shrunk to at most the canvas size per axis (never enlarged) and
    /// centered.
    pub fn letterbox(&self, image: &DynamicImage, ratio: AspectRatio, max_edge: u32) -> RgbImage {
        let (width, height) = image.dimensions();
        let (canvas_width, canvas_height) = ratio.canvas_for(width, height);

        let fitted = self.resize_exact(image, width.min(canvas_width), height.min(canvas_height));
        let fitted = super::codec::to_opaque(&fitted);

        let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, Rgb([0, 0, 0]));
        let x = (canvas_width - fitted.width()) / 2;
        let y = (canvas_height - fitted.height()) / 2;
        image::imageops::replace(&mut canvas, &fitted, i64::from(x), i64::from(y));

        debug!(
            "Letterboxed {}x{} onto {}x{} canvas ({})",
            width, height, canvas_width, canvas_height, ratio
        );

        let (final_width, final_height) = cap_dimensions(canvas_width, canvas_height, max_edge);
        if (final_width, final_height) == (canvas_width, canvas_height) {
            return canvas;
        }

        image::imageops::resize(&canvas, final_width, final_height, RESIZE_FILTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 255) as u8;
            Rgb([intensity, intensity, intensity])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_fit_dimensions() {
        // Square bound on a landscape source: width constrains, height truncated
        assert_eq!(fit_dimensions(3000, 2000, 2048, 2048), (2048, 1365));
        assert_eq!(fit_dimensions(2000, 3000, 2048, 2048), (1365, 2048));
        assert_eq!(fit_dimensions(4000, 4000, 2000, 2000), (2000, 2000));
        // Box bound
        assert_eq!(fit_dimensions(3000, 3000, 1080, 1920), (1080, 1080));
        assert_eq!(fit_dimensions(1080, 4000, 1080, 1920), (518, 1920));
    }

    #[test]
    fn test_fit_dimensions_never_upscales() {
        assert_eq!(fit_dimensions(100, 50, 2048, 2048), (100, 50));
        assert_eq!(fit_dimensions(2048, 2048, 2048, 2048), (2048, 2048));
    }

    #[test]
    fn test_fit_dimensions_extreme_ratio() {
        assert_eq!(fit_dimensions(10000, 1, 100, 100), (100, 1));
    }

    #[test]
    fn test_cap_dimensions() {
        assert_eq!(cap_dimensions(1600, 2000, 1440), (1152, 1440));
        assert_eq!(cap_dimensions(1000, 1250, 1440), (1000, 1250));
        assert_eq!(cap_dimensions(3000, 1000, 1440), (1440, 480));
    }

    #[test]
    fn test_resize_to_fit_square_bound() {
        let resizer = ImageResizer::new();
        let image = create_test_image(600, 600);

        let resized = resizer.resize_to_fit(&image, 256, 256);
        assert_eq!(resized.dimensions(), (256, 256));

        let untouched = resizer.resize_to_fit(&image, 1024, 1024);
        assert_eq!(untouched.dimensions(), (600, 600));
    }

    #[test]
    fn test_letterbox_portrait() {
        let resizer = ImageResizer::new();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 1000, Rgb([255, 255, 255])));
        let ratio = AspectRatio::parse("4:5").unwrap();

        // Canvas 800x1000, source kept at 500x1000 and centered
        let boxed = resizer.letterbox(&image, ratio, 1440);
        assert_eq!(boxed.dimensions(), (800, 1000));
        assert_eq!(boxed.get_pixel(0, 500), &Rgb([0, 0, 0]));
        assert_eq!(boxed.get_pixel(799, 500), &Rgb([0, 0, 0]));
        assert_eq!(boxed.get_pixel(400, 500), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_letterbox_caps_long_edge() {
        let resizer = ImageResizer::new();
        let image = create_test_image(1000, 2000);
        let ratio = AspectRatio::parse("4:5").unwrap();

        // Canvas 1600x2000 capped to 1152x1440
        let boxed = resizer.letterbox(&image, ratio, 1440);
        assert_eq!(boxed.dimensions(), (1152, 1440));
    }
}
