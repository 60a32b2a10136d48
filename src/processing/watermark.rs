//! Corner and center watermark compositing

use std::path::Path;
use std::time::Instant;

use image::{imageops, DynamicImage, GenericImageView, RgbImage, RgbaImage};
use tracing::{debug, info};

use crate::config::{ImageFormat, LayerParams, WatermarkSpec};
use crate::error::{Result, SweetenerError};
use crate::parallel::{ParallelProcessor, PassReport};

use super::codec::{self, composite_over, rotate_expand, scale_alpha};
use super::formats::encode;
use super::resize::RESIZE_FILTER;
use super::walker::DirectoryWalker;
use super::{file_size, write_output, FileReport, FileTransform, TransformAction};

/// Watermarked images are always stored as maximum-quality JPEG
const OUTPUT_QUALITY: u8 = 100;

/// Applies a [`WatermarkSpec`] to images. The asset is decoded once when the
/// compositor is built and every layer works on its own resized copy.
#[derive(Debug, Clone)]
pub struct WatermarkCompositor {
    spec: WatermarkSpec,
    asset: RgbaImage,
}

impl WatermarkCompositor {
    /// Decode the watermark asset. Fails with an asset error before any
    /// image is touched.
    pub fn load(spec: WatermarkSpec) -> Result<Self> {
        let asset = codec::open(spec.asset())
            .map_err(|e| match e {
                SweetenerError::Decode { message, file } => SweetenerError::asset(message, file),
                other => SweetenerError::asset(other.to_string(), Some(spec.asset().clone())),
            })?
            .image
            .to_rgba8();

        info!(
            "Loaded watermark {:?} ({}x{})",
            spec.asset(),
            asset.width(),
            asset.height()
        );
        Self::from_asset(spec, asset)
    }

    /// Build from an already decoded asset
    pub fn from_asset(spec: WatermarkSpec, asset: RgbaImage) -> Result<Self> {
        if asset.width() == 0 || asset.height() == 0 {
            return Err(SweetenerError::asset("watermark has no pixels", Some(spec.asset().clone())));
        }

        Ok(Self { spec, asset })
    }

    pub fn spec(&self) -> &WatermarkSpec {
        &self.spec
    }

    /// Size of a layer drawn on a base `base_width` pixels wide: the width is
    /// `scale`% of the base width and the height follows the asset's ratio
    pub fn layer_dimensions(&self, base_width: u32, scale: u32) -> (u32, u32) {
        let (asset_w, asset_h) = (u64::from(self.asset.width()), u64::from(self.asset.height()));
        let scaled = u64::from(base_width) * u64::from(scale);

        let width = (scaled / 100).max(1);
        let height = (scaled * asset_h / (100 * asset_w)).max(1);
        (width as u32, height as u32)
    }

    /// Resized, alpha-scaled copy of the asset for one layer
    fn prepare_layer(&self, base_width: u32, params: LayerParams) -> RgbaImage {
        let (width, height) = self.layer_dimensions(base_width, params.scale);
        let mut layer = if (width, height) == self.asset.dimensions() {
            self.asset.clone()
        } else {
            imageops::resize(&self.asset, width, height, RESIZE_FILTER)
        };
        scale_alpha(&mut layer, params.alpha_factor());
        layer
    }

    /// Composite every enabled layer onto `base` and flatten the result
    pub fn apply_to_image(&self, base: &DynamicImage) -> RgbImage {
        let mut canvas = base.to_rgba8();
        let (base_width, base_height) = canvas.dimensions();

        if self.spec.has_corners() {
            let layer = self.prepare_layer(base_width, self.spec.corner_params());
            for corner in self.spec.corners() {
                let (x, y) = corner.offset(base_width, base_height, layer.width(), layer.height());
                debug!("Corner {} at ({}, {})", corner, x, y);
                composite_over(&mut canvas, &layer, x, y);
            }
        }

        if let Some(center) = self.spec.center() {
            let layer = self.prepare_layer(base_width, center.params);
            let layer = rotate_expand(&layer, center.rotation as f32);
            let x = (i64::from(base_width) - i64::from(layer.width())) / 2;
            let y = (i64::from(base_height) - i64::from(layer.height())) / 2;
            debug!("Center layer {}x{} at ({}, {})", layer.width(), layer.height(), x, y);
            composite_over(&mut canvas, &layer, x, y);
        }

        codec::to_opaque(&DynamicImage::ImageRgba8(canvas))
    }

    /// Watermark every file of `input_dir` into `output_dir`. File names are
    /// kept, the content is JPEG.
    pub fn apply(&self, input_dir: &Path, output_dir: &Path, processor: &ParallelProcessor) -> Result<PassReport> {
        let walker = DirectoryWalker::new(input_dir, output_dir).with_extension(self.output_extension());
        processor.run_pass(self, &walker)
    }
}

impl FileTransform for WatermarkCompositor {
    fn name(&self) -> String {
        "watermarks".to_string()
    }

    fn output_extension(&self) -> Option<&'static str> {
        None
    }

    fn transform_file(&self, input: &Path, output: &Path) -> Result<FileReport> {
        let start_time = Instant::now();
        let input_size = file_size(input)?;
        let decoded = codec::open(input)?;

        let flattened = DynamicImage::ImageRgb8(self.apply_to_image(&decoded.image));
        let bytes = encode(&flattened, ImageFormat::Jpeg, OUTPUT_QUALITY)
            .map_err(|e| match e {
                SweetenerError::Encode { format, message, file: None } => SweetenerError::Encode {
                    format,
                    message,
                    file: Some(input.to_path_buf()),
                },
                other => other,
            })?;
        let output_size = write_output(output, &bytes)?;

        let (width, height) = flattened.dimensions();
        Ok(FileReport {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            action: TransformAction::Watermarked,
            width,
            height,
            format: ImageFormat::Jpeg,
            quality: Some(OUTPUT_QUALITY),
            input_size,
            output_size,
            processing_time: start_time.elapsed(),
        })
    }
}
