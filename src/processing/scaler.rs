//! Per-platform export: fit, letterbox, encode, and size-budget search

use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::config::{AspectRatio, Bound, ImageFormat, Platform, PlatformRule, QualityPolicy, SmallImagePolicy};
use crate::error::{ErrorContext, Result, SweetenerError};
use crate::parallel::{ParallelProcessor, PassReport};

use super::codec::{self, DecodedImage};
use super::formats::encode;
use super::resize::{fit_dimensions, ImageResizer};
use super::walker::DirectoryWalker;
use super::{file_size, write_output, FileReport, FileTransform, TransformAction};

/// Bytes produced by the quality search and the quality that produced them
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub quality: u8,
}

/// Encode following a quality policy.
///
/// Adaptive policies try each candidate from highest to lowest and keep the
/// first result within the byte budget. When none fits, the lowest quality
/// result is accepted.
pub fn encode_with_policy(image: &DynamicImage, format: ImageFormat, policy: QualityPolicy) -> Result<EncodedImage> {
    let budget = policy.budget_bytes();
    let mut last = None;

    for quality in policy.candidates() {
        let bytes = encode(image, format, quality)?;
        let size = bytes.len() as u64;

        match budget {
            None => return Ok(EncodedImage { bytes, quality }),
            Some(limit) if size <= limit => {
                debug!("Quality {} fits budget: {} <= {} bytes", quality, size, limit);
                return Ok(EncodedImage { bytes, quality });
            }
            Some(limit) => {
                debug!("Quality {} over budget: {} > {} bytes", quality, size, limit);
                last = Some(EncodedImage { bytes, quality });
            }
        }
    }

    // candidates() is never empty, so a result always exists here
    last.ok_or_else(|| SweetenerError::encode(format.extension(), "no quality candidates", None))
}

/// An image exported in memory, ready to be written
#[derive(Debug, Clone)]
pub struct Exported {
    pub encoded: EncodedImage,
    pub dimensions: (u32, u32),
    pub action: TransformAction,
}

/// Applies one platform's export rule to individual files
#[derive(Debug, Clone)]
pub struct PlatformScaler {
    platform: Platform,
    rule: PlatformRule,
    resizer: ImageResizer,
}

impl PlatformScaler {
    pub fn new(platform: Platform, instagram_ratio: AspectRatio) -> Self {
        Self {
            platform,
            rule: PlatformRule::for_platform(platform, instagram_ratio),
            resizer: ImageResizer::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn rule(&self) -> &PlatformRule {
        &self.rule
    }

    /// Export every file of `input_dir` into `<target_dir>/<platform>/`
    pub fn run(&self, input_dir: &Path, target_dir: &Path, processor: &ParallelProcessor) -> Result<PassReport> {
        let walker = DirectoryWalker::new(input_dir, target_dir.join(self.platform.dir_name()))
            .with_extension(self.output_extension());
        processor.run_pass(self, &walker)
    }

    /// Produce the exported image in memory.
    ///
    /// Returns `None` when the source can be copied byte for byte.
    pub fn export(&self, decoded: &DecodedImage) -> Result<Option<Exported>> {
        let (width, height) = decoded.image.dimensions();

        let (max_width, max_height) = match self.rule.bound {
            Bound::Square(max) => (max, max),
            Bound::Box { width, height } => (width, height),
            Bound::Aspect { ratio, max_edge } => {
                let padded = DynamicImage::ImageRgb8(self.resizer.letterbox(&decoded.image, ratio, max_edge));
                let encoded = encode_with_policy(&padded, self.rule.format, self.rule.quality)?;
                return Ok(Some(Exported {
                    encoded,
                    dimensions: padded.dimensions(),
                    action: TransformAction::Padded,
                }));
            }
        };

        let fits = fit_dimensions(width, height, max_width, max_height) == (width, height);

        if fits {
            let action = match self.rule.small_images {
                SmallImagePolicy::CopyOrConvert if decoded.format == Some(self.rule.format) => return Ok(None),
                SmallImagePolicy::CopyOrConvert => TransformAction::Converted,
                SmallImagePolicy::ReEncode => TransformAction::ReEncoded,
            };
            let encoded = encode_with_policy(&decoded.image, self.rule.format, self.rule.quality)?;
            return Ok(Some(Exported {
                encoded,
                dimensions: (width, height),
                action,
            }));
        }

        let resized = self.resizer.resize_to_fit(&decoded.image, max_width, max_height);
        let encoded = encode_with_policy(&resized, self.rule.format, self.rule.quality)?;
        Ok(Some(Exported {
            encoded,
            dimensions: resized.dimensions(),
            action: TransformAction::Resized,
        }))
    }
}

impl FileTransform for PlatformScaler {
    fn name(&self) -> String {
        self.platform.dir_name().to_string()
    }

    fn output_extension(&self) -> Option<&'static str> {
        Some(self.rule.output_extension())
    }

    fn transform_file(&self, input: &Path, output: &Path) -> Result<FileReport> {
        let start_time = Instant::now();
        let input_size = file_size(input)?;
        let decoded = codec::open(input)?;

        let report = |action, (width, height), format, quality, output_size| FileReport {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            action,
            width,
            height,
            format,
            quality,
            input_size,
            output_size,
            processing_time: start_time.elapsed(),
        };

        let exported = self
            .export(&decoded)
            .with_file_context(input.to_path_buf())?;

        match exported {
            None => {
                let output_size = std::fs::copy(input, output).with_file_context(output.to_path_buf())?;
                debug!("{}: copied {:?} unchanged", self.platform, input);
                Ok(report(
                    TransformAction::Copied,
                    decoded.image.dimensions(),
                    self.rule.format,
                    None,
                    output_size,
                ))
            }
            Some(Exported { encoded, dimensions, action }) => {
                if let Some(limit) = self.rule.quality.budget_bytes() {
                    if encoded.bytes.len() as u64 > limit {
                        warn!(
                            "{}: {:?} is {} bytes at the lowest quality, over the {} byte budget",
                            self.platform,
                            input,
                            encoded.bytes.len(),
                            limit
                        );
                    }
                }

                let output_size = write_output(output, &encoded.bytes)?;
                debug!(
                    "{}: {:?} -> {:?} {}x{} quality {} ({:?})",
                    self.platform, input, output, dimensions.0, dimensions.1, encoded.quality, action
                );
                Ok(report(action, dimensions, self.rule.format, Some(encoded.quality), output_size))
            }
        }
    }
}
