//! Core image processing functionality

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::ImageFormat;
use crate::error::{ErrorContext, Result};

pub mod codec;
pub mod formats;
pub mod resize;
pub mod scaler;
pub mod walker;
pub mod watermark;

pub use codec::{composite_over, open, rotate_expand, scale_alpha, to_opaque, DecodedImage};
pub use formats::*;
pub use resize::*;
pub use scaler::PlatformScaler;
pub use walker::{DirectoryWalker, FileJob};
pub use watermark::WatermarkCompositor;

/// A per-file transform run by one pass of the pipeline
pub trait FileTransform: Sync {
    /// Pass name used in logs, progress events and reports
    fn name(&self) -> String;

    /// Extension forced onto every output file, if any
    fn output_extension(&self) -> Option<&'static str>;

    /// Transform one input file into `output`
    fn transform_file(&self, input: &Path, output: &Path) -> Result<FileReport>;
}

/// What a transform did to produce its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformAction {
    /// Downscaled to fit the platform bound
    Resized,
    /// Already within bounds but re-encoded into the platform format
    Converted,
    /// Already within bounds and already in the platform format; bytes copied
    Copied,
    /// Decoded and re-encoded at its original size
    ReEncoded,
    /// Letterboxed onto an aspect-ratio canvas
    Padded,
    /// Watermark layers composited
    Watermarked,
}

/// Result of transforming one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub action: TransformAction,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Encoder quality, `None` for byte copies
    pub quality: Option<u8>,
    pub input_size: u64,
    pub output_size: u64,
    pub processing_time: Duration,
}

/// Write encoded bytes to `path`, returning the number of bytes written
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<u64> {
    std::fs::write(path, bytes).with_file_context(path.to_path_buf())?;
    debug!("Wrote {:?} ({:.2}KB)", path, bytes.len() as f64 / 1024.0);
    Ok(bytes.len() as u64)
}

/// Size of a file on disk
pub fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path).with_file_context(path.to_path_buf())?.len())
}
