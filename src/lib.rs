//! Image Sweetener - batch watermarking and social-media exports
//!
//! Takes a directory of images, optionally stamps a watermark on every one
//! of them, and derives a set of per-platform variants (Facebook, Instagram,
//! Twitter, TikTok, Threads, Bluesky), each sized, letterboxed and encoded
//! the way that platform wants it.
//!
//! # Layout of a run
//!
//! ```text
//! <target_dir>/
//!   watermarks/      only when a watermark is configured
//!   facebook/*.jpg   twitter/*.jpg   threads/*.jpg   instagram/*.jpg
//!   tiktok/*.webp    bluesky/*.webp
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use image_sweetener::{CornerPosition, Pipeline, PipelineRequest, Platform, ProcessingConfig, WatermarkSpec};
//!
//! let watermark = WatermarkSpec::new("logo.png", [CornerPosition::BottomRight], 30, 80)?;
//! let platforms: BTreeSet<_> = [Platform::Instagram, Platform::Bluesky].into_iter().collect();
//! let request = PipelineRequest::new("/photos/batch", Some(watermark), platforms, "4:5")?;
//!
//! let pipeline = Pipeline::from_config(&ProcessingConfig::default())?;
//! let report = pipeline.run(&request)?;
//! println!("{} files written", report.total_successful());
//! # Ok::<(), image_sweetener::SweetenerError>(())
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod parallel;
pub mod pipeline;
pub mod processing;

// Re-export commonly used types
pub use config::{
    AspectRatio, Config, CornerPosition, ErrorPolicy, ImageFormat, Platform, PlatformRule, ProcessingConfig,
    WatermarkSpec,
};
pub use error::{Result, SweetenerError};
pub use parallel::{ParallelProcessor, PassReport, ProgressUpdate};
pub use pipeline::{Pipeline, PipelineReport, PipelineRequest};
pub use processing::{FileReport, PlatformScaler, TransformAction, WatermarkCompositor};

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging from `RUST_LOG`
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init() -> Result<()> {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish(),
    )
    .is_ok()
    {
        info!("Image Sweetener v{} initialized", VERSION);
    }

    Ok(())
}

/// Initialize logging from the `[logging]` section of a configuration
pub fn init_with_config(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .map_err(|e| SweetenerError::config(format!("Invalid log level '{}': {}", config.logging.level, e)))?;

    let installed = if config.logging.json_format {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    if installed {
        info!("Image Sweetener v{} initialized with custom config", VERSION);
    }

    Ok(())
}
