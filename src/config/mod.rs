//! Configuration management for Image Sweetener

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweetenerError};
use crate::pipeline::PipelineRequest;

pub mod platforms;
pub mod watermark;

pub use platforms::*;
pub use watermark::*;

/// Main configuration structure, persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the source images
    pub target_dir: Option<PathBuf>,

    /// Instagram target ratio in `W:H` form
    pub instagram_aspect_ratio: String,

    /// Watermark settings
    pub watermark: WatermarkConfig,

    /// Which platform exports to produce
    pub platforms: PlatformToggles,

    /// Worker pool settings
    pub processing: ProcessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_dir: None,
            instagram_aspect_ratio: "4:5".to_string(),
            watermark: WatermarkConfig::default(),
            platforms: PlatformToggles::default(),
            processing: ProcessingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Watermark settings as stored on disk (unvalidated slider values)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Watermark asset; `None` skips watermarking entirely
    pub path: Option<PathBuf>,
    pub corner_positions: Vec<CornerPosition>,
    pub corner_scale: u32,
    pub corner_transparency: u32,
    pub center_enabled: bool,
    pub center_scale: u32,
    pub center_transparency: u32,
    pub center_rotation: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            path: None,
            corner_positions: Vec::new(),
            corner_scale: 70,
            corner_transparency: 100,
            center_enabled: false,
            center_scale: 70,
            center_transparency: 100,
            center_rotation: 0,
        }
    }
}

impl WatermarkConfig {
    /// Validate the sliders and build a spec, or `None` when no asset is set
    pub fn to_spec(&self) -> Result<Option<WatermarkSpec>> {
        let Some(path) = self.path.as_ref().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(None);
        };

        let mut spec = WatermarkSpec::new(
            path.clone(),
            self.corner_positions.iter().copied(),
            self.corner_scale,
            self.corner_transparency,
        )?;

        if self.center_enabled {
            spec = spec.with_center(self.center_scale, self.center_transparency, self.center_rotation)?;
        }

        Ok(Some(spec))
    }
}

/// One switch per platform
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformToggles {
    pub facebook: bool,
    pub instagram: bool,
    pub twitter: bool,
    pub tiktok: bool,
    pub threads: bool,
    pub bluesky: bool,
}

impl PlatformToggles {
    pub fn is_enabled(&self, platform: Platform) -> bool {
        match platform {
            Platform::Facebook => self.facebook,
            Platform::Instagram => self.instagram,
            Platform::Twitter => self.twitter,
            Platform::TikTok => self.tiktok,
            Platform::Threads => self.threads,
            Platform::Bluesky => self.bluesky,
        }
    }

    pub fn set(&mut self, platform: Platform, enabled: bool) {
        let slot = match platform {
            Platform::Facebook => &mut self.facebook,
            Platform::Instagram => &mut self.instagram,
            Platform::Twitter => &mut self.twitter,
            Platform::TikTok => &mut self.tiktok,
            Platform::Threads => &mut self.threads,
            Platform::Bluesky => &mut self.bluesky,
        };
        *slot = enabled;
    }

    pub fn enabled(&self) -> BTreeSet<Platform> {
        Platform::ALL.into_iter().filter(|p| self.is_enabled(*p)).collect()
    }
}

/// What a pass does when one file fails
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the pass at the first failing file
    #[default]
    FailFast,
    /// Log the failure and continue with the remaining files
    Skip,
}

/// Worker pool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of worker threads (None = auto-detect)
    pub threads: Option<usize>,

    /// Per-file failure handling
    pub error_policy: ErrorPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Output image formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Tiff,
    Bmp,
}

impl ImageFormat {
    /// Get file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
        }
    }
}

/// On-disk encodings understood by `Config::from_file` / `to_file`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(SweetenerError::config(
                "Unsupported config file format. Use .toml, .yaml or .json",
            )),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let format = ConfigFormat::from_path(path.as_ref())?;
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SweetenerError::config(format!("Failed to read config file {:?}: {}", path.as_ref(), e))
        })?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(Into::into),
            ConfigFormat::Yaml => serde_yaml::from_str(&content).map_err(Into::into),
            ConfigFormat::Json => serde_json::from_str(&content).map_err(Into::into),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match ConfigFormat::from_path(path.as_ref())? {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| SweetenerError::config(format!("TOML serialization failed: {}", e)))?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| SweetenerError::config(format!("YAML serialization failed: {}", e)))?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| SweetenerError::config(format!("JSON serialization failed: {}", e)))?,
        };

        std::fs::write(&path, content).map_err(|e| {
            SweetenerError::config(format!("Failed to write config file {:?}: {}", path.as_ref(), e))
        })?;

        Ok(())
    }

    /// Platforms switched on, in pass order
    pub fn enabled_platforms(&self) -> BTreeSet<Platform> {
        self.platforms.enabled()
    }

    /// Validate configuration without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        self.watermark.to_spec()?;

        AspectRatio::parse(&self.instagram_aspect_ratio)?;

        if let Some(threads) = self.processing.threads {
            if threads == 0 {
                return Err(SweetenerError::config("Thread count must be greater than 0"));
            }
        }

        Ok(())
    }

    /// Turn the stored settings into a validated pipeline request
    pub fn to_request(&self) -> Result<PipelineRequest> {
        let target_dir = self
            .target_dir
            .clone()
            .ok_or_else(|| SweetenerError::config("No target directory configured"))?;

        PipelineRequest::new(
            target_dir,
            self.watermark.to_spec()?,
            self.enabled_platforms(),
            &self.instagram_aspect_ratio,
        )
    }
}
