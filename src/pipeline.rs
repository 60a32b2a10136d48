//! Watermark pass followed by concurrent platform passes

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{AspectRatio, Platform, ProcessingConfig, WatermarkSpec};
use crate::error::{Result, SweetenerError};
use crate::parallel::{ParallelProcessor, PassReport, ProgressUpdate};
use crate::processing::{DirectoryWalker, FileTransform, PlatformScaler, WatermarkCompositor};

/// Subdirectory holding watermarked intermediates
pub const WATERMARK_DIR: &str = "watermarks";

/// Everything one run needs, validated before any file is touched
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub target_dir: PathBuf,
    /// `None` skips watermarking; platforms then read the target directory
    pub watermark: Option<WatermarkSpec>,
    pub platforms: BTreeSet<Platform>,
    pub instagram_ratio: AspectRatio,
}

impl PipelineRequest {
    pub fn new(
        target_dir: impl Into<PathBuf>,
        watermark: Option<WatermarkSpec>,
        platforms: BTreeSet<Platform>,
        instagram_ratio: &str,
    ) -> Result<Self> {
        Ok(Self {
            target_dir: target_dir.into(),
            watermark,
            platforms,
            instagram_ratio: AspectRatio::parse(instagram_ratio)?,
        })
    }

    /// Directory the platform passes read from
    pub fn intermediate_dir(&self) -> PathBuf {
        match self.watermark {
            Some(_) => self.target_dir.join(WATERMARK_DIR),
            None => self.target_dir.clone(),
        }
    }

    /// Output directory of every pass this request runs, in order
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let watermark = self.watermark.as_ref().map(|_| self.target_dir.join(WATERMARK_DIR));
        watermark
            .into_iter()
            .chain(self.platforms.iter().map(|p| self.target_dir.join(p.dir_name())))
            .collect()
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub target_dir: PathBuf,
    pub intermediate_dir: PathBuf,
    pub watermark: Option<PassReport>,
    pub platforms: Vec<PassReport>,
    pub processing_time: Duration,
}

impl PipelineReport {
    /// Every pass in the order it was started
    pub fn passes(&self) -> impl Iterator<Item = &PassReport> {
        self.watermark.iter().chain(self.platforms.iter())
    }

    pub fn total_successful(&self) -> usize {
        self.passes().map(PassReport::successful).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.passes().map(PassReport::failed).sum()
    }

    pub fn total_output_size(&self) -> u64 {
        self.passes().map(|p| p.total_output_size).sum()
    }
}

/// Runs requests on a shared worker pool
pub struct Pipeline {
    processor: ParallelProcessor,
}

impl Pipeline {
    pub fn new(processor: ParallelProcessor) -> Self {
        Self { processor }
    }

    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        Ok(Self::new(ParallelProcessor::from_config(config)?))
    }

    pub fn processor(&self) -> &ParallelProcessor {
        &self.processor
    }

    /// Subscribe to per-file and per-pass progress events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressUpdate> {
        self.processor.subscribe()
    }

    /// Run the watermark pass (if requested), then every platform pass
    /// concurrently.
    ///
    /// A failing platform pass does not stop the others; once all have
    /// finished the first error in platform order is returned. Files already
    /// written are left in place.
    pub fn run(&self, request: &PipelineRequest) -> Result<PipelineReport> {
        let start_time = Instant::now();
        let target_dir = request.target_dir.as_path();

        if !target_dir.is_dir() {
            return Err(SweetenerError::storage(
                "target directory does not exist or is not a directory",
                target_dir.to_path_buf(),
            ));
        }

        let watermark = match &request.watermark {
            Some(spec) => Some(self.run_watermark(spec, target_dir)?),
            None => None,
        };
        let intermediate_dir = request.intermediate_dir();

        let scalers: Vec<PlatformScaler> = request
            .platforms
            .iter()
            .map(|&platform| PlatformScaler::new(platform, request.instagram_ratio))
            .collect();

        info!(
            "Running {} platform passes from {:?}",
            scalers.len(),
            intermediate_dir
        );

        let results: Vec<Result<PassReport>> = self.processor.install(|| {
            scalers
                .par_iter()
                .map(|scaler| scaler.run(&intermediate_dir, target_dir, &self.processor))
                .collect()
        });

        let mut platforms = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (scaler, result) in scalers.iter().zip(results) {
            match result {
                Ok(report) => platforms.push(report),
                Err(e) if first_error.is_none() => {
                    error!("{} export failed: {}", scaler.platform(), e);
                    first_error = Some(e);
                }
                Err(e) => error!("{} export failed: {}", scaler.platform(), e),
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let report = PipelineReport {
            target_dir: target_dir.to_path_buf(),
            intermediate_dir,
            watermark,
            platforms,
            processing_time: start_time.elapsed(),
        };

        info!(
            "Pipeline finished: {} files written, {} failed in {:.2}s",
            report.total_successful(),
            report.total_failed(),
            report.processing_time.as_secs_f64()
        );

        Ok(report)
    }

    fn run_watermark(&self, spec: &WatermarkSpec, target_dir: &Path) -> Result<PassReport> {
        let compositor = WatermarkCompositor::load(spec.clone())?;
        if !spec.has_layers() {
            warn!("Watermark has no corner or center layer enabled; images are only re-encoded");
        }

        compositor.apply(target_dir, &target_dir.join(WATERMARK_DIR), &self.processor)
    }

    /// Files each pass would write, without writing anything
    pub fn dry_run(&self, request: &PipelineRequest) -> Result<Vec<(String, Vec<PathBuf>)>> {
        let outputs = |walker: &DirectoryWalker, sources: &[PathBuf]| -> Result<Vec<PathBuf>> {
            Ok(walker.jobs_for(sources.to_vec())?.into_iter().map(|job| job.output).collect())
        };

        // The watermark pass keeps file names, so platform outputs derive from the originals
        let sources = DirectoryWalker::new(&request.target_dir, request.intermediate_dir()).inputs()?;
        let mut passes = Vec::new();

        if let Some(spec) = &request.watermark {
            let walker = DirectoryWalker::new(&request.target_dir, request.target_dir.join(WATERMARK_DIR));
            let compositor_name = format!("{} ({})", WATERMARK_DIR, spec.asset().display());
            passes.push((compositor_name, outputs(&walker, &sources)?));
        }

        for &platform in &request.platforms {
            let scaler = PlatformScaler::new(platform, request.instagram_ratio);
            let walker = DirectoryWalker::new(&request.target_dir, request.target_dir.join(platform.dir_name()))
                .with_extension(scaler.output_extension());
            passes.push((scaler.name(), outputs(&walker, &sources)?));
        }

        Ok(passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CornerPosition, ErrorPolicy};
    use image::{ImageBuffer, Rgb, RgbImage};
    use tempfile::TempDir;

    fn pipeline() -> Pipeline {
        Pipeline::new(ParallelProcessor::new(Some(2), ErrorPolicy::FailFast).unwrap())
    }

    fn save_photo(dir: &Path, name: &str, width: u32, height: u32) {
        let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        img.save_with_format(dir.join(name), image::ImageFormat::Jpeg).unwrap();
    }

    fn platforms(list: &[Platform]) -> BTreeSet<Platform> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_request_rejects_bad_ratio_before_io() {
        let err = PipelineRequest::new("/does/not/exist", None, BTreeSet::new(), "wide").unwrap_err();
        assert!(matches!(err, SweetenerError::InvalidParameters { .. }));
    }

    #[test]
    fn test_intermediate_and_output_dirs() {
        let request = PipelineRequest::new("/photos", None, platforms(&[Platform::TikTok, Platform::Facebook]), "4:5").unwrap();
        assert_eq!(request.intermediate_dir(), PathBuf::from("/photos"));
        assert_eq!(
            request.output_dirs(),
            vec![PathBuf::from("/photos/facebook"), PathBuf::from("/photos/tiktok")]
        );

        let spec = WatermarkSpec::new("logo.png", [CornerPosition::TopLeft], 50, 50).unwrap();
        let request = PipelineRequest::new("/photos", Some(spec), BTreeSet::new(), "4:5").unwrap();
        assert_eq!(request.intermediate_dir(), PathBuf::from("/photos/watermarks"));
    }

    #[test]
    fn test_missing_target_is_storage_error() {
        let root = TempDir::new().unwrap();
        let request = PipelineRequest::new(root.path().join("nope"), None, platforms(&[Platform::Facebook]), "4:5").unwrap();

        assert!(matches!(pipeline().run(&request), Err(SweetenerError::Storage { .. })));
        assert!(!root.path().join("nope").exists());
    }

    #[test]
    fn test_only_enabled_platform_dirs_created() {
        let root = TempDir::new().unwrap();
        save_photo(root.path(), "a.jpg", 300, 200);
        let request = PipelineRequest::new(root.path(), None, platforms(&[Platform::Threads, Platform::TikTok]), "4:5").unwrap();

        let report = pipeline().run(&request).unwrap();
        assert!(report.watermark.is_none());
        assert_eq!(report.platforms.len(), 2);
        assert!(root.path().join("threads/a.jpg").is_file());
        assert!(root.path().join("tiktok/a.webp").is_file());
        assert!(!root.path().join("facebook").exists());
        assert!(!root.path().join(WATERMARK_DIR).exists());
    }

    #[test]
    fn test_asset_error_before_any_output() {
        let root = TempDir::new().unwrap();
        save_photo(root.path(), "a.jpg", 100, 100);
        let spec = WatermarkSpec::new(root.path().join("missing.png"), [CornerPosition::TopLeft], 50, 50).unwrap();
        let request = PipelineRequest::new(root.path(), Some(spec), platforms(&[Platform::Facebook]), "4:5").unwrap();

        let err = pipeline().run(&request).unwrap_err();
        assert!(matches!(err, SweetenerError::Asset { .. }));
        assert!(!root.path().join(WATERMARK_DIR).exists());
        assert!(!root.path().join("facebook").exists());
    }

    #[test]
    fn test_failing_platform_does_not_stop_others() {
        let root = TempDir::new().unwrap();
        save_photo(root.path(), "a.jpg", 100, 100);
        // A directory where the bluesky output file should be written
        std::fs::create_dir_all(root.path().join("bluesky/a.webp")).unwrap();
        let request = PipelineRequest::new(root.path(), None, platforms(&[Platform::Facebook, Platform::Bluesky]), "4:5").unwrap();

        let err = pipeline().run(&request).unwrap_err();
        assert!(matches!(err, SweetenerError::IoError(_)));
        assert!(root.path().join("facebook/a.jpg").is_file());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let root = TempDir::new().unwrap();
        save_photo(root.path(), "a.jpg", 100, 100);
        let spec = WatermarkSpec::new(root.path().join("logo.png"), [], 50, 50).unwrap();
        let request = PipelineRequest::new(root.path(), Some(spec), platforms(&[Platform::Bluesky]), "4:5").unwrap();

        let passes = pipeline().dry_run(&request).unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].0, "bluesky");
        assert_eq!(passes[1].1, vec![root.path().join("bluesky/a.webp")]);
        assert!(!root.path().join(WATERMARK_DIR).exists());
    }

    #[test]
    fn test_dry_run_matches_collision_renames() {
        let root = TempDir::new().unwrap();
        save_photo(root.path(), "a.jpg", 40, 40);
        let png: RgbImage = ImageBuffer::from_pixel(20, 20, Rgb([1, 2, 3]));
        png.save_with_format(root.path().join("a.png"), image::ImageFormat::Png).unwrap();
        let request = PipelineRequest::new(root.path(), None, platforms(&[Platform::Facebook]), "4:5").unwrap();

        let passes = pipeline().dry_run(&request).unwrap();
        assert_eq!(
            passes[0].1,
            vec![root.path().join("facebook/a.jpg"), root.path().join("facebook/a.png.jpg")]
        );
    }
}
