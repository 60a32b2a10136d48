//! Parallel processing utilities for batch passes

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ErrorPolicy, ProcessingConfig};
use crate::error::{Result, SweetenerError};
use crate::processing::{FileJob, FileReport, FileTransform, DirectoryWalker};

pub mod progress;

pub use progress::*;

/// Runs the per-file work of a pass on a dedicated rayon pool
pub struct ParallelProcessor {
    pool: rayon::ThreadPool,
    max_concurrent: usize,
    error_policy: ErrorPolicy,
    progress_tracker: Arc<ProgressTracker>,
}

impl ParallelProcessor {
    /// Create a new parallel processor
    pub fn new(max_concurrent: Option<usize>, error_policy: ErrorPolicy) -> Result<Self> {
        let max_concurrent = match max_concurrent {
            Some(0) => {
                return Err(SweetenerError::invalid_parameters(
                    "Thread count must be greater than 0",
                ))
            }
            Some(threads) => threads,
            // Use number of logical CPUs, but cap at 16 to avoid excessive memory usage
            None => num_cpus::get().min(16),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrent)
            .thread_name(|index| format!("sweetener-worker-{}", index))
            .build()
            .map_err(|e| SweetenerError::parallel(format!("Failed to build thread pool: {}", e)))?;

        info!(
            "Initializing parallel processor with {} workers ({:?})",
            max_concurrent, error_policy
        );

        Ok(Self {
            pool,
            max_concurrent,
            error_policy,
            progress_tracker: Arc::new(ProgressTracker::new()),
        })
    }

    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        Self::new(config.threads, config.error_policy)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress_tracker)
    }

    /// Subscribe to progress events of every pass run by this processor
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressUpdate> {
        self.progress_tracker.subscribe()
    }

    /// Run `op` inside the worker pool
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }

    /// Apply `transform` to every file the walker lists.
    ///
    /// Under [`ErrorPolicy::FailFast`] the first failing file aborts the
    /// pass. Under [`ErrorPolicy::Skip`] per-file failures are logged and
    /// recorded in the report; errors that are not specific to one file
    /// still abort.
    pub fn run_pass<T>(&self, transform: &T, walker: &DirectoryWalker) -> Result<PassReport>
    where
        T: FileTransform + ?Sized,
    {
        let name = transform.name();
        let start_time = Instant::now();
        let jobs = walker.plan()?;

        info!(
            "{}: processing {} files from {:?} into {:?}",
            name,
            jobs.len(),
            walker.input_dir(),
            walker.output_dir()
        );
        self.progress_tracker.start_pass(&name, jobs.len() as u64);

        let outcome = match self.error_policy {
            ErrorPolicy::FailFast => self
                .install(|| {
                    jobs.par_iter()
                        .map(|job| self.process_job(&name, transform, job))
                        .collect::<Result<Vec<_>>>()
                })
                .map(|reports| (reports, Vec::new())),
            ErrorPolicy::Skip => {
                let results: Vec<Result<FileReport>> = self.install(|| {
                    jobs.par_iter()
                        .map(|job| self.process_job(&name, transform, job))
                        .collect()
                });
                Self::split_failures(&name, &jobs, results)
            }
        };

        self.progress_tracker.complete_pass(&name);
        let (files, failures) = outcome?;

        let report = PassReport::new(name, walker.output_dir().to_path_buf(), files, failures, start_time.elapsed());
        info!(
            "{}: {} succeeded, {} failed in {:.2}s",
            report.name,
            report.successful(),
            report.failed(),
            report.processing_time.as_secs_f64()
        );

        Ok(report)
    }

    fn process_job<T>(&self, pass: &str, transform: &T, job: &FileJob) -> Result<FileReport>
    where
        T: FileTransform + ?Sized,
    {
        let file_start = Instant::now();
        let filename = job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = transform.transform_file(&job.input, &job.output);

        match &result {
            Ok(report) => {
                self.progress_tracker
                    .complete_file(pass, filename, true, report.output_size, file_start.elapsed());
            }
            Err(e) => {
                debug!("{}: failed to process {:?}: {}", pass, job.input, e);
                self.progress_tracker
                    .complete_file(pass, filename, false, 0, file_start.elapsed());
            }
        }

        result
    }

    fn split_failures(
        pass: &str,
        jobs: &[FileJob],
        results: Vec<Result<FileReport>>,
    ) -> Result<(Vec<FileReport>, Vec<FailedFile>)> {
        let mut files = Vec::new();
        let mut failures = Vec::new();

        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(report) => files.push(report),
                Err(error) if error.is_recoverable() => {
                    warn!("{}: skipping {:?}: {}", pass, job.input, error);
                    failures.push(FailedFile {
                        path: job.input.clone(),
                        error: error.user_message(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        Ok((files, failures))
    }
}

/// A file a pass could not transform
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Result of one pass over a directory
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub name: String,
    pub output_dir: PathBuf,
    pub files: Vec<FileReport>,
    pub failures: Vec<FailedFile>,
    pub processing_time: Duration,
    pub total_input_size: u64,
    pub total_output_size: u64,
}

impl PassReport {
    pub fn new(
        name: String,
        output_dir: PathBuf,
        files: Vec<FileReport>,
        failures: Vec<FailedFile>,
        processing_time: Duration,
    ) -> Self {
        let total_input_size = files.iter().map(|f| f.input_size).sum();
        let total_output_size = files.iter().map(|f| f.output_size).sum();

        Self {
            name,
            output_dir,
            files,
            failures,
            processing_time,
            total_input_size,
            total_output_size,
        }
    }

    pub fn successful(&self) -> usize {
        self.files.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Get compression ratio
    pub fn compression_ratio(&self) -> f64 {
        if self.total_output_size == 0 {
            return 1.0;
        }
        self.total_input_size as f64 / self.total_output_size as f64
    }

    /// Get size reduction percentage
    pub fn size_reduction(&self) -> f64 {
        if self.total_input_size == 0 {
            return 0.0;
        }
        let reduction = self.total_input_size.saturating_sub(self.total_output_size);
        (reduction as f64 / self.total_input_size as f64) * 100.0
    }

    pub fn files_per_second(&self) -> f64 {
        if self.processing_time.is_zero() {
            return 0.0;
        }
        self.successful() as f64 / self.processing_time.as_secs_f64()
    }
}
