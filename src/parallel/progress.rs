//! Progress tracking for concurrent passes

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info};

/// Thread-safe progress tracker shared by every pass of a pipeline run
pub struct ProgressTracker {
    passes: Mutex<HashMap<String, PassCounters>>,
    sender: broadcast::Sender<ProgressUpdate>,
}

#[derive(Debug, Clone)]
struct PassCounters {
    started: Instant,
    finished: Option<Duration>,
    total_files: u64,
    completed_files: usize,
    failed_files: usize,
    bytes_written: u64,
}

/// Snapshot of one pass
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub pass: String,
    pub total_files: u64,
    pub completed_files: usize,
    pub failed_files: usize,
    pub elapsed_time: Duration,
    pub bytes_written: u64,
    pub files_per_second: f64,
    pub completion_percentage: f64,
}

/// Progress update event
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    PassStarted {
        pass: String,
        total_files: u64,
    },
    FileCompleted {
        pass: String,
        filename: String,
        success: bool,
        output_size: u64,
        processing_time: Duration,
    },
    PassCompleted {
        final_state: ProgressState,
    },
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);

        Self {
            passes: Mutex::new(HashMap::new()),
            sender,
        }
    }

    fn passes(&self) -> MutexGuard<'_, HashMap<String, PassCounters>> {
        self.passes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a pass; restarting a pass resets its counters
    pub fn start_pass(&self, pass: &str, total_files: u64) {
        self.passes().insert(
            pass.to_string(),
            PassCounters {
                started: Instant::now(),
                finished: None,
                total_files,
                completed_files: 0,
                failed_files: 0,
                bytes_written: 0,
            },
        );

        let _ = self.sender.send(ProgressUpdate::PassStarted {
            pass: pass.to_string(),
            total_files,
        });

        debug!("Started progress tracking for {} ({} files)", pass, total_files);
    }

    /// Record one finished file
    pub fn complete_file(
        &self,
        pass: &str,
        filename: String,
        success: bool,
        output_size: u64,
        processing_time: Duration,
    ) {
        if let Some(counters) = self.passes().get_mut(pass) {
            if success {
                counters.completed_files += 1;
                counters.bytes_written += output_size;
            } else {
                counters.failed_files += 1;
            }
        }

        debug!("{}: completed {} (success: {})", pass, filename, success);

        let _ = self.sender.send(ProgressUpdate::FileCompleted {
            pass: pass.to_string(),
            filename,
            success,
            output_size,
            processing_time,
        });
    }

    /// Mark a pass as finished and broadcast its final state
    pub fn complete_pass(&self, pass: &str) -> Option<ProgressState> {
        let final_state = {
            let mut passes = self.passes();
            let counters = passes.get_mut(pass)?;
            counters.finished = Some(counters.started.elapsed());
            ProgressState::from_counters(pass, counters)
        };

        info!(
            "{} completed: {}/{} files in {:.2}s",
            pass,
            final_state.completed_files,
            final_state.total_files,
            final_state.elapsed_time.as_secs_f64()
        );

        let _ = self.sender.send(ProgressUpdate::PassCompleted {
            final_state: final_state.clone(),
        });
        Some(final_state)
    }

    /// Current state of a pass, if it has been started
    pub fn pass_state(&self, pass: &str) -> Option<ProgressState> {
        self.passes()
            .get(pass)
            .map(|counters| ProgressState::from_counters(pass, counters))
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressState {
    fn from_counters(pass: &str, counters: &PassCounters) -> Self {
        let elapsed = counters.finished.unwrap_or_else(|| counters.started.elapsed());
        let processed = counters.completed_files + counters.failed_files;

        let completion_percentage = if counters.total_files > 0 {
            (processed as f64 / counters.total_files as f64) * 100.0
        } else {
            100.0
        };

        let files_per_second = if elapsed.as_secs_f64() > 0.0 {
            processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            pass: pass.to_string(),
            total_files: counters.total_files,
            completed_files: counters.completed_files,
            failed_files: counters.failed_files,
            elapsed_time: elapsed,
            bytes_written: counters.bytes_written,
            files_per_second,
            completion_percentage,
        }
    }

    /// Get human-readable completion status
    pub fn status_text(&self) -> String {
        if self.completion_percentage >= 100.0 {
            format!("{}: completed", self.pass)
        } else {
            format!(
                "{}: {}/{} files processed",
                self.pass,
                self.completed_files + self.failed_files,
                self.total_files
            )
        }
    }

    /// Get processing speed as human-readable string
    pub fn speed_text(&self) -> String {
        if self.files_per_second >= 1.0 {
            format!("{:.1} files/sec", self.files_per_second)
        } else if self.files_per_second > 0.0 {
            format!("{:.1} sec/file", 1.0 / self.files_per_second)
        } else {
            "Unknown".to_string()
        }
    }
}
