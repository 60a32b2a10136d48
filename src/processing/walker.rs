//! Flat directory traversal mapping each input file to an output path

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, SweetenerError};

/// One input file and where its transformed copy goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Lists the immediate files of a directory (no recursion) and derives
/// output names from them
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    input_dir: PathBuf,
    output_dir: PathBuf,
    extension_override: Option<&'static str>,
}

impl DirectoryWalker {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            extension_override: None,
        }
    }

    /// Replace the extension of every output file
    pub fn with_extension(mut self, extension: Option<&'static str>) -> Self {
        self.extension_override = extension;
        self
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Immediate files of the input directory in file-name order, without
    /// touching the output directory. Subdirectories are skipped.
    pub fn inputs(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = WalkDir::new(&self.input_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in entries {
            let entry = entry.map_err(|e| {
                SweetenerError::storage(format!("cannot list input directory: {}", e), self.input_dir.clone())
            })?;

            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }

    /// Create the output directory and list the jobs, in file-name order
    pub fn plan(&self) -> Result<Vec<FileJob>> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            SweetenerError::storage(format!("cannot create output directory: {}", e), self.output_dir.clone())
        })?;

        let jobs = self.jobs_for(self.inputs()?)?;

        debug!(
            "Planned {} files from {:?} into {:?}",
            jobs.len(),
            self.input_dir,
            self.output_dir
        );
        Ok(jobs)
    }

    /// Pair each input with a distinct output path.
    ///
    /// With an extension override two inputs can share a stem (`a.jpg`,
    /// `a.png`). The first in name order keeps `a.jpg`; later ones keep
    /// their whole file name and gain the override (`a.png.jpg`).
    pub fn jobs_for(&self, inputs: Vec<PathBuf>) -> Result<Vec<FileJob>> {
        let mut taken = HashSet::with_capacity(inputs.len());
        let mut jobs = Vec::with_capacity(inputs.len());

        for input in inputs {
            let mut output = self.output_path_for(&input);
            if taken.contains(&output) {
                if let (Some(ext), Some(file_name)) = (self.extension_override, input.file_name()) {
                    let mut name = file_name.to_os_string();
                    name.push(".");
                    name.push(ext);
                    output = self.output_dir.join(name);
                }
                if taken.contains(&output) {
                    return Err(SweetenerError::storage(
                        format!("{} maps to an output name already in use", input.display()),
                        output,
                    ));
                }
                debug!("Renamed output of {:?} to {:?} to avoid a collision", input, output);
            }

            taken.insert(output.clone());
            jobs.push(FileJob { input, output });
        }

        Ok(jobs)
    }

    /// Run `transform` once per file, in order, stopping at the first error
    pub fn walk<F, R>(&self, mut transform: F) -> Result<Vec<R>>
    where
        F: FnMut(&Path, &Path) -> Result<R>,
    {
        self.plan()?
            .iter()
            .map(|job| transform(&job.input, &job.output))
            .collect()
    }

    /// Output path: file stem plus the original extension or the override
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let mut name: OsString = input.file_stem().map(OsString::from).unwrap_or_default();

        let extension = match self.extension_override {
            Some(ext) => Some(OsString::from(ext)),
            None => input.extension().map(OsString::from),
        };
        if let Some(ext) = extension {
            name.push(".");
            name.push(ext);
        }

        self.output_dir.join(name)
    }
}
