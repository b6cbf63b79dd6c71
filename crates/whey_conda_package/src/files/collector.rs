//! File collection from directories

use std::collections::HashSet;
use std::path::PathBuf;
use walkdir::WalkDir;

use super::FileEntry;
use crate::Result;

/// Collects files from a directory for packaging
///
/// Destinations are relative to the parent of the scanned directory, so
/// collecting `/tmp/install/spam` yields `spam/__init__.py` and friends.
pub struct FileCollector {
    /// Source directory to scan
    source_dir: PathBuf,

    /// File names that are never collected
    skip_names: HashSet<String>,
}

impl FileCollector {
    /// Create a new FileCollector for the given directory
    pub fn new(source_dir: PathBuf) -> Self {
        Self {
            source_dir,
            skip_names: HashSet::new(),
        }
    }

    /// Never collect files with this exact file name
    pub fn skip_file_name(mut self, name: impl Into<String>) -> Self {
        self.skip_names.insert(name.into());
        self
    }

    /// Collect all matching files, sorted by path
    ///
    /// A missing source directory yields no files.
    pub fn collect(self) -> Result<Vec<FileEntry>> {
        if !self.source_dir.exists() {
            tracing::debug!("Nothing to collect in {}", self.source_dir.display());
            return Ok(Vec::new());
        }

        let base = self
            .source_dir
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        let mut files = Vec::new();

        for entry in WalkDir::new(&self.source_dir).sort_by_file_name() {
            let entry = entry?;

            // Skip directories - we only want files
            if entry.file_type().is_dir() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if self.skip_names.contains(file_name.as_ref()) {
                tracing::debug!("Skipping {}", entry.path().display());
                continue;
            }

            let relative_path = entry.path().strip_prefix(&base)?;
            files.push(FileEntry::new(
                entry.path().to_path_buf(),
                relative_path.to_path_buf(),
            ));
        }

        Ok(files)
    }
}
