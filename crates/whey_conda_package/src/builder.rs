//! Package builder - stages the payload and writes the conda archive

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rattler_conda_types::compression_level::CompressionLevel;
use rattler_package_streaming::write::write_tar_bz2_package;

use crate::files::{FileCollector, FileEntry};
use crate::{INFO_DIR, PackageError, Result, SITE_PACKAGES, TAR_BZ2_EXTENSION};

/// Configuration for package creation
#[derive(Debug, Clone)]
pub struct PackageConfig {
    /// Compression level (0-9, higher = better compression but slower)
    pub compression_level: u8,

    /// Timestamp for reproducible builds
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            compression_level: 9,
            timestamp: None,
        }
    }
}

/// Builder for the final `.tar.bz2` archive of a `noarch: python` package
///
/// The builder works inside a build directory whose `info/` subdirectory
/// already holds the package metadata. Payload files are copied to
/// `<build_dir>/site-packages/`, their archive paths are listed in
/// `info/files`, and everything is written to
/// `<output_dir>/<identifier>.tar.bz2`.
pub struct PackageBuilder {
    identifier: String,
    config: PackageConfig,
    site_packages: Vec<FileEntry>,
}

impl PackageBuilder {
    /// Create a new package builder
    ///
    /// # Arguments
    /// * `identifier` - `name-version-build`, used as the archive file stem
    /// * `config` - Package creation configuration
    pub fn new(identifier: impl Into<String>, config: PackageConfig) -> Self {
        Self {
            identifier: identifier.into(),
            config,
            site_packages: Vec::new(),
        }
    }

    /// Add files that are installed below `site-packages/`
    ///
    /// The destination of each entry is taken relative to `site-packages/`.
    pub fn add_site_packages_files(mut self, files: Vec<FileEntry>) -> Self {
        self.site_packages.extend(files);
        self
    }

    /// Build the package and write it to the output directory
    pub fn build(self, build_dir: &Path, output_dir: &Path) -> Result<PackageOutput> {
        if self.site_packages.is_empty() {
            tracing::warn!("Building package with no files");
        }

        let site_packages = Path::new(SITE_PACKAGES);
        let mut staged_files = Vec::new();
        let mut files_entries = Vec::new();

        // Step 1: Stage the payload below site-packages/
        for file_entry in &self.site_packages {
            let entry = file_entry.nested_in(site_packages);
            let dest_path = build_dir.join(&entry.destination);

            if let Some(parent) = dest_path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            if entry.source != dest_path {
                fs_err::copy(&entry.source, &dest_path)?;
            }

            files_entries.push(entry.archive_path()?);
            staged_files.push(dest_path);
        }

        tracing::debug!("Staged {} files", staged_files.len());

        // Step 2: List the payload in info/files
        let info_dir = build_dir.join(INFO_DIR);
        fs_err::create_dir_all(&info_dir)?;
        let mut files_list = files_entries.join("\n");
        files_list.push('\n');
        fs_err::write(info_dir.join("files"), files_list)?;

        // Step 3: Everything in info/ goes into the archive
        for info_file in FileCollector::new(info_dir).collect()? {
            staged_files.push(info_file.source);
        }

        // Step 4: Create the archive
        let output_path = output_dir.join(format!("{}{}", self.identifier, TAR_BZ2_EXTENSION));

        tracing::debug!("Creating package archive: {}", output_path.display());

        write_archive(&self.config, &output_path, build_dir, &staged_files)?;

        Ok(PackageOutput {
            path: output_path,
            identifier: self.identifier,
        })
    }
}

/// Write `files` (absolute paths below `base_dir`) into a `.tar.bz2` at `output_path`.
fn write_archive(
    config: &PackageConfig,
    output_path: &Path,
    base_dir: &Path,
    files: &[PathBuf],
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs_err::create_dir_all(parent)?;
    }

    let output_file = fs_err::File::create(output_path)?;
    write_tar_bz2_package(
        output_file,
        base_dir,
        files,
        CompressionLevel::Numeric(i32::from(config.compression_level)),
        config.timestamp.as_ref(),
        None,
    )
    .map_err(|e| PackageError::ArchiveCreation(e.to_string()))
}

/// Result of successful package creation
#[derive(Debug)]
pub struct PackageOutput {
    /// Path to the created package file
    pub path: PathBuf,

    /// Package identifier (name-version-build)
    pub identifier: String,
}

impl PackageOutput {
    /// The file name of the created archive
    pub fn file_name(&self) -> String {
        format!("{}{}", self.identifier, TAR_BZ2_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_creates_output_dir() -> Result<()> {
        let build_dir = tempfile::tempdir()?;
        let output_dir = tempfile::tempdir()?;

        let module = build_dir.path().join("spam").join("__init__.py");
        fs_err::create_dir_all(module.parent().unwrap())?;
        fs_err::write(&module, "print('hello world')")?;

        let config = PackageConfig {
            compression_level: 1,
            ..Default::default()
        };
        let nested = output_dir.path().join("nested").join("dist");
        let output = PackageBuilder::new("spam-1.0.0-py_1", config)
            .add_site_packages_files(vec![FileEntry::new(module, PathBuf::from("spam/__init__.py"))])
            .build(build_dir.path(), &nested)?;

        assert_eq!(output.path, nested.join("spam-1.0.0-py_1.tar.bz2"));
        assert!(output.path.metadata()?.len() > 0);
        assert_eq!(
            fs_err::read_to_string(build_dir.path().join("info").join("files"))?,
            "site-packages/spam/__init__.py\n"
        );

        Ok(())
    }
}
