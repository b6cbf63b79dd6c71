//! Turning an installed wheel into the payload of the conda package.

use std::path::{Path, PathBuf};

use whey_conda_package::{FileCollector, FileEntry, PackageError, Record, RecordEntry};

/// The content `INSTALLER` is rewritten to.
pub const CONDA_INSTALLER: &str = "conda\n";

/// `.dist-info` files an installer leaves behind that a conda package must not ship.
pub const INSTALLER_ONLY_FILES: [&str; 2] = ["REQUESTED", "direct_url.json"];

/// The installed contents of a wheel.
pub struct InstalledWheel {
    install_dir: PathBuf,
    archive_name: String,
}

impl InstalledWheel {
    /// Describe a wheel installed into `install_dir` whose dist-info directory
    /// is `<archive_name>.dist-info`.
    pub fn new(install_dir: &Path, archive_name: impl Into<String>) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
            archive_name: archive_name.into(),
        }
    }

    /// The `.dist-info` directory of the installed wheel.
    pub fn dist_info_dir(&self) -> PathBuf {
        self.install_dir
            .join(format!("{}.dist-info", self.archive_name))
    }

    /// Mark the installation as done by conda.
    ///
    /// `INSTALLER` (when present) is rewritten to `conda`, and `RECORD` is
    /// updated to match: the `INSTALLER` entry gets the new hash and size, the
    /// [`INSTALLER_ONLY_FILES`] entries are dropped.
    pub fn rewrite_dist_info(&self) -> Result<(), PackageError> {
        let dist_info = self.dist_info_dir();
        let installer = dist_info.join("INSTALLER");
        let record_path = dist_info.join("RECORD");

        let installer_written = installer.is_file();
        if installer_written {
            fs_err::write(&installer, CONDA_INSTALLER)?;
        }

        if !record_path.is_file() {
            tracing::warn!("No RECORD in {}", dist_info.display());
            return Ok(());
        }

        let mut record = Record::from_path(&record_path)?;
        if installer_written {
            let entry = RecordEntry::from_file(&installer, &self.install_dir)?;
            if !record.replace_dist_info_entry("INSTALLER", entry) {
                tracing::debug!("RECORD does not list INSTALLER");
            }
        }
        for name in INSTALLER_ONLY_FILES {
            record.remove_dist_info_entry(name);
        }
        record.write(&record_path)
    }

    /// The files to install below `site-packages/`: the import package
    /// `top_level_package` followed by the dist-info directory.
    pub fn payload(&self, top_level_package: &str) -> Result<Vec<FileEntry>, PackageError> {
        let package_dir = self.install_dir.join(top_level_package);
        if !package_dir.is_dir() {
            tracing::warn!(
                "The installed wheel does not contain the package '{top_level_package}'"
            );
        }

        let mut files = FileCollector::new(package_dir).collect()?;

        let dist_info = INSTALLER_ONLY_FILES
            .into_iter()
            .fold(FileCollector::new(self.dist_info_dir()), |collector, name| {
                collector.skip_file_name(name)
            })
            .collect()?;
        files.extend(dist_info);

        Ok(files)
    }
}
