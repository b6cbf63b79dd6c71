//! Installing the built wheel into a staging directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use indicatif::MultiProgress;

use crate::console_utils::spinner;
use crate::system_tools::{self, ToolError};

/// Installs a wheel's contents into a target directory.
pub trait WheelInstaller {
    /// Unpack `wheel` into `target_dir` the way an installer would, leaving
    /// the `.dist-info` directory with its `RECORD` next to the packages.
    fn install(&self, wheel: &Path, target_dir: &Path) -> Result<(), ToolError>;
}

/// Installs wheels by running `pip install --target`.
pub struct PipInstaller {
    pip: PathBuf,
    multi_progress: MultiProgress,
}

impl PipInstaller {
    /// Create an installer running the given pip executable.
    pub fn new(pip: PathBuf, multi_progress: MultiProgress) -> Self {
        Self {
            pip,
            multi_progress,
        }
    }

    fn command(&self, wheel: &Path, target_dir: &Path) -> Result<Command, ToolError> {
        let mut command = Command::new(system_tools::find_tool(&self.pip)?);
        command
            .arg("install")
            .arg(wheel)
            .arg("--target")
            .arg(target_dir)
            .args([
                "--no-deps",
                "--no-compile",
                "--no-warn-script-location",
                "--no-warn-conflicts",
                "--disable-pip-version-check",
            ]);
        Ok(command)
    }
}

impl WheelInstaller for PipInstaller {
    fn install(&self, wheel: &Path, target_dir: &Path) -> Result<(), ToolError> {
        tracing::debug!("Installing wheel into {}", target_dir.display());

        let mut command = self.command(wheel, target_dir)?;
        let progress = spinner(&self.multi_progress, "Installing wheel");
        let result = system_tools::run(&self.pip, &mut command);
        progress.finish_and_clear();

        result.map(|_| ())
    }
}
