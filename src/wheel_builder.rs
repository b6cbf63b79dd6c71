//! Building the project's wheel.

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use indicatif::MultiProgress;
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;
use walkdir::WalkDir;

use crate::console_utils::spinner;
use crate::pyproject::ProjectConfig;
use crate::system_tools::{self, ToolError};

/// The compatibility tag of a pure Python wheel.
pub const PURE_PYTHON_TAG: &str = "py3-none-any";

#[allow(missing_docs)]
#[derive(Debug, Error, Diagnostic)]
pub enum WheelBuildError {
    #[error("Package directory '{0}' not found.")]
    #[diagnostic(help("set `package` or `source-dir` in [tool.whey]"))]
    PackageDirNotFound(String),

    #[error("No Python source files found in {}", .0.display())]
    NoSourceFiles(PathBuf),

    #[error("the wheel builder did not produce {}", .0.display())]
    WheelNotProduced(PathBuf),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to walk the package directory")]
    WalkDir(#[from] walkdir::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Builds a wheel for a project and owns the directories of the build.
pub trait WheelBuilder {
    /// The project's metadata.
    fn config(&self) -> &ProjectConfig;

    /// The directory containing `pyproject.toml`.
    fn project_dir(&self) -> &Path;

    /// The scratch directory of the build.
    fn build_dir(&self) -> &Path;

    /// The directory the wheel (and later the conda package) is written to.
    fn out_dir(&self) -> &Path;

    /// Build the wheel into [`WheelBuilder::out_dir`], returning its file name.
    fn build_wheel(&self) -> Result<String, WheelBuildError>;

    /// The stem of the wheel's `.dist-info` directory.
    fn archive_name(&self) -> String {
        self.config().archive_name()
    }

    /// Remove everything from the build directory, leaving it empty.
    fn clear_build_dir(&self) -> Result<(), WheelBuildError> {
        let build_dir = self.build_dir();
        if build_dir.exists() {
            fs_err::remove_dir_all(build_dir)?;
        }
        fs_err::create_dir_all(build_dir)?;
        Ok(())
    }

    /// Report that `path` was written.
    fn report_written(&self, path: &Path) {
        let shown = path.strip_prefix(self.build_dir()).unwrap_or(path);
        tracing::debug!("Writing {}", shown.display());
    }
}

/// Builds wheels with the `whey` build backend, run as `python -m whey`.
pub struct WheyWheelBuilder {
    project_dir: PathBuf,
    build_dir: PathBuf,
    out_dir: PathBuf,
    config: ProjectConfig,
    python: PathBuf,
    multi_progress: MultiProgress,
}

impl WheyWheelBuilder {
    /// Create a builder for the project in `project_dir`.
    ///
    /// The build directory defaults to `<project_dir>/build/conda` and the
    /// output directory to `<project_dir>/dist`.
    pub fn new(project_dir: PathBuf, config: ProjectConfig, multi_progress: MultiProgress) -> Self {
        Self {
            build_dir: project_dir.join("build").join("conda"),
            out_dir: project_dir.join("dist"),
            project_dir,
            config,
            python: PathBuf::from("python3"),
            multi_progress,
        }
    }

    /// Use another build directory.
    pub fn with_build_dir(mut self, build_dir: PathBuf) -> Self {
        self.build_dir = build_dir;
        self
    }

    /// Use another output directory.
    pub fn with_out_dir(mut self, out_dir: PathBuf) -> Self {
        self.out_dir = out_dir;
        self
    }

    /// Run whey with another Python interpreter.
    pub fn with_python(mut self, python: PathBuf) -> Self {
        self.python = python;
        self
    }

    /// The wheel's file name, e.g. `spam-2020.0.0-py3-none-any.whl`.
    pub fn wheel_file_name(&self) -> String {
        format!("{}-{PURE_PYTHON_TAG}.whl", self.archive_name())
    }

    /// Check that the import package exists and contains Python sources.
    pub fn check_sources(&self) -> Result<(), WheelBuildError> {
        let relative = self.config.package_dir();
        let package_dir = self.project_dir.join(&relative);
        if !package_dir.is_dir() {
            let shown = relative
                .components()
                .filter(|component| !matches!(component, Component::CurDir))
                .map(|component| component.as_os_str().to_string_lossy())
                .join("/");
            return Err(WheelBuildError::PackageDirNotFound(shown));
        }

        for entry in WalkDir::new(&package_dir) {
            let entry = entry?;
            let is_source = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "py" || ext == "pyi");
            if is_source {
                return Ok(());
            }
        }

        Err(WheelBuildError::NoSourceFiles(package_dir))
    }

    fn command(&self) -> Result<Command, ToolError> {
        let mut command = Command::new(system_tools::find_tool(&self.python)?);
        command
            .args(["-m", "whey"])
            .arg(&self.project_dir)
            .arg("--wheel")
            .arg("--out-dir")
            .arg(&self.out_dir)
            .arg("--build-dir")
            .arg(&self.build_dir);
        Ok(command)
    }
}

impl WheelBuilder for WheyWheelBuilder {
    fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn build_wheel(&self) -> Result<String, WheelBuildError> {
        self.check_sources()?;
        fs_err::create_dir_all(&self.out_dir)?;

        let mut command = self.command()?;
        let progress = spinner(&self.multi_progress, "Building wheel");
        let result = system_tools::run(&self.python, &mut command);
        progress.finish_and_clear();
        result?;

        let wheel_file = self.wheel_file_name();
        let wheel_path = self.out_dir.join(&wheel_file);
        if !wheel_path.is_file() {
            return Err(WheelBuildError::WheelNotProduced(wheel_path));
        }

        tracing::debug!("Built wheel {}", wheel_path.display());
        Ok(wheel_file)
    }
}
