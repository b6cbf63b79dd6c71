//! The conda package build: metadata, installation and the final archive.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rattler_conda_types::package::{AboutJson, IndexJson};
use rattler_conda_types::{PackageName, VersionWithSource};
use thiserror::Error;
use whey_conda_package::metadata::write_json;
use whey_conda_package::{
    AboutJsonBuilder, INFO_DIR, IndexJsonBuilder, PackageBuilder, PackageConfig, PackageError,
    PackageOutput,
};

use crate::archive::InstalledWheel;
use crate::channels::ChannelValidator;
use crate::config::CondaConfig;
use crate::installer::WheelInstaller;
use crate::pyproject::ProjectConfig;
use crate::requirements::{RequirementError, runtime_requirements};
use crate::system_tools::ToolError;
use crate::wheel_builder::{WheelBuildError, WheelBuilder};

#[allow(missing_docs)]
#[derive(Debug, Error, Diagnostic)]
pub enum CondaBuildError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    WheelBuild(#[from] WheelBuildError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Install(ToolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Requirements(#[from] RequirementError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Text appended to the conda description when channels are configured.
const CHANNELS_NOTICE: &str = "Before installing please ensure you have added the following channels: ";

/// The `about.json` description: `description`, followed by a notice listing
/// `channels` if there are any.
pub fn conda_description(description: &str, channels: &[String]) -> String {
    if channels.is_empty() {
        description.to_string()
    } else {
        format!("{description}\n\n\n{CHANNELS_NOTICE}{}\n", channels.join(", "))
    }
}

/// Build the `about.json` of the package.
pub fn about_json(project: &ProjectConfig, conda: &CondaConfig) -> AboutJson {
    let mut about = AboutJsonBuilder::new();

    for (label, url) in &project.urls {
        let label = label.to_lowercase();
        if label == "homepage" || label == "home page" {
            about = about
                .with_homepage(url.clone())
                .with_dev_url(url.clone());
        } else if label.starts_with("source") {
            about = about.with_dev_url(url.clone());
        } else if label == "docs" || label == "documentation" {
            about = about.with_doc_url(url.clone());
        }
    }

    if let Some(license) = &project.license_key {
        about = about.with_license(license.clone());
    }

    if let Some(summary) = project.description.as_ref().filter(|d| !d.is_empty()) {
        about = about.with_summary(summary.clone());
    }

    about
        .with_description(conda_description(&conda.description, &conda.channels))
        .with_maintainers(project.maintainer_names())
        .with_channels(conda.channels.clone())
        .build()
}

/// Build the `index.json` of the package; `python` is appended to `depends`.
pub fn index_json(
    project: &ProjectConfig,
    mut depends: Vec<String>,
    build_number: u64,
    timestamp: DateTime<Utc>,
) -> Result<IndexJson, PackageError> {
    depends.push("python".to_string());

    IndexJsonBuilder::new(
        PackageName::try_from(project.conda_name())?,
        VersionWithSource::from_str(&project.version)?,
        build_string(build_number),
    )
    .with_build_number(build_number)
    .with_dependencies(depends)
    .with_timestamp(timestamp)
    .build()
}

/// The build string of a `noarch: python` package, e.g. `py_1`.
pub fn build_string(build_number: u64) -> String {
    format!("py_{build_number}")
}

/// Builds a conda package from a project's wheel.
///
/// The wheel is built and installed through the [`WheelBuilder`] and
/// [`WheelInstaller`] seams; requirements are checked against the conda
/// channels with the [`ChannelValidator`], if one is set.
pub struct CondaBuilder {
    wheel_builder: Box<dyn WheelBuilder>,
    installer: Box<dyn WheelInstaller>,
    validator: Option<Box<dyn ChannelValidator>>,
    conda: CondaConfig,
    build_number: u64,
    package_config: PackageConfig,
}

impl CondaBuilder {
    /// Create a builder with build number 1 that does not check channels.
    pub fn new(
        wheel_builder: Box<dyn WheelBuilder>,
        installer: Box<dyn WheelInstaller>,
        conda: CondaConfig,
    ) -> Self {
        Self {
            wheel_builder,
            installer,
            validator: None,
            conda,
            build_number: 1,
            package_config: PackageConfig::default(),
        }
    }

    /// Check the requirements against the channels with `validator`.
    pub fn with_channel_validator(mut self, validator: Box<dyn ChannelValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the build number.
    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.build_number = build_number;
        self
    }

    /// Set the archive options, e.g. a fixed timestamp.
    pub fn with_package_config(mut self, package_config: PackageConfig) -> Self {
        self.package_config = package_config;
        self
    }

    fn project(&self) -> &ProjectConfig {
        self.wheel_builder.config()
    }

    /// The `info` directory in the build directory.
    pub fn info_dir(&self) -> PathBuf {
        self.wheel_builder.build_dir().join(INFO_DIR)
    }

    /// `<name>-<version>-py_<build number>`, the stem of the archive.
    pub fn identifier(&self) -> String {
        format!(
            "{}-{}-{}",
            self.project().conda_name(),
            self.project().version,
            build_string(self.build_number)
        )
    }

    /// Write `info/license.txt`, if the project has a license text.
    pub fn write_license(&self) -> Result<(), CondaBuildError> {
        let Some(text) = &self.project().license_text else {
            return Ok(());
        };

        let target = self.info_dir().join("license.txt");
        fs_err::create_dir_all(self.info_dir())?;
        fs_err::write(&target, format!("{}\n", text.trim_end()))?;
        self.wheel_builder.report_written(&target);
        Ok(())
    }

    /// Write `info/about.json`.
    pub fn write_conda_about(&self) -> Result<(), CondaBuildError> {
        let target = self.info_dir().join("about.json");
        write_json(&target, &about_json(self.project(), &self.conda))?;
        self.wheel_builder.report_written(&target);
        Ok(())
    }

    /// Resolve the runtime requirements and write `info/index.json`.
    pub fn write_conda_index(&self) -> Result<(), CondaBuildError> {
        let depends = runtime_requirements(self.project(), &self.conda, self.validator.as_deref())?;
        let timestamp = self.package_config.timestamp.unwrap_or_else(Utc::now);

        let target = self.info_dir().join("index.json");
        write_json(
            &target,
            &index_json(self.project(), depends, self.build_number, timestamp)?,
        )?;
        self.wheel_builder.report_written(&target);
        Ok(())
    }

    /// Assemble the archive from the wheel installed in `install_dir`.
    pub fn create_conda_archive(&self, install_dir: &Path) -> Result<PackageOutput, CondaBuildError> {
        let installed = InstalledWheel::new(install_dir, self.wheel_builder.archive_name());
        installed.rewrite_dist_info()?;
        let payload = installed.payload(self.project().top_level_package())?;

        let out_dir = self.wheel_builder.out_dir();
        fs_err::create_dir_all(out_dir)?;

        let output = PackageBuilder::new(self.identifier(), self.package_config.clone())
            .add_site_packages_files(payload)
            .build(self.wheel_builder.build_dir(), out_dir)?;
        Ok(output)
    }

    /// Build the conda package, returning the file name of the archive.
    pub fn build_conda(&self) -> Result<String, CondaBuildError> {
        let wheel_file = self.wheel_builder.build_wheel()?;
        self.wheel_builder.clear_build_dir()?;

        self.write_license()?;
        self.write_conda_about()?;
        self.write_conda_index()?;

        let install_dir = tempfile::tempdir()?;
        tracing::debug!("Installing wheel into temporary directory");
        self.installer
            .install(
                &self.wheel_builder.out_dir().join(&wheel_file),
                install_dir.path(),
            )
            .map_err(CondaBuildError::Install)?;

        let output = self.create_conda_archive(install_dir.path())?;

        let created = fs_err::canonicalize(&output.path)?;
        tracing::info!(
            "{}",
            console::style(format!(
                "Conda package created at {}",
                created.to_string_lossy().replace('\\', "/")
            ))
            .green()
        );

        Ok(output.file_name())
    }
}
