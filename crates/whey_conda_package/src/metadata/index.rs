//! IndexJson builder

use chrono::{DateTime, Utc};
use rattler_conda_types::package::IndexJson;
use rattler_conda_types::{NoArchType, PackageName, Platform, VersionWithSource};

use crate::Result;

/// Builder for creating IndexJson metadata
///
/// Packages are always `noarch: python` in the `noarch` subdir, which is the
/// only layout a repackaged pure Python wheel can have.
///
/// # Example
/// ```rust
/// use whey_conda_package::metadata::IndexJsonBuilder;
/// use rattler_conda_types::PackageName;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let index = IndexJsonBuilder::new(
///         PackageName::new_unchecked("spam"),
///         "2020.0.0".parse()?,
///         "py_1".to_string()
///     )
///     .with_build_number(1)
///     .with_dependency("python".to_string())
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct IndexJsonBuilder {
    name: PackageName,
    version: VersionWithSource,
    build: String,
    build_number: u64,
    timestamp: Option<DateTime<Utc>>,
    depends: Vec<String>,
}

impl IndexJsonBuilder {
    /// Create a new IndexJsonBuilder
    ///
    /// # Arguments
    /// * `name` - Package name
    /// * `version` - Package version
    /// * `build` - Build string (e.g., "py_1")
    pub fn new(name: PackageName, version: VersionWithSource, build: String) -> Self {
        Self {
            name,
            version,
            build,
            build_number: 0,
            timestamp: None,
            depends: Vec::new(),
        }
    }

    /// Set the build number
    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.build_number = build_number;
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Add a dependency
    pub fn with_dependency(mut self, dep: String) -> Self {
        self.depends.push(dep);
        self
    }

    /// Set all dependencies
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends = deps;
        self
    }

    /// Build the IndexJson
    pub fn build(self) -> Result<IndexJson> {
        Ok(IndexJson {
            name: self.name,
            version: self.version,
            build: self.build,
            build_number: self.build_number,
            arch: None,
            platform: None,
            subdir: Some(Platform::NoArch.to_string()),
            license: None,
            license_family: None,
            timestamp: self.timestamp.map(Into::into),
            depends: self.depends,
            constrains: Vec::new(),
            noarch: NoArchType::python(),
            track_features: Vec::new(),
            features: None,
            python_site_packages_path: None,
            purls: None,
            experimental_extra_depends: Default::default(),
        })
    }
}
