//! # whey_conda_package
//!
//! A library for assembling `noarch: python` conda packages from the
//! installed contents of a Python wheel.
//!
//! It handles:
//!
//! - Metadata generation (`about.json`, `index.json`)
//! - Patching a wheel's `RECORD` install manifest
//! - Staging files under `site-packages/` and writing `info/files`
//! - Archive creation (`.tar.bz2`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use whey_conda_package::metadata::write_json;
//! use whey_conda_package::{FileCollector, IndexJsonBuilder, PackageBuilder, PackageConfig};
//! use rattler_conda_types::PackageName;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let name = PackageName::new_unchecked("spam");
//! let version = "2020.0.0".parse()?;
//!
//! let index = IndexJsonBuilder::new(name, version, "py_1".to_string())
//!     .with_build_number(1)
//!     .build()?;
//! write_json(Path::new("/tmp/build/info/index.json"), &index)?;
//!
//! let payload = FileCollector::new(Path::new("/tmp/install/spam").to_path_buf()).collect()?;
//!
//! let output = PackageBuilder::new("spam-2020.0.0-py_1", PackageConfig::default())
//!     .add_site_packages_files(payload)
//!     .build(Path::new("/tmp/build"), Path::new("/tmp/dist"))?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod builder;
pub mod error;
pub mod files;
pub mod metadata;
pub mod record;

// Re-export main types
pub use builder::{PackageBuilder, PackageConfig, PackageOutput};
pub use error::{PackageError, Result};
pub use files::{FileCollector, FileEntry};
pub use metadata::{AboutJsonBuilder, IndexJsonBuilder};
pub use record::{Record, RecordEntry};

/// The directory inside a noarch python package that holds the payload.
pub const SITE_PACKAGES: &str = "site-packages";

/// The directory inside a conda package that holds the metadata.
pub const INFO_DIR: &str = "info";

/// The file extension of the archives written by this crate.
pub const TAR_BZ2_EXTENSION: &str = ".tar.bz2";
