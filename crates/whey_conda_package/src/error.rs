//! Error types for the whey_conda_package crate

use std::path::PathBuf;

/// Result type alias using PackageError
pub type Result<T> = std::result::Result<T, PackageError>;

/// Errors that can occur during package creation
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize JSON
    #[error("Failed to serialize JSON: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// Failed to strip prefix from path
    #[error("Could not strip prefix from path: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// WalkDir error
    #[error("Failed to walk directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Version parsing error
    #[error("Failed to parse version: {0}")]
    VersionParse(#[from] rattler_conda_types::ParseVersionError),

    /// Package name parsing error
    #[error("Failed to parse package name: {0}")]
    PackageNameParse(#[from] rattler_conda_types::InvalidPackageNameError),

    /// A path could not be represented in the archive
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// A `RECORD` line could not be parsed
    #[error("Malformed RECORD line {line}: '{content}'")]
    MalformedRecord {
        /// One-based line number
        line: usize,
        /// The offending line
        content: String,
    },

    /// Archive creation error
    #[error("Failed to create archive: {0}")]
    ArchiveCreation(String),
}
