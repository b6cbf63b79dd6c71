//! File collection for package creation

use std::path::{Path, PathBuf};

use crate::{PackageError, Result};

mod collector;

pub use collector::FileCollector;

/// Represents a file to be included in the package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Source path on disk
    pub source: PathBuf,

    /// Destination path within the package (relative)
    pub destination: PathBuf,
}

impl FileEntry {
    /// Create a FileEntry from source and destination paths
    pub fn new(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Return a copy of this entry with its destination nested below `dir`
    pub fn nested_in(&self, dir: &Path) -> Self {
        Self {
            source: self.source.clone(),
            destination: dir.join(&self.destination),
        }
    }

    /// The destination as a forward-slash separated archive path
    pub fn archive_path(&self) -> Result<String> {
        to_archive_path(&self.destination)
    }
}

/// Convert a relative path into the `/` separated form used inside archives
pub fn to_archive_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| PackageError::NonUtf8Path(path.to_path_buf()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path_uses_forward_slashes() -> Result<()> {
        let entry = FileEntry::new(
            PathBuf::from("/tmp/install/spam/__init__.py"),
            Path::new("spam").join("__init__.py"),
        )
        .nested_in(Path::new("site-packages"));

        assert_eq!(entry.archive_path()?, "site-packages/spam/__init__.py");
        Ok(())
    }
}
