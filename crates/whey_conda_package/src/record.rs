//! Reading and patching a wheel's `RECORD` install manifest.
//!
//! Each line of a `RECORD` file has the form `path,sha256=<digest>,<size>`
//! where the digest is the urlsafe base64 encoding (without padding) of the
//! SHA256 hash. Entries without a hash (such as `RECORD` itself) leave the
//! last two columns empty.

use std::fmt;
use std::path::Path;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rattler_digest::{Sha256, compute_file_digest};

use crate::files::to_archive_path;
use crate::{PackageError, Result};

/// A single line of a `RECORD` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// The path relative to the install root, exactly as written in the file
    pub path: String,
    /// The `algorithm=digest` column, if any
    pub hash: Option<String>,
    /// The size in bytes, if known
    pub size: Option<u64>,
}

impl RecordEntry {
    /// Compute the entry for the file at `path`, recorded relative to `relative_to`.
    pub fn from_file(path: &Path, relative_to: &Path) -> Result<Self> {
        let digest = compute_file_digest::<Sha256>(path)?;
        let size = fs_err::metadata(path)?.len();
        Ok(Self {
            path: to_archive_path(path.strip_prefix(relative_to)?)?,
            hash: Some(format!("sha256={}", URL_SAFE_NO_PAD.encode(digest))),
            size: Some(size),
        })
    }

    /// Parse a single `RECORD` line.
    ///
    /// The path is split off at the last two commas, so paths that contain
    /// commas survive a round trip.
    pub fn parse(line: &str) -> Option<Self> {
        let mut columns = line.rsplitn(3, ',');
        let size = columns.next()?;
        let hash = columns.next()?;
        let path = columns.next()?;

        let size = if size.is_empty() {
            None
        } else {
            Some(size.trim().parse().ok()?)
        };

        Some(Self {
            path: path.to_string(),
            hash: (!hash.is_empty()).then(|| hash.to_string()),
            size,
        })
    }

    /// Whether this entry refers to `name` directly inside a `.dist-info` directory.
    pub fn is_dist_info_file(&self, name: &str) -> bool {
        self.path
            .strip_suffix(name)
            .and_then(|rest| rest.strip_suffix('/'))
            .is_some_and(|dir| dir.ends_with(".dist-info"))
    }
}

impl fmt::Display for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},", self.path)?;
        if let Some(hash) = &self.hash {
            write!(f, "{hash}")?;
        }
        write!(f, ",")?;
        if let Some(size) = self.size {
            write!(f, "{size}")?;
        }
        Ok(())
    }
}

/// The parsed contents of a `RECORD` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<RecordEntry>,
}

impl Record {
    /// Parse the contents of a `RECORD` file, ignoring blank lines.
    pub fn parse(contents: &str) -> Result<Self> {
        let entries = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                RecordEntry::parse(line.trim_end()).ok_or_else(|| PackageError::MalformedRecord {
                    line: idx + 1,
                    content: line.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Read and parse a `RECORD` file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::parse(&fs_err::read_to_string(path)?)
    }

    /// Replace the hash and size of the `.dist-info/<name>` entry with `entry`.
    ///
    /// Returns `false` when no such entry exists; the record is left unchanged.
    pub fn replace_dist_info_entry(&mut self, name: &str, entry: RecordEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.is_dist_info_file(name)) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => false,
        }
    }

    /// Drop the `.dist-info/<name>` entries.
    pub fn remove_dist_info_entry(&mut self, name: &str) {
        self.entries.retain(|e| !e.is_dist_info_file(name));
    }

    /// Write the record to disk, one entry per line with a trailing newline.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs_err::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}
