//! Metadata generation for conda packages

use std::path::Path;

use serde::Serialize;

use crate::Result;

mod about;
mod index;

pub use about::AboutJsonBuilder;
pub use index::IndexJsonBuilder;

/// Serialize `value` as pretty-printed JSON (two space indent) into `path`.
///
/// The parent directory is created if it does not exist yet.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let file = fs_err::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
