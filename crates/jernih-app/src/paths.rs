//! Filesystem path helpers (XDG-aware) for the processing history store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Filesystem layout under the configured `storage.path`, which defaults to
/// `$XDG_DATA_HOME/jernih/lmdb`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// LMDB environment for processing records (`.../history`).
    pub fn history_lmdb_dir(&self) -> Result<PathBuf, PathError> {
        self.ensure_child(&["history"])
    }

    fn ensure_child(&self, segments: &[&str]) -> Result<PathBuf, PathError> {
        let mut path = self.base_dir.clone();
        for segment in segments {
            path.push(segment);
        }
        ensure_dir(&path)
    }
}

fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path)
        && err.kind() != io::ErrorKind::AlreadyExists
    {
        return Err(PathError::CreateDir {
            path: path.to_path_buf(),
            source: err,
        });
    }
    Ok(path.to_path_buf())
}
