//! Whole-file JSON persistence with temp-file + rename replacement.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Storage
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read and deserialize `path`. `Ok(None)` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// A fully written temporary file waiting to replace its target.
///
/// Dropping an uncommitted write removes the temporary file.
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Serialize `value` next to `path` and flush it to disk.
    pub fn stage<T: Serialize>(path: &Path, value: &T) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let temp_path = temp_sibling(path);
        let staged = Self {
            temp_path,
            path: path.to_path_buf(),
            committed: false,
        };

        let mut file = std::fs::File::create(&staged.temp_path)
            .map_err(|e| StorageError::io(&staged.temp_path, e))?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::io(&staged.temp_path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io(&staged.temp_path, e))?;

        Ok(staged)
    }

    /// Atomically replace the target with the staged file.
    pub fn commit(mut self) -> Result<(), StorageError> {
        std::fs::rename(&self.temp_path, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Replace `path` with the JSON encoding of `value`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    StagedWrite::stage(path, value)?.commit()
}

/// Delete `path`; a file that is already gone is not an error.
pub fn remove_file_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
