use std::path::{Path, PathBuf};

use crate::error::ProcessError;

/// RAII guard for a temporary text payload handed to an executable.
///
/// Large chunk texts bypass command-line length limits through a file. The
/// file is deleted when the guard drops, on success and error paths alike.
#[derive(Debug)]
pub struct TempTextFile {
    path: PathBuf,
}

impl TempTextFile {
    /// Writes `content` to a fresh file under the system temp directory.
    pub fn create(prefix: &str, content: &str) -> Result<Self, ProcessError> {
        Self::create_in(&std::env::temp_dir(), prefix, content)
    }

    /// Writes `content` to a fresh file under `dir`.
    pub fn create_in(dir: &Path, prefix: &str, content: &str) -> Result<Self, ProcessError> {
        let path = dir.join(format!("{}_{}.txt", prefix, uuid::Uuid::new_v4().simple()));
        std::fs::write(&path, content).map_err(|e| ProcessError::Io {
            stage: "temp_file".to_string(),
            source: e,
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempTextFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to clean up temp text file: {}", e);
            }
        }
    }
}
