//! Raw upload directory.
//!
//! Uploaded bytes are kept on disk under their client-supplied file name so an outer layer
//! can serve them back. Nothing in the pipeline reads them again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A directory holding raw uploads, one file per upload name.
#[derive(Debug, Clone)]
pub struct UploadDirectory {
    root: PathBuf,
}

impl UploadDirectory {
    /// Use `root` as the upload directory, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory uploads are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `filename` is stored. Directory components are stripped so a name can never
    /// escape the upload directory.
    pub fn path_for(&self, filename: &str) -> io::Result<PathBuf> {
        let base = Path::new(filename)
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("invalid upload name '{filename}'"))
            })?;
        Ok(self.root.join(base))
    }

    /// Write `bytes` as `filename`, replacing any earlier upload with the same name.
    pub fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(filename)?;
        fs::write(&path, bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "stored raw upload");
        Ok(path)
    }

    /// Remove the upload stored as `filename`. Returns `false` if there was none.
    pub fn remove(&self, filename: &str) -> io::Result<bool> {
        let path = self.path_for(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
