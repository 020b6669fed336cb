use std::io::Write;
use std::path::{Path, PathBuf};

use super::{is_safe_path, new_blob_path, Store, StoreError, ARTIFACT_FOLDER, TEMPLATE_FOLDER};

/// Files under a base directory. Writes land in a temporary file next to
/// the target and are renamed into place, so readers never see a partial
/// certificate.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(TEMPLATE_FOLDER))?;
        std::fs::create_dir_all(root.join(ARTIFACT_FOLDER))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_path(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(self.root.join(path))
    }
}

impl Store for LocalStore {
    fn write(&self, blob: &[u8], folder: &str, extension: &str) -> Result<String, StoreError> {
        let path = new_blob_path(folder, extension);
        let full_path = self.resolve(&path)?;
        let dir = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(blob)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&full_path).map_err(|e| StoreError::Io(e.error))?;

        tracing::debug!(path = %path, bytes = blob.len(), "stored blob");
        Ok(path)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let full_path = self.resolve(path)?;
        match std::fs::read(&full_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn delete(&self, path: &str) -> bool {
        let full_path = match self.resolve(path) {
            Ok(p) => p,
            Err(_) => return false,
        };
        match std::fs::remove_file(&full_path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "could not delete blob");
                false
            }
        }
    }
}
