use std::collections::HashMap;
use std::sync::Mutex;

use super::{is_safe_path, new_blob_path, Store, StoreError};

/// In-process store, used for development runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `blob` at an exact path, replacing what was there.
    pub fn insert(&self, path: &str, blob: impl Into<Vec<u8>>) {
        self.blobs().insert(path.to_string(), blob.into());
    }

    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        match self.blobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Store for MemoryStore {
    fn write(&self, blob: &[u8], folder: &str, extension: &str) -> Result<String, StoreError> {
        let path = new_blob_path(folder, extension);
        if !is_safe_path(&path) {
            return Err(StoreError::NotFound(path));
        }
        self.blobs().insert(path.clone(), blob.to_vec());
        Ok(path)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> bool {
        self.blobs().remove(path);
        true
    }
}
