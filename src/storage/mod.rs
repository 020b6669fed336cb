mod local;
mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use thiserror::Error;
use uuid::Uuid;

/// Folder for uploaded course templates.
pub const TEMPLATE_FOLDER: &str = "certificate-templates";
/// Folder for rendered student certificates.
pub const ARTIFACT_FOLDER: &str = "certificates";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte storage for templates and certificates, addressed by relative
/// paths such as `certificates/<uuid>.png`.
pub trait Store: Send + Sync {
    /// Stores `blob` under a fresh `<uuid>.<extension>` name in `folder`
    /// and returns its path.
    fn write(&self, blob: &[u8], folder: &str, extension: &str) -> Result<String, StoreError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Removes `path`; `true` when nothing remains at that path.
    fn delete(&self, path: &str) -> bool;
}

pub fn new_blob_path(folder: &str, extension: &str) -> String {
    format!("{}/{}.{}", folder, Uuid::new_v4(), extension)
}

/// Rejects absolute paths and parent references so blob paths stay inside
/// the store root.
pub(crate) fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("certificates/a.png", true)]
    #[case("certificate-templates/x.html", true)]
    #[case("../etc/passwd", false)]
    #[case("certificates/../../x", false)]
    #[case("/abs/path.png", false)]
    #[case("", false)]
    #[case("a//b", false)]
    fn safe_paths(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_safe_path(path), expected);
    }

    #[test]
    fn blob_paths_are_unique() {
        let a = new_blob_path(ARTIFACT_FOLDER, "png");
        let b = new_blob_path(ARTIFACT_FOLDER, "png");
        assert_ne!(a, b);
        assert!(a.starts_with("certificates/"));
        assert!(a.ends_with(".png"));
    }
}
