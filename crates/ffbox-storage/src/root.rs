//! Storage root and filename rules.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Prefixes of per-request scratch files. These are never registered.
pub const TRANSIENT_PREFIXES: &[&str] = &["input_", "upload_", "norm_"];

/// Maximum accepted filename length.
const MAX_NAME_LEN: usize = 255;

/// Validate an artifact filename.
///
/// Valid format: alphanumeric, hyphens, underscores, dots. No path traversal.
pub fn is_valid_artifact_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// The temp directory shared by acquisition, generation and cleanup.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    dir: PathBuf,
}

impl StorageRoot {
    /// Open (creating if needed) a storage root.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Resolve a filename inside the root, rejecting anything that could escape it.
    pub fn resolve(&self, filename: &str) -> StorageResult<PathBuf> {
        if !is_valid_artifact_name(filename) {
            return Err(StorageError::invalid_filename(filename));
        }
        Ok(self.dir.join(filename))
    }

    /// Generate a fresh `<prefix>_<uuid><suffix>` name.
    ///
    /// `suffix` is appended verbatim, e.g. `".mp4"` or `"_12.jpg"`.
    pub fn unique_name(prefix: &str, suffix: &str) -> String {
        format!("{}_{}{}", prefix, Uuid::new_v4().simple(), suffix)
    }

    /// Whether a filename belongs to a request's scratch space.
    pub fn is_transient(filename: &str) -> bool {
        TRANSIENT_PREFIXES.iter().any(|p| filename.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_validation() {
        assert!(is_valid_artifact_name("screenshot_abc123_12.jpg"));
        assert!(is_valid_artifact_name("converted-1.mp4"));
        assert!(!is_valid_artifact_name(""));
        assert!(!is_valid_artifact_name("../etc/passwd"));
        assert!(!is_valid_artifact_name("a/b.mp4"));
        assert!(!is_valid_artifact_name("a\\b.mp4"));
        assert!(!is_valid_artifact_name("a b.mp4"));
        assert!(!is_valid_artifact_name(&"a".repeat(300)));
    }

    #[test]
    fn test_unique_names_differ() {
        let a = StorageRoot::unique_name("converted", ".mp4");
        let b = StorageRoot::unique_name("converted", ".mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("converted_"));
        assert!(a.ends_with(".mp4"));
        assert!(is_valid_artifact_name(&a));
    }

    #[test]
    fn test_transient_prefixes() {
        assert!(StorageRoot::is_transient("input_abc.mp4"));
        assert!(StorageRoot::is_transient("upload_abc.mp4"));
        assert!(!StorageRoot::is_transient("converted_abc.mp4"));
    }

    #[tokio::test]
    async fn test_resolve_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = StorageRoot::open(dir.path().join("videos")).await.unwrap();
        assert!(root.path().is_dir());

        let path = root.resolve("bgm_1.mp4").unwrap();
        assert_eq!(path, root.path().join("bgm_1.mp4"));
        assert!(matches!(
            root.resolve("../x"),
            Err(StorageError::InvalidFilename(_))
        ));
    }
}
