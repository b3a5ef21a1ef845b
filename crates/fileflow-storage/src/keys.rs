//! Blob naming and path resolution.

use std::path::{Path, PathBuf};

use crate::traits::{StorageError, StorageResult};

/// Longest extension carried over from the user-supplied name.
const MAX_EXTENSION_LENGTH: usize = 16;

/// Generate a collision-resistant blob name for `original_name`.
///
/// Format: `{unix_millis}-{16 hex chars}{.ext}`. Only the extension of the
/// user-supplied name survives, lowercased and restricted to ASCII alphanumerics.
pub fn generate_blob_name(original_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = hex::encode(rand::random::<[u8; 8]>());

    match sanitized_extension(original_name) {
        Some(ext) => format!("{}-{}.{}", millis, suffix, ext),
        None => format!("{}-{}", millis, suffix),
    }
}

fn sanitized_extension(original_name: &str) -> Option<String> {
    let file_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }

    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LENGTH)
        .collect::<String>()
        .to_ascii_lowercase();

    (!ext.is_empty()).then_some(ext)
}

/// Directory under which every blob lives.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    base_path: PathBuf,
}

impl StorageRoot {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a blob path to a filesystem path with traversal protection.
    pub fn resolve(&self, blob_path: &str) -> StorageResult<PathBuf> {
        if blob_path.is_empty() {
            return Err(StorageError::InvalidKey("Blob path is empty".to_string()));
        }

        if blob_path.contains("..")
            || blob_path.starts_with('/')
            || blob_path.starts_with('\\')
            || blob_path.contains('\0')
            || Path::new(blob_path).is_absolute()
        {
            return Err(StorageError::InvalidKey(
                "Blob path contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(blob_path);

        // An existing symlink could still point outside the root.
        if let Ok(canonical) = path.canonicalize() {
            let base_canonical = self.base_path.canonicalize().map_err(|e| {
                StorageError::ConfigError(format!("Failed to canonicalize storage root: {}", e))
            })?;
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Blob path resolves outside storage root".to_string(),
                ));
            }
        }

        Ok(path)
    }
}
