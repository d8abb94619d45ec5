pub mod discovery;
pub mod hashing;

use anyhow::Result;
use std::path::PathBuf;

pub use discovery::discover_sample_photos;
pub use hashing::{photo_key, PhotoKey};

#[derive(Debug, Clone)]
pub struct LocalPhoto {
    pub path: PathBuf,
    pub key: PhotoKey,
}

impl LocalPhoto {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Finds the photos of a sample under the images root.
pub struct PhotoLocator {
    root: PathBuf,
    extensions: Vec<String>,
}

impl PhotoLocator {
    pub fn new(root: PathBuf, extensions: Vec<String>) -> Self {
        Self { root, extensions }
    }

    pub fn sample_dir(&self, sample_id: &str) -> PathBuf {
        self.root.join(sample_id)
    }

    pub fn locate(&self, sample_id: &str) -> Result<Vec<PathBuf>> {
        discover_sample_photos(&self.root, sample_id, &self.extensions)
    }

    /// Locate and fingerprint in one pass, keeping the natural order.
    pub fn locate_keyed(&self, sample_id: &str) -> Result<Vec<LocalPhoto>> {
        Ok(self
            .locate(sample_id)?
            .into_iter()
            .map(|path| {
                let key = photo_key(&path);
                LocalPhoto { path, key }
            })
            .collect())
    }
}
