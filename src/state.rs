//! Durable per-sample upload progress.
//!
//! The whole map is rewritten after every mutation. Writes go to a temporary
//! file in the target directory which is then renamed over the state file, so
//! readers see either the previous or the new content.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Result, UploadError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadState {
    /// Remote observation id, set once the observation exists.
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub uuid: Option<String>,

    /// Keys of photos confirmed on the remote. Only ever grows.
    #[serde(default)]
    pub uploaded_photos: Vec<String>,

    #[serde(default)]
    pub complete: bool,

    /// Captive/wild vote already cast.
    #[serde(default)]
    pub wild_voted: bool,
}

impl UploadState {
    pub fn has_photo(&self, key: &str) -> bool {
        self.uploaded_photos.iter().any(|k| k == key)
    }

    /// Returns false when the key was already recorded.
    pub fn record_photo(&mut self, key: &str) -> bool {
        if self.has_photo(key) {
            return false;
        }
        self.uploaded_photos.push(key.to_string());
        true
    }
}

pub type StateMap = BTreeMap<String, UploadState>;

pub struct StateStore {
    path: PathBuf,
    entries: StateMap,
}

impl StateStore {
    /// Load the state file; absent or corrupt files start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable state file, starting empty");
                StateMap::new()
            }
        };
        tracing::debug!(path = %path.display(), samples = entries.len(), "State loaded");
        Self { path, entries }
    }

    pub fn get(&self, sample_id: &str) -> Option<&UploadState> {
        self.entries.get(sample_id)
    }

    pub fn entries(&self) -> &StateMap {
        &self.entries
    }

    pub fn is_complete(&self, sample_id: &str) -> bool {
        self.get(sample_id).map(|s| s.complete).unwrap_or(false)
    }

    /// Apply a mutation to one entry and persist immediately.
    pub fn update<F>(&mut self, sample_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut UploadState),
    {
        mutate(self.entries.entry(sample_id.to_string()).or_default());
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(&self.entries)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| UploadError::Io(e.error))?;

        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<StateMap> {
    if !path.exists() {
        return Ok(StateMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(StateMap::new());
    }
    serde_json::from_str(&content).map_err(|e| UploadError::StateStoreCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
