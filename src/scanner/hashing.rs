use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Prefix of keys built without reading the file contents.
pub const FALLBACK_PREFIX: &str = "name-size:";

/// Identity of a photo for "already uploaded" bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoKey {
    /// SHA-256 of the file bytes, lowercase hex.
    Digest(String),
    /// File name and size; a renamed copy gets a different key.
    Fallback(String),
}

impl PhotoKey {
    pub fn as_str(&self) -> &str {
        match self {
            PhotoKey::Digest(s) | PhotoKey::Fallback(s) => s,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PhotoKey::Fallback(_))
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Content digest, or the name+size composite when the bytes can't be read.
pub fn photo_key(path: &Path) -> PhotoKey {
    match sha256_file(path) {
        Ok(digest) => PhotoKey::Digest(digest),
        Err(e) => {
            let key = fallback_key(path);
            tracing::warn!(path = %path.display(), error = %e, %key, "Hashing failed, using name+size key");
            PhotoKey::Fallback(key)
        }
    }
}

fn fallback_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let size = std::fs::metadata(path)
        .map(|m| m.len().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}{}:{}", FALLBACK_PREFIX, name, size)
}
