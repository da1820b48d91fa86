//! Change markers for record files.
//!
//! `mtime` uses the file's modification time. `digest` is a hex-encoded
//! SHA-256 over the file's bytes, stable across touches that leave the
//! content unchanged.

use std::{fs, path::Path};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tundra_core::{ChangeMarker, SourceError};

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

pub fn digest_marker(path: &Path) -> Result<ChangeMarker, SourceError> {
  let bytes = fs::read(path).map_err(|source| SourceError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(ChangeMarker::Digest(content_digest(&bytes)))
}

pub fn mtime_marker(path: &Path) -> Result<ChangeMarker, SourceError> {
  let modified = fs::metadata(path)
    .and_then(|m| m.modified())
    .map_err(|source| SourceError::Io {
      path: path.to_path_buf(),
      source,
    })?;
  Ok(ChangeMarker::Modified(DateTime::<Utc>::from(modified)))
}
