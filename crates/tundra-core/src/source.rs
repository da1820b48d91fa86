//! The `Source` trait: where a record type's raw attribute mappings come from.
//!
//! Backends (e.g. the JSON and TOML files in `tundra-files`) implement this
//! trait. The store only ever sees a list of [`Map`]s in file order plus an
//! optional [`ChangeMarker`] used for auto-reload.

use std::{fmt, path::PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::value::Map;

// ─── Change marker ───────────────────────────────────────────────────────────

/// An opaque, ordered marker of a source's content version.
///
/// Two markers compare equal exactly when the store should consider the source
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeMarker {
  /// Last modification time of the backing file.
  Modified(DateTime<Utc>),
  /// Hex-encoded content digest.
  Digest(String),
  /// In-memory revision counter.
  Revision(u64),
}

impl fmt::Display for ChangeMarker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Modified(t) => write!(f, "mtime {}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
      Self::Digest(d) => write!(f, "sha256 {d}"),
      Self::Revision(r) => write!(f, "revision {r}"),
    }
  }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SourceError {
  /// The source has nowhere to read from.
  #[error("no source location configured: {0}")]
  Unconfigured(String),

  #[error("cannot read {}: {source}", .path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed {format} in {}: {message}", .path.display())]
  Malformed {
    format:  &'static str,
    path:    PathBuf,
    message: String,
  },

  #[error("entry {index} in {} is a {found}, expected a mapping", .path.display())]
  Shape {
    path:  PathBuf,
    index: usize,
    found: &'static str,
  },

  #[error(transparent)]
  Other(Box<dyn std::error::Error + Send + Sync>),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A provider of raw attribute mappings for one record type.
pub trait Source: Send + Sync {
  /// Read every raw record, in source order.
  fn load(&self) -> Result<Vec<Map>, SourceError>;

  /// The current content marker, or `None` when the source cannot tell.
  fn change_marker(&self) -> Result<Option<ChangeMarker>, SourceError> { Ok(None) }

  /// Whether the backing location currently exists.
  fn exists(&self) -> bool { true }

  /// Short description for logs and error messages.
  fn describe(&self) -> String;
}

// ─── In-memory source ────────────────────────────────────────────────────────

/// A source backed by a vector of mappings held in memory.
///
/// Every [`replace`](Self::replace) bumps the revision, so an auto-reloading
/// store picks the new records up on its next access.
#[derive(Debug, Default)]
pub struct MemorySource {
  state: RwLock<(u64, Vec<Map>)>,
}

impl MemorySource {
  pub fn new(records: Vec<Map>) -> Self {
    Self {
      state: RwLock::new((0, records)),
    }
  }

  pub fn replace(&self, records: Vec<Map>) {
    let mut state = self.state.write();
    state.0 += 1;
    state.1 = records;
  }

  pub fn revision(&self) -> u64 { self.state.read().0 }
}

impl Source for MemorySource {
  fn load(&self) -> Result<Vec<Map>, SourceError> { Ok(self.state.read().1.clone()) }

  fn change_marker(&self) -> Result<Option<ChangeMarker>, SourceError> {
    Ok(Some(ChangeMarker::Revision(self.revision())))
  }

  fn describe(&self) -> String { "memory".to_owned() }
}

impl<S: Source + ?Sized> Source for std::sync::Arc<S> {
  fn load(&self) -> Result<Vec<Map>, SourceError> { (**self).load() }

  fn change_marker(&self) -> Result<Option<ChangeMarker>, SourceError> {
    (**self).change_marker()
  }

  fn exists(&self) -> bool { (**self).exists() }

  fn describe(&self) -> String { (**self).describe() }
}
