//! A [`Source`] reading one record file in any supported [`Format`].

use std::{
  fs,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use strum::{Display, EnumString};
use tracing::debug;
use tundra_core::{ChangeMarker, Map, Source, SourceError};

use crate::{
  codec::Format,
  fingerprint::{digest_marker, mtime_marker},
};

/// How a file source reports changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeDetection {
  /// File modification time.
  #[default]
  Mtime,
  /// SHA-256 of the file content.
  Digest,
}

#[derive(Debug, Clone)]
pub struct FileSource {
  path:      Option<PathBuf>,
  format:    Format,
  detection: ChangeDetection,
}

impl FileSource {
  pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
    Self {
      path: Some(path.into()),
      format,
      detection: ChangeDetection::default(),
    }
  }

  /// A source with no location; every load fails as unconfigured.
  pub fn unconfigured(format: Format) -> Self {
    Self {
      path: None,
      format,
      detection: ChangeDetection::default(),
    }
  }

  pub fn with_change_detection(mut self, detection: ChangeDetection) -> Self {
    self.detection = detection;
    self
  }

  pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

  pub fn format(&self) -> Format { self.format }

  fn require_path(&self) -> Result<&Path, SourceError> {
    self.path.as_deref().ok_or_else(|| {
      SourceError::Unconfigured(format!(
        "no file and no base path for a {} source",
        self.format
      ))
    })
  }
}

impl Source for FileSource {
  fn load(&self) -> Result<Vec<Map>, SourceError> {
    let path = self.require_path()?;
    let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let records = self.format.decode(path, &text)?;
    debug!(path = %path.display(), records = records.len(), "decoded record file");
    Ok(records)
  }

  fn change_marker(&self) -> Result<Option<ChangeMarker>, SourceError> {
    let path = self.require_path()?;
    let marker = match self.detection {
      ChangeDetection::Mtime => mtime_marker(path)?,
      ChangeDetection::Digest => digest_marker(path)?,
    };
    Ok(Some(marker))
  }

  fn exists(&self) -> bool { self.path.as_deref().is_some_and(Path::exists) }

  fn describe(&self) -> String {
    match &self.path {
      Some(path) => format!("{} ({})", path.display(), self.format),
      None => format!("unconfigured {} source", self.format),
    }
  }
}
