//! Error types for `tundra-core`.

use std::sync::Arc;

use thiserror::Error;

use crate::{source::SourceError, value::Value};

#[derive(Debug, Error)]
pub enum Error {
  /// The record type cannot locate its source (e.g. no base path).
  #[error("configuration error for {record_type}: {message}")]
  Configuration {
    record_type: Arc<str>,
    message:     String,
  },

  #[error("failed to load {record_type}: {source}")]
  Load {
    record_type: Arc<str>,
    #[source]
    source:      SourceError,
  },

  #[error("{record_type}#{attribute:?} is not unique")]
  NotUnique {
    record_type: Arc<str>,
    attribute:   Arc<str>,
  },

  #[error("{record_type}: {detail}")]
  RecordNotFound {
    record_type: Arc<str>,
    detail:      String,
  },

  #[error("unknown attribute {attribute:?} for {record_type}")]
  UnknownAttribute {
    record_type: Arc<str>,
    attribute:   String,
  },

  #[error("attribute {attribute:?} holds a non-numeric value: {value}")]
  NotNumeric { attribute: Arc<str>, value: Value },

  #[error("finder expects {expected} value(s), got {found}")]
  Arity { expected: usize, found: usize },

  #[error("unsupported operation: {0}")]
  Unsupported(&'static str),
}

impl Error {
  pub(crate) fn not_found(record_type: &Arc<str>, detail: impl Into<String>) -> Self {
    Self::RecordNotFound {
      record_type: record_type.clone(),
      detail:      detail.into(),
    }
  }

  /// Whether this is a [`Error::RecordNotFound`].
  pub fn is_not_found(&self) -> bool { matches!(self, Self::RecordNotFound { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
