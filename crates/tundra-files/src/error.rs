//! Error type for `tundra-files`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tundra_core::Error),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("unknown record type: {0}")]
  UnknownRecordType(String),

  #[error("record type {0} is declared more than once")]
  DuplicateRecordType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
