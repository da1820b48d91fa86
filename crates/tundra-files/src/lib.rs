//! JSON, TOML, YAML and CSV file backends for Tundra.
//!
//! [`FileSource`] implements [`tundra_core::Source`] over one record file.
//! [`Catalog`] builds a [`tundra_core::RecordStore`] per record type from a
//! [`CatalogConfig`] and manages fixture overrides.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use tundra_files::{Catalog, CatalogConfig};
//!
//! let config = CatalogConfig::load(Path::new("tundra.toml")).unwrap();
//! let catalog = Catalog::from_config(&config).unwrap();
//! let countries = catalog.get("countries").unwrap();
//! let france = countries.find_by([("name", "France")]).unwrap();
//! println!("{france:?}");
//! ```

pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod source;

pub use catalog::Catalog;
pub use codec::Format;
pub use config::{CatalogConfig, IndexConfig, RecordTypeConfig};
pub use error::{Error, Result};
pub use source::{ChangeDetection, FileSource};

#[cfg(test)]
mod tests;
