//! Core types for Tundra, a read-only, in-memory record store over flat data
//! files.
//!
//! A [`RecordStore`] loads a dataset once from a [`Source`], deduplicates its
//! values, builds the declared indexes, and then answers lazy, composable
//! [`Scope`] queries without touching the source again (unless auto-reload is
//! enabled and the source changes).
//!
//! This crate does no file I/O itself; concrete sources live in
//! `tundra-files`.

pub mod association;
pub mod error;
pub mod finder;
pub mod index;
pub mod intern;
pub mod matcher;
pub mod record;
pub mod scope;
pub mod source;
pub mod store;
pub mod value;

pub use error::{Error, Result};
pub use finder::Finder;
pub use matcher::{Matcher, ValueRange};
pub use record::Record;
pub use scope::{Direction, OrderKey, Plucked, ResultSet, Scope};
pub use source::{ChangeMarker, MemorySource, Source, SourceError};
pub use store::{Generation, RecordStore, RecordType};
pub use value::{Map, Value};
