//! Foreign-key helpers between record stores.
//!
//! There are no joins: an association reads a foreign-key attribute from one
//! record and looks the value up in the target store's primary key.

use std::sync::Arc;

use crate::{
  error::Result,
  matcher::Matcher,
  record::Record,
  scope::Scope,
  store::RecordStore,
  value::Value,
};

/// The target record whose primary key equals `record[foreign_key]`.
///
/// A null or missing foreign key yields `Ok(None)` without touching the
/// target store.
pub fn belongs_to(record: &Record, foreign_key: &str, target: &Arc<RecordStore>) -> Result<Option<Record>> {
  let id = record.value(foreign_key);
  if id.is_null() {
    return Ok(None);
  }
  target.find_by([(target.primary_key().clone(), Matcher::Eq(id.clone()))])
}

/// The target records whose primary key appears in the sequence held by
/// `record[foreign_key]`.
///
/// A scalar foreign key is treated as a one-element sequence; a null or
/// missing one selects nothing.
pub fn belongs_to_many(record: &Record, foreign_key: &str, target: &Arc<RecordStore>) -> Scope {
  let ids = match record.value(foreign_key) {
    Value::Null => Vec::new(),
    Value::Seq(items) => items.to_vec(),
    other => vec![other.clone()],
  };
  target.all().filter([(target.primary_key().clone(), Matcher::In(ids))])
}
