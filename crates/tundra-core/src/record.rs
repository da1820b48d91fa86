//! Records: immutable attribute mappings tagged with their record type.

use std::{
  fmt,
  hash::{Hash, Hasher},
  sync::Arc,
};

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::value::{Map, Value};

static NULL: Value = Value::Null;

/// One record of a record type.
///
/// Cloning is cheap: every clone shares the same attribute mapping. Two
/// records are equal when they are the same allocation, or when they belong to
/// the same record type and carry the same non-null id.
#[derive(Clone)]
pub struct Record {
  inner: Arc<RecordInner>,
}

struct RecordInner {
  record_type: Arc<str>,
  primary_key: Arc<str>,
  attributes:  Arc<Map>,
}

impl Record {
  pub fn new(record_type: Arc<str>, primary_key: Arc<str>, attributes: Arc<Map>) -> Self {
    Self {
      inner: Arc::new(RecordInner {
        record_type,
        primary_key,
        attributes,
      }),
    }
  }

  pub fn record_type(&self) -> &Arc<str> { &self.inner.record_type }

  pub fn primary_key(&self) -> &Arc<str> { &self.inner.primary_key }

  pub fn attributes(&self) -> &Arc<Map> { &self.inner.attributes }

  /// The primary-key value, `Null` when absent.
  pub fn id(&self) -> &Value { self.value(&self.inner.primary_key) }

  /// The attribute's value, or `None` when the record does not carry it.
  pub fn get(&self, name: &str) -> Option<&Value> { self.inner.attributes.get(name) }

  /// The attribute's value, reading `Null` when absent.
  pub fn value(&self, name: &str) -> &Value { self.get(name).unwrap_or(&NULL) }

  pub fn get_str(&self, name: &str) -> Option<&str> { self.get(name)?.as_str() }

  pub fn get_i64(&self, name: &str) -> Option<i64> { self.get(name)?.as_i64() }

  pub fn get_f64(&self, name: &str) -> Option<f64> { self.get(name)?.as_f64() }

  pub fn get_bool(&self, name: &str) -> Option<bool> { self.get(name)?.as_bool() }

  pub fn get_date(&self, name: &str) -> Option<NaiveDate> { self.get(name)?.as_date() }

  /// Whether the attribute holds a present (truthy, non-blank) value.
  pub fn is_present(&self, name: &str) -> bool { self.value(name).is_present() }

  /// Whether both handles point at the same loaded record.
  pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

  pub(crate) fn addr(&self) -> usize { Arc::as_ptr(&self.inner) as usize }
}

impl PartialEq for Record {
  fn eq(&self, other: &Self) -> bool {
    if self.ptr_eq(other) {
      return true;
    }
    let id = self.id();
    self.inner.record_type == other.inner.record_type && !id.is_null() && id == other.id()
  }
}

impl Eq for Record {}

impl Hash for Record {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.inner.record_type.hash(state);
    self.id().hash(state);
  }
}

impl fmt::Debug for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Record")
      .field("type", &self.inner.record_type)
      .field("attributes", &self.inner.attributes)
      .finish()
  }
}

impl fmt::Display for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.inner.record_type, self.id())
  }
}

impl Serialize for Record {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.inner.attributes.serialize(serializer)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(kind: &str, attrs: &[(&str, Value)]) -> Record {
    let map: Map = attrs
      .iter()
      .map(|(k, v)| (Arc::<str>::from(*k), v.clone()))
      .collect();
    Record::new(kind.into(), "id".into(), Arc::new(map))
  }

  #[test]
  fn reads_attributes_and_typed_getters() {
    let r = record("countries", &[
      ("id", Value::Int(2)),
      ("name", Value::from("France")),
      ("density", Value::Float(116.0)),
    ]);
    assert_eq!(r.id(), &Value::Int(2));
    assert_eq!(r.get_str("name"), Some("France"));
    assert_eq!(r.get_f64("density"), Some(116.0));
    assert_eq!(r.get("king"), None);
    assert_eq!(r.value("king"), &Value::Null);
  }

  #[test]
  fn presence_follows_truthiness() {
    let r = record("countries", &[
      ("name", Value::from("France")),
      ("blank", Value::from("  ")),
      ("zero", Value::Int(0)),
      ("flag", Value::Bool(false)),
    ]);
    assert!(r.is_present("name"));
    assert!(!r.is_present("blank"));
    assert!(!r.is_present("zero"));
    assert!(!r.is_present("flag"));
    assert!(!r.is_present("missing"));
  }

  #[test]
  fn equality_uses_type_and_id() {
    let a = record("countries", &[("id", Value::Int(1)), ("name", Value::from("Austria"))]);
    let b = record("countries", &[("id", Value::Int(1))]);
    let c = record("cars", &[("id", Value::Int(1))]);
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn records_without_id_only_equal_themselves() {
    let a = record("countries", &[("name", Value::from("Austria"))]);
    let b = record("countries", &[("name", Value::from("Austria"))]);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
  }

  #[test]
  fn serializes_as_its_attributes() {
    let r = record("countries", &[("id", Value::Int(3)), ("name", Value::from("Peru"))]);
    assert_eq!(
      serde_json::to_string(&r).unwrap(),
      r#"{"id":3,"name":"Peru"}"#
    );
  }
}
