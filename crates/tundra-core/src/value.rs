//! The attribute value model.
//!
//! Every attribute of every record is a [`Value`]: a closed set of scalars
//! plus two shared, immutable containers. Containers and text are behind
//! `Arc` so that the [`Interner`](crate::intern::Interner) can collapse equal
//! values onto one allocation.
//!
//! ## Equality and ordering
//!
//! `Value` is `Eq + Ord + Hash` so that it can key an index and drive the
//! sort comparator:
//!
//! - Different kinds order by rank:
//!   `Null < Bool < number < Text < Date < Timestamp < Seq < Map`.
//! - `Int` and `Float` are a single numeric kind: `Int(116) == Float(116.0)`.
//! - `-0.0 == 0.0`. NaN sorts above every number and only equals a NaN with
//!   the same bit pattern.
//! - An integral float hashes exactly like the equal integer.

use std::{
  cmp::Ordering,
  collections::BTreeMap,
  fmt,
  hash::{Hash, Hasher},
  sync::Arc,
};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};

/// An attribute mapping: attribute name → value.
pub type Map = BTreeMap<Arc<str>, Value>;

/// A single attribute value.
#[derive(Debug, Clone, Default)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(Arc<str>),
  Date(NaiveDate),
  Timestamp(DateTime<Utc>),
  Seq(Arc<[Value]>),
  Map(Arc<Map>),
}

// ─── Accessors ───────────────────────────────────────────────────────────────

impl Value {
  /// Human-readable kind name, used in error messages.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Float(_) => "float",
      Self::Text(_) => "text",
      Self::Date(_) => "date",
      Self::Timestamp(_) => "timestamp",
      Self::Seq(_) => "seq",
      Self::Map(_) => "map",
    }
  }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn is_number(&self) -> bool { matches!(self, Self::Int(_) | Self::Float(_)) }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Int(i) => Some(*i),
      Self::Float(f) => float_as_int(*f),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Int(i) => Some(*i as f64),
      Self::Float(f) => Some(*f),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_date(&self) -> Option<NaiveDate> {
    match self {
      Self::Date(d) => Some(*d),
      _ => None,
    }
  }

  pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Timestamp(t) => Some(*t),
      _ => None,
    }
  }

  pub fn as_seq(&self) -> Option<&[Value]> {
    match self {
      Self::Seq(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&Map> {
    match self {
      Self::Map(m) => Some(m),
      _ => None,
    }
  }

  /// Truthiness used by [`Record::is_present`](crate::record::Record::is_present):
  /// null, `false`, zero, empty text and empty containers are absent.
  pub fn is_present(&self) -> bool {
    match self {
      Self::Null => false,
      Self::Bool(b) => *b,
      Self::Int(i) => *i != 0,
      Self::Float(f) => *f != 0.0,
      Self::Text(s) => !s.trim().is_empty(),
      Self::Date(_) | Self::Timestamp(_) => true,
      Self::Seq(s) => !s.is_empty(),
      Self::Map(m) => !m.is_empty(),
    }
  }

  /// Whether both values are backed by the same allocation.
  ///
  /// Only text and containers are shared; scalars are never identical.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Text(a), Self::Text(b)) => Arc::ptr_eq(a, b),
      (Self::Seq(a), Self::Seq(b)) => Arc::ptr_eq(a, b),
      (Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b),
      _ => false,
    }
  }

  /// Kind-strict structural equality. Unlike `==`, `Int(3)` and `Float(3.0)`
  /// differ and floats compare by bit pattern.
  pub(crate) fn identical(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Int(a), Self::Int(b)) => a == b,
      (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
      (Self::Int(_), Self::Float(_)) | (Self::Float(_), Self::Int(_)) => false,
      (Self::Seq(a), Self::Seq(b)) => Arc::ptr_eq(a, b) || seqs_identical(a, b),
      (Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b) || maps_identical(a, b),
      _ => self == other,
    }
  }

  /// Hash consistent with [`identical`](Self::identical).
  pub(crate) fn hash_identical<H: Hasher>(&self, state: &mut H) {
    match self {
      Self::Float(f) => {
        u8::MAX.hash(state);
        f.to_bits().hash(state);
      }
      Self::Seq(items) => {
        self.rank().hash(state);
        hash_seq_identical(items, state);
      }
      Self::Map(map) => {
        self.rank().hash(state);
        hash_map_identical(map, state);
      }
      other => other.hash(state),
    }
  }

  /// Kind rank used by the cross-kind order. `Int` and `Float` share one.
  pub(crate) fn rank(&self) -> u8 {
    match self {
      Self::Null => 0,
      Self::Bool(_) => 1,
      Self::Int(_) | Self::Float(_) => 2,
      Self::Text(_) => 3,
      Self::Date(_) => 4,
      Self::Timestamp(_) => 5,
      Self::Seq(_) => 6,
      Self::Map(_) => 7,
    }
  }
}

pub(crate) fn seqs_identical(a: &[Value], b: &[Value]) -> bool {
  a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
}

pub(crate) fn maps_identical(a: &Map, b: &Map) -> bool {
  a.len() == b.len()
    && a
      .iter()
      .zip(b)
      .all(|((ka, va), (kb, vb))| ka == kb && va.identical(vb))
}

pub(crate) fn hash_seq_identical<H: Hasher>(items: &[Value], state: &mut H) {
  items.len().hash(state);
  for item in items {
    item.hash_identical(state);
  }
}

pub(crate) fn hash_map_identical<H: Hasher>(map: &Map, state: &mut H) {
  map.len().hash(state);
  for (key, value) in map {
    key.hash(state);
    value.hash_identical(state);
  }
}

// ─── Numeric helpers ─────────────────────────────────────────────────────────

/// 2^63 as an exact `f64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// The integer equal to `f`, if there is one.
fn float_as_int(f: f64) -> Option<i64> {
  if f == 0.0 {
    return Some(0);
  }
  if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) {
    Some(f as i64)
  } else {
    None
  }
}

/// NaN of either sign sorts above every number; NaNs order by bit pattern.
fn cmp_f64(a: f64, b: f64) -> Ordering {
  match (a.is_nan(), b.is_nan()) {
    (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    (true, true) => a.to_bits().cmp(&b.to_bits()),
  }
}

fn cmp_int_f64(i: i64, f: f64) -> Ordering {
  if f.is_nan() {
    return Ordering::Less;
  }
  if f >= I64_BOUND {
    return Ordering::Less;
  }
  if f < -I64_BOUND {
    return Ordering::Greater;
  }
  let whole = f.trunc();
  match i.cmp(&(whole as i64)) {
    Ordering::Equal => cmp_f64(whole, f),
    other => other,
  }
}

// ─── Eq / Ord / Hash ─────────────────────────────────────────────────────────

impl Ord for Value {
  fn cmp(&self, other: &Self) -> Ordering {
    use Value::*;
    match (self, other) {
      (Null, Null) => Ordering::Equal,
      (Bool(a), Bool(b)) => a.cmp(b),
      (Int(a), Int(b)) => a.cmp(b),
      (Float(a), Float(b)) => cmp_f64(*a, *b),
      (Int(a), Float(b)) => cmp_int_f64(*a, *b),
      (Float(a), Int(b)) => cmp_int_f64(*b, *a).reverse(),
      (Text(a), Text(b)) => a.cmp(b),
      (Date(a), Date(b)) => a.cmp(b),
      (Timestamp(a), Timestamp(b)) => a.cmp(b),
      (Seq(a), Seq(b)) if Arc::ptr_eq(a, b) => Ordering::Equal,
      (Seq(a), Seq(b)) => a.cmp(b),
      (Map(a), Map(b)) if Arc::ptr_eq(a, b) => Ordering::Equal,
      (Map(a), Map(b)) => a.cmp(b),
      _ => self.rank().cmp(&other.rank()),
    }
  }
}

impl PartialOrd for Value {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Value {}

impl Hash for Value {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.rank().hash(state);
    match self {
      Self::Null => {}
      Self::Bool(b) => b.hash(state),
      Self::Int(i) => i.hash(state),
      Self::Float(f) => match float_as_int(*f) {
        Some(i) => i.hash(state),
        None => f.to_bits().hash(state),
      },
      Self::Text(s) => s.hash(state),
      Self::Date(d) => d.hash(state),
      Self::Timestamp(t) => t.hash(state),
      Self::Seq(s) => s.hash(state),
      Self::Map(m) => m.hash(state),
    }
  }
}

// ─── Conversions ─────────────────────────────────────────────────────────────

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Int(i) }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self { Self::Int(i.into()) }
}

impl From<u32> for Value {
  fn from(i: u32) -> Self { Self::Int(i.into()) }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self { Self::Float(f) }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(Arc::from(s)) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(Arc::from(s)) }
}

impl From<Arc<str>> for Value {
  fn from(s: Arc<str>) -> Self { Self::Text(s) }
}

impl From<NaiveDate> for Value {
  fn from(d: NaiveDate) -> Self { Self::Date(d) }
}

impl From<DateTime<Utc>> for Value {
  fn from(t: DateTime<Utc>) -> Self { Self::Timestamp(t) }
}

impl From<Vec<Value>> for Value {
  fn from(v: Vec<Value>) -> Self { Self::Seq(v.into()) }
}

impl From<Map> for Value {
  fn from(m: Map) -> Self { Self::Map(Arc::new(m)) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

// ─── Serialisation & display ─────────────────────────────────────────────────

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Null => serializer.serialize_unit(),
      Self::Bool(b) => serializer.serialize_bool(*b),
      Self::Int(i) => serializer.serialize_i64(*i),
      Self::Float(f) => serializer.serialize_f64(*f),
      Self::Text(s) => serializer.serialize_str(s),
      Self::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
      Self::Timestamp(t) => {
        serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
      }
      Self::Seq(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items.iter() {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Self::Map(entries) => {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries.iter() {
          map.serialize_entry(&**k, v)?;
        }
        map.end()
      }
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Int(i) => write!(f, "{i}"),
      Self::Float(x) => write!(f, "{x:?}"),
      Self::Text(s) => write!(f, "{:?}", &**s),
      Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
      Self::Timestamp(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
      Self::Seq(items) => {
        f.write_str("[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{item}")?;
        }
        f.write_str("]")
      }
      Self::Map(entries) => {
        f.write_str("{")?;
        for (i, (k, v)) in entries.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
      }
    }
  }
}
