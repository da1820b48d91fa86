//! Matchers: how one criterion value tests an attribute.

use std::{
  cmp::Ordering,
  fmt,
  ops::{Bound, Range, RangeBounds, RangeFrom, RangeInclusive, RangeTo, RangeToInclusive},
};

use chrono::NaiveDate;

use crate::value::Value;

// ─── ValueRange ──────────────────────────────────────────────────────────────

/// A range of [`Value`]s with arbitrary bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueRange {
  pub start: Bound<Value>,
  pub end:   Bound<Value>,
}

impl ValueRange {
  pub fn new(start: Bound<Value>, end: Bound<Value>) -> Self { Self { start, end } }

  /// Whether `value` lies within the range and is of the same kind as its
  /// bounded ends. `Int` and `Float` count as one kind, so `..15` never
  /// covers `Null` and `5..` never covers text.
  pub fn covers(&self, value: &Value) -> bool {
    match self.kind() {
      RangeKind::Any => self.contains(value),
      RangeKind::Only(rank) => value.rank() == rank && self.contains(value),
      RangeKind::Nothing => false,
    }
  }

  pub(crate) fn kind(&self) -> RangeKind {
    match (bound_value(&self.start), bound_value(&self.end)) {
      (None, None) => RangeKind::Any,
      (Some(v), None) | (None, Some(v)) => RangeKind::Only(v.rank()),
      (Some(a), Some(b)) if a.rank() == b.rank() => RangeKind::Only(a.rank()),
      (Some(_), Some(_)) => RangeKind::Nothing,
    }
  }
}

/// The kinds of value a range can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangeKind {
  /// Unbounded on both sides.
  Any,
  Only(u8),
  /// Bounds of different kinds.
  Nothing,
}

fn bound_value(bound: &Bound<Value>) -> Option<&Value> {
  match bound {
    Bound::Included(v) | Bound::Excluded(v) => Some(v),
    Bound::Unbounded => None,
  }
}

impl RangeBounds<Value> for ValueRange {
  fn start_bound(&self) -> Bound<&Value> { self.start.as_ref() }

  fn end_bound(&self) -> Bound<&Value> { self.end.as_ref() }
}

fn bound_rank(bound: &Bound<Value>) -> u8 {
  match bound {
    Bound::Unbounded => 0,
    Bound::Included(_) => 1,
    Bound::Excluded(_) => 2,
  }
}

fn cmp_bound(a: &Bound<Value>, b: &Bound<Value>) -> Ordering {
  match (a, b) {
    (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => x.cmp(y),
    _ => bound_rank(a).cmp(&bound_rank(b)),
  }
}

impl Ord for ValueRange {
  fn cmp(&self, other: &Self) -> Ordering {
    cmp_bound(&self.start, &other.start).then_with(|| cmp_bound(&self.end, &other.end))
  }
}

impl PartialOrd for ValueRange {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl fmt::Display for ValueRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.start {
      Bound::Included(v) => write!(f, "{v}")?,
      Bound::Excluded(v) => write!(f, "{v}<")?,
      Bound::Unbounded => {}
    }
    match &self.end {
      Bound::Included(v) => write!(f, "..={v}"),
      Bound::Excluded(v) => write!(f, "..{v}"),
      Bound::Unbounded => write!(f, ".."),
    }
  }
}

impl<T: Into<Value>> From<Range<T>> for ValueRange {
  fn from(r: Range<T>) -> Self {
    Self::new(Bound::Included(r.start.into()), Bound::Excluded(r.end.into()))
  }
}

impl<T: Into<Value>> From<RangeInclusive<T>> for ValueRange {
  fn from(r: RangeInclusive<T>) -> Self {
    let (start, end) = r.into_inner();
    Self::new(Bound::Included(start.into()), Bound::Included(end.into()))
  }
}

impl<T: Into<Value>> From<RangeFrom<T>> for ValueRange {
  fn from(r: RangeFrom<T>) -> Self { Self::new(Bound::Included(r.start.into()), Bound::Unbounded) }
}

impl<T: Into<Value>> From<RangeTo<T>> for ValueRange {
  fn from(r: RangeTo<T>) -> Self { Self::new(Bound::Unbounded, Bound::Excluded(r.end.into())) }
}

impl<T: Into<Value>> From<RangeToInclusive<T>> for ValueRange {
  fn from(r: RangeToInclusive<T>) -> Self { Self::new(Bound::Unbounded, Bound::Included(r.end.into())) }
}

// ─── Matcher ─────────────────────────────────────────────────────────────────

/// A criterion value, classified by how it matches.
///
/// Built with `From`: scalars become [`Matcher::Eq`], vectors and arrays
/// become [`Matcher::In`], ranges become [`Matcher::Covers`]. A
/// [`Value::Seq`] converts to membership; use `Matcher::Eq` directly to
/// compare a sequence-valued attribute as a whole.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Matcher {
  Eq(Value),
  In(Vec<Value>),
  Covers(ValueRange),
}

impl Matcher {
  pub fn matches(&self, value: &Value) -> bool {
    match self {
      Self::Eq(expected) => expected == value,
      Self::In(options) => options.contains(value),
      Self::Covers(range) => range.covers(value),
    }
  }

  /// Whether the matcher may match more than one distinct value.
  pub fn is_rangeable(&self) -> bool { !matches!(self, Self::Eq(_)) }
}

impl fmt::Display for Matcher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Eq(v) => write!(f, "{v}"),
      Self::In(options) => {
        f.write_str("[")?;
        for (i, v) in options.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{v}")?;
        }
        f.write_str("]")
      }
      Self::Covers(range) => write!(f, "{range}"),
    }
  }
}

impl From<Value> for Matcher {
  fn from(value: Value) -> Self {
    match value {
      Value::Seq(items) => Self::In(items.to_vec()),
      other => Self::Eq(other),
    }
  }
}

macro_rules! scalar_matcher {
  ($($ty:ty),* $(,)?) => {
    $(
      impl From<$ty> for Matcher {
        fn from(value: $ty) -> Self { Self::Eq(value.into()) }
      }
    )*
  };
}

scalar_matcher!(bool, i64, i32, u32, f64, &str, String, std::sync::Arc<str>, NaiveDate);

impl<T: Into<Value>> From<Option<T>> for Matcher {
  fn from(value: Option<T>) -> Self { Self::Eq(value.map_or(Value::Null, Into::into)) }
}

impl<T: Into<Value>> From<Vec<T>> for Matcher {
  fn from(values: Vec<T>) -> Self { Self::In(values.into_iter().map(Into::into).collect()) }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Matcher {
  fn from(values: [T; N]) -> Self { Self::In(values.into_iter().map(Into::into).collect()) }
}

impl From<ValueRange> for Matcher {
  fn from(range: ValueRange) -> Self { Self::Covers(range) }
}

macro_rules! range_matcher {
  ($($range:ident),*) => {
    $(
      impl<T: Into<Value>> From<$range<T>> for Matcher {
        fn from(r: $range<T>) -> Self { Self::Covers(r.into()) }
      }
    )*
  };
}

range_matcher!(Range, RangeInclusive, RangeFrom, RangeTo, RangeToInclusive);
