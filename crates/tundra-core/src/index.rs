//! Per-attribute lookup tables built once per load.

use std::{borrow::Cow, ops::Bound, sync::Arc};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
  error::{Error, Result},
  matcher::{Matcher, RangeKind, ValueRange},
  record::Record,
  value::Value,
};

/// Records grouped by the value of one attribute.
///
/// Records that do not carry the attribute are grouped under
/// [`Value::Null`]. Each group keeps dataset order. A unique index holds at
/// most one record per key.
#[derive(Debug)]
pub struct Index {
  attribute: Arc<str>,
  unique:    bool,
  buckets:   FxHashMap<Value, Box<[Record]>>,
  /// Distinct keys in ascending order, for range lookups.
  keys:      Box<[Value]>,
}

impl Index {
  pub fn build(record_type: &Arc<str>, records: &[Record], attribute: Arc<str>, unique: bool) -> Result<Self> {
    let mut groups: FxHashMap<Value, Vec<Record>> = FxHashMap::default();
    for record in records {
      groups.entry(record.value(&attribute).clone()).or_default().push(record.clone());
    }

    if unique && groups.len() != records.len() {
      return Err(Error::NotUnique {
        record_type: record_type.clone(),
        attribute,
      });
    }

    let mut keys: Vec<Value> = groups.keys().cloned().collect();
    keys.sort();

    debug!(
      record_type = %record_type,
      attribute = %attribute,
      unique,
      keys = keys.len(),
      "built index"
    );

    Ok(Self {
      attribute,
      unique,
      buckets: groups.into_iter().map(|(k, v)| (k, v.into_boxed_slice())).collect(),
      keys: keys.into_boxed_slice(),
    })
  }

  pub fn attribute(&self) -> &Arc<str> { &self.attribute }

  pub fn is_unique(&self) -> bool { self.unique }

  /// Number of distinct keys.
  pub fn len(&self) -> usize { self.keys.len() }

  pub fn is_empty(&self) -> bool { self.keys.is_empty() }

  /// Distinct keys in ascending order.
  pub fn keys(&self) -> &[Value] { &self.keys }

  /// Records whose attribute equals `value`; empty when there are none.
  pub fn lookup(&self, value: &Value) -> &[Record] {
    self.buckets.get(value).map(|group| &**group).unwrap_or(&[])
  }

  /// Records for each value in turn, in input order. Misses are skipped.
  pub fn lookup_many<'a, I>(&self, values: I) -> Vec<Record>
  where
    I: IntoIterator<Item = &'a Value>,
  {
    values
      .into_iter()
      .flat_map(|v| self.lookup(v).iter().cloned())
      .collect()
  }

  /// Records whose key lies within `range`, in ascending key order.
  ///
  /// Only keys of the range's own kind are considered; see
  /// [`ValueRange::covers`].
  pub fn lookup_range(&self, range: &ValueRange) -> Vec<Record> {
    let keys = match range.kind() {
      RangeKind::Any => &self.keys[..],
      RangeKind::Only(rank) => {
        let lo = self.keys.partition_point(|k| k.rank() < rank);
        let hi = self.keys.partition_point(|k| k.rank() <= rank);
        &self.keys[lo..hi]
      }
      RangeKind::Nothing => return Vec::new(),
    };

    let from = match &range.start {
      Bound::Unbounded => 0,
      Bound::Included(v) => keys.partition_point(|k| k < v),
      Bound::Excluded(v) => keys.partition_point(|k| k <= v),
    };
    let to = match &range.end {
      Bound::Unbounded => keys.len(),
      Bound::Included(v) => keys.partition_point(|k| k <= v),
      Bound::Excluded(v) => keys.partition_point(|k| k < v),
    };
    if from >= to {
      return Vec::new();
    }
    self.lookup_many(&keys[from..to])
  }

  /// Dispatch on the matcher kind.
  pub fn query(&self, matcher: &Matcher) -> Cow<'_, [Record]> {
    match matcher {
      Matcher::Eq(value) => Cow::Borrowed(self.lookup(value)),
      Matcher::In(values) => Cow::Owned(self.lookup_many(values)),
      Matcher::Covers(range) => Cow::Owned(self.lookup_range(range)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::Map;

  fn records(rows: &[&[(&str, Value)]]) -> Vec<Record> {
    rows
      .iter()
      .map(|attrs| {
        let map: Map = attrs
          .iter()
          .map(|(k, v)| (Arc::<str>::from(*k), v.clone()))
          .collect();
        Record::new("prices".into(), "id".into(), Arc::new(map))
      })
      .collect()
  }

  fn ids(records: &[Record]) -> Vec<i64> {
    records.iter().filter_map(|r| r.id().as_i64()).collect()
  }

  fn prices() -> Vec<Record> {
    records(&[
      &[("id", Value::Int(1)), ("currency", Value::from("EUR")), ("amount", Value::Int(10))],
      &[("id", Value::Int(2)), ("currency", Value::from("USD")), ("amount", Value::Int(25))],
      &[("id", Value::Int(3)), ("currency", Value::from("EUR")), ("amount", Value::Int(15))],
      &[("id", Value::Int(4)), ("amount", Value::Int(40))],
    ])
  }

  #[test]
  fn non_unique_groups_keep_dataset_order() {
    let idx = Index::build(&"prices".into(), &prices(), "currency".into(), false).unwrap();
    assert_eq!(ids(idx.lookup(&Value::from("EUR"))), vec![1, 3]);
    assert_eq!(ids(idx.lookup(&Value::from("USD"))), vec![2]);
    assert!(idx.lookup(&Value::from("GBP")).is_empty());
  }

  #[test]
  fn missing_attribute_is_indexed_under_null() {
    let idx = Index::build(&"prices".into(), &prices(), "currency".into(), false).unwrap();
    assert_eq!(ids(idx.lookup(&Value::Null)), vec![4]);
  }

  #[test]
  fn unique_index_rejects_duplicates() {
    let err = Index::build(&"prices".into(), &prices(), "currency".into(), true).unwrap_err();
    assert!(matches!(err, Error::NotUnique { ref attribute, .. } if &**attribute == "currency"));
  }

  #[test]
  fn unique_lookup_many_keeps_input_order_and_skips_misses() {
    let idx = Index::build(&"prices".into(), &prices(), "id".into(), true).unwrap();
    let found = idx.lookup_many(&[Value::Int(3), Value::Int(42), Value::Int(1)]);
    assert_eq!(ids(&found), vec![3, 1]);
  }

  #[test]
  fn range_lookup_walks_keys_in_ascending_order() {
    let idx = Index::build(&"prices".into(), &prices(), "amount".into(), true).unwrap();
    assert_eq!(ids(&idx.lookup_range(&(10..=25).into())), vec![1, 3, 2]);
    assert_eq!(ids(&idx.lookup_range(&(10..25).into())), vec![1, 3]);
    assert_eq!(ids(&idx.lookup_range(&(26..).into())), vec![4]);
    assert!(idx.lookup_range(&(50..60).into()).is_empty());
    assert!(idx.lookup_range(&(30..20).into()).is_empty());
  }

  #[test]
  fn query_dispatches_on_matcher_kind() {
    let idx = Index::build(&"prices".into(), &prices(), "amount".into(), true).unwrap();
    assert_eq!(ids(&idx.query(&Matcher::from(25))), vec![2]);
    assert_eq!(ids(&idx.query(&Matcher::from(vec![40, 10]))), vec![4, 1]);
    assert_eq!(ids(&idx.query(&Matcher::from(..15))), vec![1]);
  }

  #[test]
  fn range_lookup_skips_keys_of_other_kinds() {
    let rows = records(&[
      &[("id", Value::Int(1)), ("pop", Value::Int(10))],
      &[("id", Value::Int(2))],
      &[("id", Value::Int(3)), ("pop", Value::from("unknown"))],
      &[("id", Value::Int(4)), ("pop", Value::Float(12.5))],
    ]);
    let idx = Index::build(&"towns".into(), &rows, "pop".into(), false).unwrap();
    assert_eq!(ids(&idx.query(&Matcher::from(..15))), vec![1, 4]);
    assert_eq!(ids(&idx.query(&Matcher::from(5..))), vec![1, 4]);
    assert_eq!(ids(&idx.query(&Matcher::from(..=12.5))), vec![1, 4]);
    assert_eq!(ids(&idx.query(&Matcher::from("a"..))), vec![3]);
    assert!(idx.query(&Matcher::from(20..30)).is_empty());
    let everything = ValueRange::new(Bound::Unbounded, Bound::Unbounded);
    assert_eq!(ids(&idx.lookup_range(&everything)), vec![2, 1, 4, 3]);
  }

  #[test]
  fn numeric_keys_unify_ints_and_floats() {
    let idx = Index::build(&"prices".into(), &prices(), "amount".into(), true).unwrap();
    assert_eq!(ids(idx.lookup(&Value::Float(25.0))), vec![2]);
  }
}
