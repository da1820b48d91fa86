//! Lazy, composable queries over one record store.
//!
//! A [`Scope`] is an immutable description of a query: positive filters,
//! negative filters, ordering keys, limit and offset. Every builder method
//! returns a new scope and leaves the receiver untouched. Results are
//! computed on first use and memoized until the store's generation changes.
//!
//! ```
//! use tundra_core::{MemorySource, RecordStore, RecordType, Value, scope::OrderKey};
//! # use std::sync::Arc;
//! # let row = |id: i64, name: &str, continent: &str| {
//! #   let mut m = tundra_core::Map::new();
//! #   m.insert(Arc::from("id"), Value::from(id));
//! #   m.insert(Arc::from("name"), Value::from(name));
//! #   m.insert(Arc::from("continent"), Value::from(continent));
//! #   m
//! # };
//! let store = RecordStore::new(
//!   RecordType::new("countries").index("continent"),
//!   MemorySource::new(vec![row(1, "Austria", "EU"), row(2, "France", "EU"), row(3, "Peru", "SA")]),
//! );
//!
//! let names = store
//!   .all()
//!   .filter([("continent", "EU")])
//!   .order([OrderKey::desc("name")])
//!   .pluck_column("name")?;
//! assert_eq!(names, [Value::from("France"), Value::from("Austria")]);
//! # Ok::<(), tundra_core::Error>(())
//! ```

use std::{
  borrow::Cow,
  cmp::Ordering,
  fmt,
  hash::{Hash, Hasher},
  ops::{Deref, Range},
  str::FromStr,
  sync::{Arc, OnceLock},
};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::trace;

use crate::{
  error::{Error, Result},
  matcher::Matcher,
  record::Record,
  store::{Generation, RecordStore, describe_criteria},
  value::Value,
};

/// One `attribute => matcher` pair.
pub type Criterion = (Arc<str>, Matcher);

// ─── Ordering keys ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
  #[default]
  Asc,
  Desc,
}

/// An attribute (or registered derived key) and a direction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
  pub key:       Arc<str>,
  pub direction: Direction,
}

impl OrderKey {
  pub fn asc(key: impl Into<Arc<str>>) -> Self {
    Self {
      key:       key.into(),
      direction: Direction::Asc,
    }
  }

  pub fn desc(key: impl Into<Arc<str>>) -> Self {
    Self {
      key:       key.into(),
      direction: Direction::Desc,
    }
  }
}

impl From<&str> for OrderKey {
  fn from(key: &str) -> Self { Self::asc(key) }
}

impl From<String> for OrderKey {
  fn from(key: String) -> Self { Self::asc(key) }
}

impl<K: Into<Arc<str>>> From<(K, Direction)> for OrderKey {
  fn from((key, direction): (K, Direction)) -> Self {
    Self {
      key: key.into(),
      direction,
    }
  }
}

/// Parses `name`, `name:asc` or `name:desc`.
impl FromStr for OrderKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.rsplit_once(':') {
      Some((key, "asc")) => Ok(Self::asc(key)),
      Some((key, "desc")) => Ok(Self::desc(key)),
      Some(_) => Err(Error::Unsupported("ordering direction must be `asc` or `desc`")),
      None => Ok(Self::asc(s)),
    }
  }
}

impl fmt::Display for OrderKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.direction {
      Direction::Asc => write!(f, "{}", self.key),
      Direction::Desc => write!(f, "{}:desc", self.key),
    }
  }
}

// ─── Query state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct QueryState {
  filters:    Vec<Criterion>,
  exclusions: Vec<Criterion>,
  order:      Vec<OrderKey>,
  limit:      Option<usize>,
  offset:     Option<usize>,
  canonical:  OnceLock<Canonical>,
}

/// Order-insensitive form of a query, used for equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Canonical {
  filters:    Vec<Criterion>,
  exclusions: Vec<Criterion>,
  order:      Vec<OrderKey>,
  limit:      Option<usize>,
  offset:     Option<usize>,
}

impl QueryState {
  fn canonical(&self) -> &Canonical {
    self.canonical.get_or_init(|| {
      let mut filters = self.filters.clone();
      filters.sort();
      filters.dedup();
      let mut exclusions = self.exclusions.clone();
      exclusions.sort();
      exclusions.dedup();
      let mut seen = FxHashSet::default();
      let order = self
        .order
        .iter()
        .filter(|k| seen.insert((*k).clone()))
        .cloned()
        .collect();
      Canonical {
        filters,
        exclusions,
        order,
        limit: self.limit,
        offset: self.offset,
      }
    })
  }

  /// Copy everything except the memoized canonical form.
  fn spawn(&self) -> Self {
    Self {
      filters:    self.filters.clone(),
      exclusions: self.exclusions.clone(),
      order:      self.order.clone(),
      limit:      self.limit,
      offset:     self.offset,
      canonical:  OnceLock::new(),
    }
  }
}

fn collect_criteria<I, K, M>(criteria: I) -> impl Iterator<Item = Criterion>
where
  I: IntoIterator<Item = (K, M)>,
  K: Into<Arc<str>>,
  M: Into<Matcher>,
{
  criteria.into_iter().map(|(k, m)| (k.into(), m.into()))
}

// ─── Result set ──────────────────────────────────────────────────────────────

/// A window over a memoized result list. Dereferences to `[Record]`.
#[derive(Debug, Clone)]
pub struct ResultSet {
  records: Arc<[Record]>,
  range:   Range<usize>,
}

impl ResultSet {
  pub fn into_vec(self) -> Vec<Record> { self.to_vec() }
}

impl Deref for ResultSet {
  type Target = [Record];

  fn deref(&self) -> &[Record] { &self.records[self.range.clone()] }
}

impl<'a> IntoIterator for &'a ResultSet {
  type IntoIter = std::slice::Iter<'a, Record>;
  type Item = &'a Record;

  fn into_iter(self) -> Self::IntoIter { self.iter() }
}

impl Serialize for ResultSet {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    (**self).serialize(serializer)
  }
}

/// The result of [`Scope::pluck`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Plucked {
  /// One value per record, for a single attribute.
  Column(Vec<Value>),
  /// One row of values per record, for several attributes.
  Rows(Vec<Vec<Value>>),
}

// ─── Scope ───────────────────────────────────────────────────────────────────

struct Memo {
  generation: u64,
  matching:   Arc<[Record]>,
}

/// A lazily evaluated query bound to one [`RecordStore`].
#[derive(Clone)]
pub struct Scope {
  store: Arc<RecordStore>,
  state: Arc<QueryState>,
  memo:  Arc<Mutex<Option<Memo>>>,
}

impl Scope {
  pub(crate) fn new(store: Arc<RecordStore>) -> Self {
    Self {
      store,
      state: Arc::new(QueryState::default()),
      memo: Arc::new(Mutex::new(None)),
    }
  }

  pub fn store(&self) -> &Arc<RecordStore> { &self.store }

  fn spawn(&self, f: impl FnOnce(&mut QueryState)) -> Self {
    let mut state = self.state.spawn();
    f(&mut state);
    Self {
      store: self.store.clone(),
      state: Arc::new(state),
      memo:  Arc::new(Mutex::new(None)),
    }
  }

  // ── Builders ──────────────────────────────────────────────────────────

  /// Keep records matching every criterion.
  pub fn filter<I, K, M>(&self, criteria: I) -> Self
  where
    I: IntoIterator<Item = (K, M)>,
    K: Into<Arc<str>>,
    M: Into<Matcher>,
  {
    self.spawn(|s| s.filters.extend(collect_criteria(criteria)))
  }

  /// Drop records matching any criterion.
  pub fn exclude<I, K, M>(&self, criteria: I) -> Self
  where
    I: IntoIterator<Item = (K, M)>,
    K: Into<Arc<str>>,
    M: Into<Matcher>,
  {
    self.spawn(|s| s.exclusions.extend(collect_criteria(criteria)))
  }

  pub fn order<I>(&self, keys: I) -> Self
  where
    I: IntoIterator,
    I::Item: Into<OrderKey>,
  {
    self.spawn(|s| s.order.extend(keys.into_iter().map(Into::into)))
  }

  pub fn limit(&self, n: usize) -> Self { self.spawn(|s| s.limit = Some(n)) }

  pub fn offset(&self, n: usize) -> Self { self.spawn(|s| s.offset = Some(n)) }

  pub fn filters(&self) -> &[Criterion] { &self.state.filters }

  pub fn exclusions(&self) -> &[Criterion] { &self.state.exclusions }

  pub fn ordering(&self) -> &[OrderKey] { &self.state.order }

  // ── Execution ─────────────────────────────────────────────────────────

  /// Selected and ordered records, before pagination.
  fn matching(&self) -> Result<Arc<[Record]>> {
    let generation = self.store.generation()?;
    if let Some(memo) = self.memo.lock().as_ref()
      && memo.generation == generation.number()
    {
      return Ok(memo.matching.clone());
    }

    let mut selected = self.select(&generation);
    self.sort(&mut selected);
    let matching: Arc<[Record]> = selected.into();

    *self.memo.lock() = Some(Memo {
      generation: generation.number(),
      matching:   matching.clone(),
    });
    Ok(matching)
  }

  fn select(&self, generation: &Generation) -> Vec<Record> {
    let state = &self.state;
    if state.filters.is_empty() && state.exclusions.is_empty() {
      return generation.records().to_vec();
    }

    let (indexed, unindexed): (Vec<&Criterion>, Vec<&Criterion>) = state
      .filters
      .iter()
      .partition(|(attribute, _)| generation.index(attribute).is_some());

    let candidates: Cow<'_, [Record]> = match indexed.split_first() {
      None => {
        trace!(record_type = %self.store.name(), "full scan");
        Cow::Borrowed(&generation.records()[..])
      }
      Some((first, rest)) => {
        trace!(
          record_type = %self.store.name(),
          indexed = indexed.len(),
          "index intersection"
        );
        let mut seen = FxHashSet::default();
        let mut working: Vec<Record> = query_index(generation, first)
          .iter()
          .filter(|r| seen.insert(r.addr()))
          .cloned()
          .collect();
        for criterion in rest {
          let hits: FxHashSet<usize> = query_index(generation, criterion)
            .iter()
            .map(Record::addr)
            .collect();
          working.retain(|r| hits.contains(&r.addr()));
        }
        Cow::Owned(working)
      }
    };

    candidates
      .iter()
      .filter(|r| {
        unindexed.iter().all(|(a, m)| m.matches(r.value(a)))
          && !state.exclusions.iter().any(|(a, m)| m.matches(r.value(a)))
      })
      .cloned()
      .collect()
  }

  fn sort(&self, records: &mut Vec<Record>) {
    let order = &self.state.order;
    if order.is_empty() {
      return;
    }
    let definition = self.store.definition();
    let mut keyed: Vec<(Vec<Value>, Record)> = records
      .drain(..)
      .map(|r| (order.iter().map(|k| definition.read(&r, &k.key)).collect(), r))
      .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(order, a, b));
    records.extend(keyed.into_iter().map(|(_, r)| r));
  }

  fn page_range(&self, len: usize) -> Range<usize> {
    let start = self.state.offset.unwrap_or(0).min(len);
    let end = match self.state.limit {
      Some(n) => start.saturating_add(n).min(len),
      None => len,
    };
    start..end
  }

  // ── Results ───────────────────────────────────────────────────────────

  /// The paginated results.
  pub fn records(&self) -> Result<ResultSet> {
    let records = self.matching()?;
    let range = self.page_range(records.len());
    Ok(ResultSet { records, range })
  }

  pub fn to_vec(&self) -> Result<Vec<Record>> { Ok(self.records()?.to_vec()) }

  pub fn first(&self) -> Result<Option<Record>> { Ok(self.records()?.first().cloned()) }

  pub fn last(&self) -> Result<Option<Record>> { Ok(self.records()?.last().cloned()) }

  pub fn first_required(&self) -> Result<Record> {
    self.first()?.ok_or_else(|| self.not_found())
  }

  pub fn last_required(&self) -> Result<Record> { self.last()?.ok_or_else(|| self.not_found()) }

  pub fn count(&self) -> Result<usize> { Ok(self.records()?.len()) }

  pub fn exists(&self) -> Result<bool> { Ok(!self.records()?.is_empty()) }

  /// The record with primary key `id` among the selected records.
  ///
  /// Limit and offset do not apply.
  pub fn find(&self, id: impl Into<Value>) -> Result<Record> {
    let id = id.into();
    if id.is_null() {
      return Err(Error::not_found(self.store.name(), "cannot look up a record without an ID"));
    }
    self.lookup_id(&id)?.ok_or_else(|| {
      Error::not_found(
        self.store.name(),
        format!("no record with {}={id}", self.store.primary_key()),
      )
    })
  }

  pub fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Record>> {
    let id = id.into();
    if id.is_null() {
      return Ok(None);
    }
    self.lookup_id(&id)
  }

  fn lookup_id(&self, id: &Value) -> Result<Option<Record>> {
    let primary_key = self.store.primary_key();
    if self.state.filters.is_empty() && self.state.exclusions.is_empty() {
      let generation = self.store.generation()?;
      if let Some(index) = generation.index(primary_key) {
        return Ok(index.lookup(id).first().cloned());
      }
    }
    Ok(
      self
        .matching()?
        .iter()
        .find(|r| r.value(primary_key) == id)
        .cloned(),
    )
  }

  pub fn find_by<I, K, M>(&self, criteria: I) -> Result<Option<Record>>
  where
    I: IntoIterator<Item = (K, M)>,
    K: Into<Arc<str>>,
    M: Into<Matcher>,
  {
    self.filter(criteria).first()
  }

  pub fn find_by_required<I, K, M>(&self, criteria: I) -> Result<Record>
  where
    I: IntoIterator<Item = (K, M)>,
    K: Into<Arc<str>>,
    M: Into<Matcher>,
  {
    self.filter(criteria).first_required()
  }

  // ── Projections ───────────────────────────────────────────────────────

  /// One attribute yields a column; several yield rows.
  pub fn pluck(&self, keys: &[&str]) -> Result<Plucked> {
    match keys {
      [] => Err(Error::Unsupported("pluck needs at least one attribute")),
      [key] => Ok(Plucked::Column(self.pluck_column(key)?)),
      keys => {
        let definition = self.store.definition();
        let rows = self
          .records()?
          .iter()
          .map(|r| keys.iter().map(|k| definition.read(r, k)).collect())
          .collect();
        Ok(Plucked::Rows(rows))
      }
    }
  }

  pub fn pluck_column(&self, key: &str) -> Result<Vec<Value>> {
    let definition = self.store.definition();
    Ok(self.records()?.iter().map(|r| definition.read(r, key)).collect())
  }

  pub fn ids(&self) -> Result<Vec<Value>> { self.pluck_column(self.store.primary_key()) }

  // ── Aggregates ────────────────────────────────────────────────────────

  /// Sum of the non-null values: `Int` when every one is an integer,
  /// otherwise `Float`.
  pub fn sum(&self, key: &str) -> Result<Value> {
    let mut int: i64 = 0;
    let mut float: f64 = 0.0;
    let mut integral = true;
    for value in self.pluck_column(key)? {
      match value {
        Value::Null => {}
        Value::Int(i) if integral => match int.checked_add(i) {
          Some(next) => int = next,
          None => {
            integral = false;
            float = int as f64 + i as f64;
          }
        },
        Value::Int(i) => float += i as f64,
        Value::Float(f) => {
          if integral {
            integral = false;
            float = int as f64;
          }
          float += f;
        }
        other => {
          return Err(Error::NotNumeric {
            attribute: Arc::from(key),
            value:     other,
          });
        }
      }
    }
    Ok(if integral { Value::Int(int) } else { Value::Float(float) })
  }

  /// `sum / count`, where count includes records with a null value.
  pub fn average(&self, key: &str) -> Result<f64> {
    let count = self.count()?;
    if count == 0 {
      return Ok(0.0);
    }
    let total = self.sum(key)?.as_f64().unwrap_or(0.0);
    Ok(total / count as f64)
  }

  pub fn minimum(&self, key: &str) -> Result<Option<Value>> {
    Ok(self.pluck_column(key)?.into_iter().filter(|v| !v.is_null()).min())
  }

  pub fn maximum(&self, key: &str) -> Result<Option<Value>> {
    Ok(self.pluck_column(key)?.into_iter().filter(|v| !v.is_null()).max())
  }

  fn not_found(&self) -> Error {
    let mut detail = String::from("no record found");
    if !self.state.filters.is_empty() {
      detail.push_str(" matching ");
      detail.push_str(&describe_criteria(&self.state.filters));
    }
    Error::not_found(self.store.name(), detail)
  }
}

fn query_index<'g>(generation: &'g Generation, (attribute, matcher): &Criterion) -> Cow<'g, [Record]> {
  match generation.index(attribute) {
    Some(index) => index.query(matcher),
    None => Cow::Borrowed(&[]),
  }
}

fn compare_keys(order: &[OrderKey], a: &[Value], b: &[Value]) -> Ordering {
  for ((key, x), y) in order.iter().zip(a).zip(b) {
    let ord = match key.direction {
      Direction::Asc => x.cmp(y),
      Direction::Desc => y.cmp(x),
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
  Ordering::Equal
}

impl PartialEq for Scope {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.store, &other.store) && self.state.canonical() == other.state.canonical()
  }
}

impl Eq for Scope {}

impl Hash for Scope {
  fn hash<H: Hasher>(&self, state: &mut H) {
    (Arc::as_ptr(&self.store) as usize).hash(state);
    self.state.canonical().hash(state);
  }
}

impl fmt::Debug for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scope")
      .field("record_type", self.store.name())
      .field("filters", &self.state.filters)
      .field("exclusions", &self.state.exclusions)
      .field("order", &self.state.order)
      .field("limit", &self.state.limit)
      .field("offset", &self.state.offset)
      .finish()
  }
}
