//! Record types and the stores that load and cache them.
//!
//! A [`RecordType`] is the static description of a dataset: its name, primary
//! key, default attributes, declared indexes and derived keys. A
//! [`RecordStore`] binds a record type to a [`Source`] and owns the current
//! [`Generation`]: the immutable result of the most recent successful load.
//!
//! Readers never block on a load. They observe either the previous generation
//! or the new one, swapped in atomically once every index has been built.

use std::{fmt, sync::Arc};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::{
  error::{Error, Result},
  index::Index,
  intern::Interner,
  matcher::Matcher,
  record::Record,
  scope::Scope,
  source::{ChangeMarker, Source, SourceError},
  value::{Map, Value},
};

/// A named record-level computation usable as a sort or pluck key.
pub type DerivedFn = dyn Fn(&Record) -> Value + Send + Sync;

// ─── Record type ─────────────────────────────────────────────────────────────

/// A declared index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
  pub attribute: Arc<str>,
  pub unique:    bool,
}

/// Static description of one dataset.
///
/// ```
/// use tundra_core::RecordType;
///
/// let countries = RecordType::new("countries")
///   .default_attribute("contemporary", true)
///   .unique_index("name")
///   .index("continent");
/// assert_eq!(&**countries.primary_key_name(), "id");
/// ```
#[derive(Clone)]
pub struct RecordType {
  name:               Arc<str>,
  primary_key:        Arc<str>,
  auto_reload:        bool,
  default_attributes: Map,
  indexes:            Vec<IndexDef>,
  derived:            FxHashMap<Arc<str>, Arc<DerivedFn>>,
}

impl RecordType {
  pub fn new(name: impl Into<Arc<str>>) -> Self {
    Self {
      name:               name.into(),
      primary_key:        Arc::from("id"),
      auto_reload:        false,
      default_attributes: Map::new(),
      indexes:            Vec::new(),
      derived:            FxHashMap::default(),
    }
  }

  pub fn primary_key(mut self, attribute: impl Into<Arc<str>>) -> Self {
    self.primary_key = attribute.into();
    self
  }

  pub fn auto_reload(mut self, enabled: bool) -> Self {
    self.auto_reload = enabled;
    self
  }

  /// Fill `attribute` with `value` on every record that does not carry it.
  pub fn default_attribute(mut self, attribute: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
    self.default_attributes.insert(attribute.into(), value.into());
    self
  }

  pub fn index(self, attribute: impl Into<Arc<str>>) -> Self { self.declare_index(attribute.into(), false) }

  pub fn unique_index(self, attribute: impl Into<Arc<str>>) -> Self {
    self.declare_index(attribute.into(), true)
  }

  /// Register a named computation for `order` and `pluck`.
  pub fn derived<F>(mut self, name: impl Into<Arc<str>>, f: F) -> Self
  where
    F: Fn(&Record) -> Value + Send + Sync + 'static,
  {
    self.derived.insert(name.into(), Arc::new(f));
    self
  }

  fn declare_index(mut self, attribute: Arc<str>, unique: bool) -> Self {
    match self.indexes.iter_mut().find(|d| d.attribute == attribute) {
      Some(existing) => existing.unique = unique,
      None => self.indexes.push(IndexDef { attribute, unique }),
    }
    self
  }

  pub fn name(&self) -> &Arc<str> { &self.name }

  pub fn primary_key_name(&self) -> &Arc<str> { &self.primary_key }

  pub fn is_auto_reload(&self) -> bool { self.auto_reload }

  pub fn default_attributes(&self) -> &Map { &self.default_attributes }

  pub fn indexes(&self) -> &[IndexDef] { &self.indexes }

  pub fn has_derived(&self, name: &str) -> bool { self.derived.contains_key(name) }

  /// Read `key` from `record`: a registered derived key wins over an
  /// attribute of the same name; unknown names read `Null`.
  pub fn read(&self, record: &Record, key: &str) -> Value {
    match self.derived.get(key) {
      Some(f) => f(record),
      None => record.value(key).clone(),
    }
  }
}

impl fmt::Debug for RecordType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut derived: Vec<&Arc<str>> = self.derived.keys().collect();
    derived.sort();
    f.debug_struct("RecordType")
      .field("name", &self.name)
      .field("primary_key", &self.primary_key)
      .field("auto_reload", &self.auto_reload)
      .field("default_attributes", &self.default_attributes)
      .field("indexes", &self.indexes)
      .field("derived", &derived)
      .finish()
  }
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// The immutable result of one successful load.
#[derive(Debug)]
pub struct Generation {
  number:     u64,
  records:    Arc<[Record]>,
  indexes:    FxHashMap<Arc<str>, Index>,
  attributes: IndexSet<Arc<str>>,
  marker:     Option<ChangeMarker>,
  loaded_at:  DateTime<Utc>,
}

impl Generation {
  /// Monotonically increasing per store, starting at 1.
  pub fn number(&self) -> u64 { self.number }

  /// Every record, in source order.
  pub fn records(&self) -> &Arc<[Record]> { &self.records }

  pub fn index(&self, attribute: &str) -> Option<&Index> { self.indexes.get(attribute) }

  /// Attribute names seen across all records, in first-seen order.
  pub fn attributes(&self) -> &IndexSet<Arc<str>> { &self.attributes }

  pub fn marker(&self) -> Option<&ChangeMarker> { self.marker.as_ref() }

  pub fn loaded_at(&self) -> DateTime<Utc> { self.loaded_at }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// One record type bound to its source, with the current generation cached.
pub struct RecordStore {
  definition: RecordType,
  source:     RwLock<Box<dyn Source>>,
  /// Serializes loads and source swaps.
  loading:    Mutex<()>,
  current:    ArcSwapOption<Generation>,
}

impl RecordStore {
  pub fn new(definition: RecordType, source: impl Source + 'static) -> Arc<Self> {
    Self::with_boxed_source(definition, Box::new(source))
  }

  pub fn with_boxed_source(definition: RecordType, source: Box<dyn Source>) -> Arc<Self> {
    Arc::new(Self {
      definition,
      source: RwLock::new(source),
      loading: Mutex::new(()),
      current: ArcSwapOption::empty(),
    })
  }

  pub fn definition(&self) -> &RecordType { &self.definition }

  pub fn name(&self) -> &Arc<str> { self.definition.name() }

  pub fn primary_key(&self) -> &Arc<str> { self.definition.primary_key_name() }

  pub fn describe_source(&self) -> String { self.source.read().describe() }

  pub fn source_exists(&self) -> bool { self.source.read().exists() }

  /// The current generation, loading it first if needed.
  ///
  /// Loads when nothing has been loaded yet, when `force` is set, or when
  /// auto-reload is on and the source's change marker moved.
  pub fn load(&self, force: bool) -> Result<Arc<Generation>> {
    if !force && let Some(current) = self.current.load_full() {
      if !self.definition.auto_reload || self.probe()? == current.marker {
        return Ok(current);
      }
    }

    let _guard = self.loading.lock();
    self.load_locked(force)
  }

  /// Force a reload.
  pub fn reload(&self) -> Result<Arc<Generation>> { self.load(true) }

  /// Alias for `load(false)`.
  pub fn generation(&self) -> Result<Arc<Generation>> { self.load(false) }

  /// Whether a generation is currently cached.
  pub fn is_loaded(&self) -> bool { self.current.load().is_some() }

  pub fn records(&self) -> Result<Arc<[Record]>> { Ok(self.generation()?.records.clone()) }

  /// Discovered attribute names, in first-seen order.
  pub fn attributes(&self) -> Result<Vec<Arc<str>>> {
    Ok(self.generation()?.attributes.iter().cloned().collect())
  }

  /// Whether `name` is a discovered attribute or a registered derived key.
  pub fn has_attribute(&self, name: &str) -> Result<bool> {
    Ok(self.definition.has_derived(name) || self.generation()?.attributes.contains(name))
  }

  /// Swap in a new source and force a reload from it.
  ///
  /// On failure the previous source is put back, the previous generation
  /// stays current, and the error is returned. On success the previous
  /// source is handed back to the caller.
  pub fn replace_source(&self, source: Box<dyn Source>) -> Result<Box<dyn Source>> {
    let _guard = self.loading.lock();
    let previous = std::mem::replace(&mut *self.source.write(), source);
    match self.load_locked(true) {
      Ok(_) => Ok(previous),
      Err(err) => {
        *self.source.write() = previous;
        Err(err)
      }
    }
  }

  /// Swap in a new source without loading from it.
  pub fn set_source(&self, source: Box<dyn Source>) -> Box<dyn Source> {
    let _guard = self.loading.lock();
    std::mem::replace(&mut *self.source.write(), source)
  }

  // ── Queries ───────────────────────────────────────────────────────────

  /// The unrestricted scope over every record.
  pub fn all(self: &Arc<Self>) -> Scope { Scope::new(self.clone()) }

  /// The record whose primary key equals `id`.
  pub fn find(self: &Arc<Self>, id: impl Into<Value>) -> Result<Record> { self.all().find(id) }

  pub fn find_by_id(self: &Arc<Self>, id: impl Into<Value>) -> Result<Option<Record>> {
    self.all().find_by_id(id)
  }

  /// The first record matching every criterion.
  ///
  /// A single criterion on an indexed attribute is answered straight from
  /// the index.
  pub fn find_by<I, K, M>(self: &Arc<Self>, criteria: I) -> Result<Option<Record>>
  where
    I: IntoIterator<Item = (K, M)>,
    K: Into<Arc<str>>,
    M: Into<Matcher>,
  {
    let criteria: Vec<(Arc<str>, Matcher)> = criteria
      .into_iter()
      .map(|(k, m)| (k.into(), m.into()))
      .collect();

    if let [(attribute, matcher)] = criteria.as_slice() {
      let generation = self.generation()?;
      if let Some(index) = generation.index(attribute) {
        return Ok(index.query(matcher).first().cloned());
      }
    }
    self.all().filter(criteria).first()
  }

  pub fn find_by_required<I, K, M>(self: &Arc<Self>, criteria: I) -> Result<Record>
  where
    I: IntoIterator<Item = (K, M)>,
    K: Into<Arc<str>>,
    M: Into<Matcher>,
  {
    let criteria: Vec<(Arc<str>, Matcher)> = criteria
      .into_iter()
      .map(|(k, m)| (k.into(), m.into()))
      .collect();
    let detail = describe_criteria(&criteria);
    self
      .find_by(criteria)?
      .ok_or_else(|| Error::not_found(self.name(), format!("no record matching {detail}")))
  }

  // ── Loading ───────────────────────────────────────────────────────────

  fn probe(&self) -> Result<Option<ChangeMarker>> {
    self
      .source
      .read()
      .change_marker()
      .map_err(|e| self.load_error(e))
  }

  /// Caller holds `self.loading`.
  fn load_locked(&self, force: bool) -> Result<Arc<Generation>> {
    let current = self.current.load_full();
    let marker = if self.definition.auto_reload { self.probe()? } else { None };

    // Another caller may have finished a load while we waited for the lock.
    if !force
      && let Some(current) = &current
      && (!self.definition.auto_reload || current.marker == marker)
    {
      return Ok(current.clone());
    }

    let number = current.as_ref().map_or(1, |g| g.number + 1);
    match self.build(number, marker) {
      Ok(generation) => {
        let generation = Arc::new(generation);
        self.current.store(Some(generation.clone()));
        Ok(generation)
      }
      Err(err) => {
        if let Some(current) = &current {
          warn!(
            record_type = %self.name(),
            generation = current.number,
            error = %err,
            "reload failed; keeping previous generation"
          );
        }
        Err(err)
      }
    }
  }

  fn build(&self, number: u64, marker: Option<ChangeMarker>) -> Result<Generation> {
    let name = self.definition.name.clone();
    let source = self.source.read();
    let raw = source.load().map_err(|e| self.load_error(e))?;

    let mut interner = Interner::new();
    let mut attributes: IndexSet<Arc<str>> = IndexSet::new();
    let primary_key = interner.intern_str(self.definition.primary_key.clone());

    let records: Arc<[Record]> = raw
      .into_iter()
      .map(|mut attrs| {
        for (key, value) in &self.definition.default_attributes {
          attrs.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let attrs = interner.intern_attributes(attrs);
        for key in attrs.keys() {
          if !attributes.contains(key) {
            attributes.insert(key.clone());
          }
        }
        Record::new(name.clone(), primary_key.clone(), attrs)
      })
      .collect();

    debug!(record_type = %name, stats = ?interner.stats(), "interned records");

    let indexes = self
      .definition
      .indexes
      .iter()
      .map(|def| {
        Index::build(&name, &records, def.attribute.clone(), def.unique)
          .map(|index| (def.attribute.clone(), index))
      })
      .collect::<Result<FxHashMap<_, _>>>()?;

    info!(
      record_type = %name,
      source = %source.describe(),
      records = records.len(),
      generation = number,
      "loaded records"
    );

    Ok(Generation {
      number,
      records,
      indexes,
      attributes,
      marker,
      loaded_at: Utc::now(),
    })
  }

  fn load_error(&self, source: SourceError) -> Error {
    match source {
      SourceError::Unconfigured(message) => Error::Configuration {
        record_type: self.name().clone(),
        message,
      },
      source => Error::Load {
        record_type: self.name().clone(),
        source,
      },
    }
  }
}

impl fmt::Debug for RecordStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecordStore")
      .field("definition", &self.definition)
      .field("source", &self.describe_source())
      .field("generation", &self.current.load_full().map(|g| g.number))
      .finish()
  }
}

pub(crate) fn describe_criteria(criteria: &[(Arc<str>, Matcher)]) -> String {
  criteria
    .iter()
    .map(|(attribute, matcher)| format!("{attribute}={matcher}"))
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::MemorySource;

  fn row(attrs: &[(&str, Value)]) -> Map {
    attrs
      .iter()
      .map(|(k, v)| (Arc::<str>::from(*k), v.clone()))
      .collect()
  }

  fn countries() -> Vec<Map> {
    vec![
      row(&[("id", Value::Int(1)), ("name", Value::from("Austria")), ("continent", Value::from("EU"))]),
      row(&[("id", Value::Int(2)), ("name", Value::from("France")), ("continent", Value::from("EU"))]),
      row(&[("id", Value::Int(3)), ("name", Value::from("Peru")), ("continent", Value::from("SA"))]),
    ]
  }

  #[test]
  fn loads_lazily_and_caches() {
    let store = RecordStore::new(RecordType::new("countries"), MemorySource::new(countries()));
    assert!(!store.is_loaded());
    let first = store.generation().unwrap();
    let second = store.generation().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.number(), 1);
  }

  #[test]
  fn forced_reload_bumps_generation() {
    let store = RecordStore::new(RecordType::new("countries"), MemorySource::new(countries()));
    let first = store.generation().unwrap();
    let second = store.reload().unwrap();
    assert_eq!(second.number(), first.number() + 1);
    assert!(!first.records()[0].ptr_eq(&second.records()[0]));
  }

  #[test]
  fn defaults_fill_only_absent_keys() {
    let mut rows = countries();
    rows[0].insert("contemporary".into(), Value::Bool(false));
    let store = RecordStore::new(
      RecordType::new("countries").default_attribute("contemporary", true),
      MemorySource::new(rows),
    );
    let records = store.records().unwrap();
    assert_eq!(records[0].get_bool("contemporary"), Some(false));
    assert_eq!(records[1].get_bool("contemporary"), Some(true));
  }

  #[test]
  fn attributes_are_discovered_in_first_seen_order() {
    let mut rows = countries();
    rows[2].insert("king".into(), Value::from("none"));
    let store = RecordStore::new(RecordType::new("countries"), MemorySource::new(rows));
    let names: Vec<String> = store.attributes().unwrap().iter().map(|a| a.to_string()).collect();
    // Maps iterate in key order, so first-seen order within a record is sorted.
    assert_eq!(names, ["continent", "id", "name", "king"]);
  }

  #[test]
  fn duplicate_unique_key_fails_the_load() {
    let store = RecordStore::new(
      RecordType::new("countries").unique_index("continent"),
      MemorySource::new(countries()),
    );
    assert!(matches!(store.generation(), Err(Error::NotUnique { .. })));
  }

  #[test]
  fn failed_reload_keeps_previous_generation() {
    let source = Arc::new(MemorySource::new(countries()));
    let store = RecordStore::new(RecordType::new("countries").unique_index("name"), source.clone());
    let first = store.generation().unwrap();

    let mut rows = countries();
    rows[1].insert("name".into(), Value::from("Austria"));
    source.replace(rows);

    assert!(store.reload().is_err());
    assert!(Arc::ptr_eq(&first, &store.generation().unwrap()));
  }

  #[test]
  fn unconfigured_source_is_a_configuration_error() {
    struct Nowhere;
    impl Source for Nowhere {
      fn load(&self) -> std::result::Result<Vec<Map>, SourceError> {
        Err(SourceError::Unconfigured("no base path".into()))
      }

      fn describe(&self) -> String { "nowhere".into() }
    }

    let store = RecordStore::new(RecordType::new("countries"), Nowhere);
    assert!(matches!(store.generation(), Err(Error::Configuration { .. })));
  }

  #[test]
  fn find_by_uses_the_index_for_one_criterion() {
    let store = RecordStore::new(
      RecordType::new("countries").unique_index("name"),
      MemorySource::new(countries()),
    );
    let france = store.find_by([("name", "France")]).unwrap().unwrap();
    assert_eq!(france.id(), &Value::Int(2));
    assert!(store.find_by([("name", "Atlantis")]).unwrap().is_none());
  }

  #[test]
  fn find_by_required_reports_the_criteria() {
    let store = RecordStore::new(RecordType::new("countries"), MemorySource::new(countries()));
    let err = store.find_by_required([("name", "Atlantis")]).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("name=\"Atlantis\""));
  }

  #[test]
  fn replace_source_restores_on_failure() {
    let store = RecordStore::new(
      RecordType::new("countries").unique_index("continent"),
      MemorySource::new(vec![countries().remove(0)]),
    );
    let first = store.generation().unwrap();
    assert!(store.replace_source(Box::new(MemorySource::new(countries()))).is_err());
    assert!(Arc::ptr_eq(&first, &store.generation().unwrap()));
    assert_eq!(store.reload().unwrap().records().len(), 1);
  }
}
