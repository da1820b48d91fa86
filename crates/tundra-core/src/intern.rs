//! Load-scoped deduplication of attribute values.
//!
//! An [`Interner`] lives for exactly one load cycle. Every raw value that goes
//! through it comes out as the canonical instance for its structure: equal
//! strings share one `Arc<str>`, equal sequences and mappings share one
//! allocation.
//!
//! A container allocation that has already been interned during this load
//! (typically one value shared by many records, like a YAML anchor) is not
//! walked again; the canonical result recorded for it is returned directly.

use std::{
  hash::{Hash, Hasher},
  sync::Arc,
};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::value::{Map, Value, hash_map_identical, hash_seq_identical, maps_identical, seqs_identical};

/// Counters reported after a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternStats {
  /// Distinct strings in the pool.
  pub strings:        usize,
  /// Distinct sequences and mappings in the pool.
  pub containers:     usize,
  /// Strings that were replaced by an existing pooled instance.
  pub string_hits:    usize,
  /// Containers that were replaced by an existing pooled instance.
  pub container_hits: usize,
  /// Containers returned without being walked.
  pub shortcuts:      usize,
}

#[derive(Default)]
pub struct Interner {
  strings: FxHashSet<Arc<str>>,
  seqs:    FxHashSet<SeqKey>,
  maps:    FxHashSet<MapKey>,
  /// Container address → (input kept alive so the address stays unique,
  /// canonical result).
  seen:    FxHashMap<usize, (Value, Value)>,
  stats:   InternStats,
}

impl Interner {
  pub fn new() -> Self { Self::default() }

  /// Return the canonical instance of `value`.
  pub fn intern(&mut self, value: Value) -> Value {
    match value {
      Value::Text(s) => Value::Text(self.intern_str(s)),
      Value::Seq(items) => self.intern_seq(items),
      Value::Map(map) => Value::Map(self.intern_map(map)),
      scalar => scalar,
    }
  }

  /// Intern one record's attribute mapping.
  pub fn intern_attributes(&mut self, attributes: Map) -> Arc<Map> {
    self.intern_map(Arc::new(attributes))
  }

  pub fn intern_str(&mut self, s: Arc<str>) -> Arc<str> {
    if let Some(existing) = self.strings.get(&*s) {
      self.stats.string_hits += 1;
      return existing.clone();
    }
    self.strings.insert(s.clone());
    s
  }

  pub fn stats(&self) -> InternStats {
    InternStats {
      strings: self.strings.len(),
      containers: self.seqs.len() + self.maps.len(),
      ..self.stats
    }
  }

  fn shortcut(&mut self, addr: usize) -> Option<Value> {
    let (_, canonical) = self.seen.get(&addr)?;
    self.stats.shortcuts += 1;
    Some(canonical.clone())
  }

  fn remember(&mut self, addr: usize, input: Value, canonical: &Value) {
    self.seen.insert(addr, (input, canonical.clone()));
    let canonical_addr = container_addr(canonical);
    if canonical_addr != Some(addr)
      && let Some(canonical_addr) = canonical_addr
    {
      self
        .seen
        .entry(canonical_addr)
        .or_insert_with(|| (canonical.clone(), canonical.clone()));
    }
  }

  fn intern_seq(&mut self, items: Arc<[Value]>) -> Value {
    let addr = Arc::as_ptr(&items) as *const () as usize;
    if let Some(canonical) = self.shortcut(addr) {
      return canonical;
    }

    let interned: Vec<Value> = items.iter().cloned().map(|v| self.intern(v)).collect();
    let key = SeqKey(interned.into());
    let canonical = match self.seqs.get(&key) {
      Some(existing) => {
        self.stats.container_hits += 1;
        existing.0.clone()
      }
      None => {
        let fresh = key.0.clone();
        self.seqs.insert(key);
        fresh
      }
    };

    let canonical = Value::Seq(canonical);
    self.remember(addr, Value::Seq(items), &canonical);
    canonical
  }

  fn intern_map(&mut self, map: Arc<Map>) -> Arc<Map> {
    let addr = Arc::as_ptr(&map) as usize;
    if let Some(Value::Map(canonical)) = self.shortcut(addr) {
      return canonical;
    }

    let interned: Map = map
      .iter()
      .map(|(k, v)| (self.intern_str(k.clone()), self.intern(v.clone())))
      .collect();
    let key = MapKey(Arc::new(interned));
    let canonical = match self.maps.get(&key) {
      Some(existing) => {
        self.stats.container_hits += 1;
        existing.0.clone()
      }
      None => {
        let fresh = key.0.clone();
        self.maps.insert(key);
        fresh
      }
    };

    self.remember(addr, Value::Map(map), &Value::Map(canonical.clone()));
    canonical
  }
}

/// Pooled sequence, compared kind-strictly so `[3]` and `[3.0]` stay apart.
struct SeqKey(Arc<[Value]>);

impl PartialEq for SeqKey {
  fn eq(&self, other: &Self) -> bool { seqs_identical(&self.0, &other.0) }
}

impl Eq for SeqKey {}

impl Hash for SeqKey {
  fn hash<H: Hasher>(&self, state: &mut H) { hash_seq_identical(&self.0, state) }
}

/// Pooled mapping, compared kind-strictly.
struct MapKey(Arc<Map>);

impl PartialEq for MapKey {
  fn eq(&self, other: &Self) -> bool { maps_identical(&self.0, &other.0) }
}

impl Eq for MapKey {}

impl Hash for MapKey {
  fn hash<H: Hasher>(&self, state: &mut H) { hash_map_identical(&self.0, state) }
}

fn container_addr(value: &Value) -> Option<usize> {
  match value {
    Value::Seq(items) => Some(Arc::as_ptr(items) as *const () as usize),
    Value::Map(map) => Some(Arc::as_ptr(map) as usize),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn map(entries: &[(&str, Value)]) -> Map {
    entries
      .iter()
      .map(|(k, v)| (Arc::<str>::from(*k), v.clone()))
      .collect()
  }

  fn text(s: &str) -> Value {
    // A fresh allocation every time, like parser output.
    Value::Text(Arc::from(String::from(s)))
  }

  #[test]
  fn equal_strings_collapse_to_one_instance() {
    let mut interner = Interner::new();
    let a = interner.intern(text("George"));
    let b = interner.intern(text("George"));
    assert!(a.ptr_eq(&b));
    assert_eq!(interner.stats().string_hits, 1);
  }

  #[test]
  fn structurally_equal_maps_share_an_allocation() {
    let mut interner = Interner::new();
    let first = interner.intern_attributes(map(&[
      ("name", text("George")),
      ("tags", Value::from(map(&[("foo", text("bar"))]))),
    ]));
    let second = interner.intern_attributes(map(&[
      ("name", text("Peter")),
      ("tags", Value::from(map(&[("foo", text("bar"))]))),
    ]));
    assert!(first["tags"].ptr_eq(&second["tags"]));
    assert!(!first["name"].ptr_eq(&second["name"]));
  }

  #[test]
  fn keys_are_interned_through_the_string_pool() {
    let mut interner = Interner::new();
    let a = interner.intern_attributes(map(&[("continent", Value::Int(1))]));
    let b = interner.intern_attributes(map(&[("continent", Value::Int(2))]));
    let (ka, _) = a.iter().next().unwrap();
    let (kb, _) = b.iter().next().unwrap();
    assert!(Arc::ptr_eq(ka, kb));
  }

  #[test]
  fn shared_container_is_walked_once() {
    let mut interner = Interner::new();
    let shared = Value::from(vec![text("English"), text("French")]);
    let first = interner.intern(shared.clone());
    let second = interner.intern(shared.clone());
    assert!(first.ptr_eq(&second));
    assert_eq!(interner.stats().shortcuts, 1);
  }

  #[test]
  fn interning_is_idempotent() {
    let mut interner = Interner::new();
    let once = interner.intern(Value::from(vec![text("a"), Value::Int(1)]));
    let twice = interner.intern(once.clone());
    assert!(once.ptr_eq(&twice));
    assert_eq!(once, twice);
  }

  #[test]
  fn pools_keep_ints_and_floats_apart() {
    let mut interner = Interner::new();
    let ints = interner.intern(Value::from(vec![Value::Int(3)]));
    let floats = interner.intern(Value::from(vec![Value::Float(3.0)]));
    assert!(!ints.ptr_eq(&floats));
    assert!(matches!(floats.as_seq(), Some([Value::Float(f)]) if *f == 3.0));

    let zero = interner.intern_attributes(map(&[("x", Value::Float(0.0))]));
    let negative_zero = interner.intern_attributes(map(&[("x", Value::Float(-0.0))]));
    assert!(!Arc::ptr_eq(&zero, &negative_zero));
    assert!(matches!(negative_zero["x"], Value::Float(f) if f.is_sign_negative()));

    let again = interner.intern(Value::from(vec![Value::Float(3.0)]));
    assert!(again.ptr_eq(&floats));
    assert_eq!(interner.stats().container_hits, 1);
  }

  #[test]
  fn scalars_pass_through_unchanged() {
    let mut interner = Interner::new();
    assert_eq!(interner.intern(Value::Int(7)), Value::Int(7));
    assert_eq!(interner.intern(Value::Null), Value::Null);
    assert_eq!(interner.stats(), InternStats::default());
  }
}
