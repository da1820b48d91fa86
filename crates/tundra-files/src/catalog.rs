//! A registry of file-backed record stores, with fixture overrides for tests.

use std::{path::Path, sync::Arc};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use tundra_core::{RecordStore, Source};

use crate::{
  config::{CatalogConfig, RecordTypeConfig},
  error::{Error, Result},
};

struct Entry {
  config:   RecordTypeConfig,
  store:    Arc<RecordStore>,
  /// The configured source, parked here while a fixture is active.
  original: Mutex<Option<Box<dyn Source>>>,
}

/// Every configured record type, keyed by name in declaration order.
pub struct Catalog {
  entries: IndexMap<Arc<str>, Entry>,
}

impl Catalog {
  pub fn from_config(config: &CatalogConfig) -> Result<Self> {
    let base_path = config.base_path.as_deref();
    let mut entries = IndexMap::with_capacity(config.record_types.len());
    for type_config in &config.record_types {
      let definition = type_config.definition();
      let name = definition.name().clone();
      let source = type_config.source(base_path);
      debug!(record_type = %name, source = %source.describe(), "registered record type");
      let entry = Entry {
        config:   type_config.clone(),
        store:    RecordStore::new(definition, source),
        original: Mutex::new(None),
      };
      if entries.insert(name.clone(), entry).is_some() {
        return Err(Error::DuplicateRecordType(name.to_string()));
      }
    }
    Ok(Self { entries })
  }

  pub fn get(&self, name: &str) -> Result<&Arc<RecordStore>> {
    Ok(&self.entry(name)?.store)
  }

  pub fn names(&self) -> impl Iterator<Item = &Arc<str>> { self.entries.keys() }

  pub fn stores(&self) -> impl Iterator<Item = &Arc<RecordStore>> {
    self.entries.values().map(|e| &e.store)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Load every record type that does not auto-reload.
  pub fn eager_load(&self) -> Result<()> {
    for entry in self.entries.values() {
      if !entry.store.definition().is_auto_reload() {
        entry.store.load(false)?;
      }
    }
    Ok(())
  }

  // ── Fixtures ──────────────────────────────────────────────────────────

  /// Serve `name` from the same file under `base_path` until unloaded.
  ///
  /// A second call for a type with an active fixture is ignored.
  pub fn load_fixture(&self, name: &str, base_path: &Path) -> Result<()> {
    let entry = self.entry(name)?;
    let mut original = entry.original.lock();
    if original.is_some() {
      debug!(record_type = %name, "fixture already active");
      return Ok(());
    }

    let fixture = entry.config.source(Some(base_path));
    info!(record_type = %name, source = %fixture.describe(), "loading fixture");
    *original = Some(entry.store.replace_source(Box::new(fixture))?);
    Ok(())
  }

  /// Put the configured source back and reload from it.
  ///
  /// When the configured file does not exist the source is restored without
  /// reloading, so the fixture data stays visible.
  pub fn unload_fixture(&self, name: &str) -> Result<()> {
    let entry = self.entry(name)?;
    let Some(source) = entry.original.lock().take() else {
      return Ok(());
    };

    info!(record_type = %name, "unloading fixture");
    let exists = source.exists();
    entry.store.set_source(source);
    if exists {
      entry.store.reload()?;
    }
    Ok(())
  }

  pub fn unload_fixtures(&self) -> Result<()> {
    for name in self.entries.keys() {
      self.unload_fixture(name)?;
    }
    Ok(())
  }

  pub fn has_fixture(&self, name: &str) -> Result<bool> {
    Ok(self.entry(name)?.original.lock().is_some())
  }

  fn entry(&self, name: &str) -> Result<&Entry> {
    self
      .entries
      .get(name)
      .ok_or_else(|| Error::UnknownRecordType(name.to_owned()))
  }
}
