//! Catalog configuration, deserialised from `tundra.toml` and the environment.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use tundra_core::RecordType;

use crate::{
  codec::{Format, from_json},
  error::Result,
  source::{ChangeDetection, FileSource},
};

/// Environment variables with this prefix override file settings.
pub const ENV_PREFIX: &str = "TUNDRA";

/// Every record type served from one data directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
  /// Directory holding the record files.
  #[serde(default)]
  pub base_path:    Option<PathBuf>,
  #[serde(default)]
  pub record_types: Vec<RecordTypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordTypeConfig {
  pub name:               String,
  #[serde(default)]
  pub format:             Format,
  /// File name relative to `base_path` (or an absolute path). Defaults to
  /// `<name>.<ext>`.
  #[serde(default)]
  pub file:               Option<PathBuf>,
  #[serde(default = "default_primary_key")]
  pub primary_key:        String,
  #[serde(default)]
  pub auto_reload:        bool,
  #[serde(default)]
  pub change_detection:   ChangeDetection,
  #[serde(default)]
  pub default_attributes: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  pub indexes:            Vec<IndexConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
  pub attribute: String,
  #[serde(default)]
  pub unique:    bool,
}

fn default_primary_key() -> String { "id".to_owned() }

impl CatalogConfig {
  /// Layer the TOML file at `path` (optional) under `TUNDRA__*` variables.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn from_toml(text: &str) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(text, config::FileFormat::Toml))
      .build()?;
    Ok(settings.try_deserialize()?)
  }
}

impl RecordTypeConfig {
  /// `file`, or `<name>.<ext>` when no file is given.
  pub fn file_name(&self) -> PathBuf {
    self
      .file
      .clone()
      .unwrap_or_else(|| PathBuf::from(format!("{}.{}", self.name, self.format.extension())))
  }

  /// Where the record file lives, if that can be determined.
  pub fn resolve_path(&self, base_path: Option<&Path>) -> Option<PathBuf> {
    match (base_path, &self.file) {
      (_, Some(file)) if file.is_absolute() => Some(file.clone()),
      (Some(base), _) => Some(base.join(self.file_name())),
      (None, Some(file)) => Some(file.clone()),
      (None, None) => None,
    }
  }

  /// A file source reading this record type's file under `base_path`.
  pub fn source(&self, base_path: Option<&Path>) -> FileSource {
    let source = match self.resolve_path(base_path) {
      Some(path) => FileSource::new(path, self.format),
      None => FileSource::unconfigured(self.format),
    };
    source.with_change_detection(self.change_detection)
  }

  pub fn definition(&self) -> RecordType {
    let mut definition = RecordType::new(self.name.as_str())
      .primary_key(self.primary_key.as_str())
      .auto_reload(self.auto_reload);
    for (attribute, value) in &self.default_attributes {
      definition = definition.default_attribute(attribute.as_str(), from_json(value.clone()));
    }
    for index in &self.indexes {
      definition = if index.unique {
        definition.unique_index(index.attribute.as_str())
      } else {
        definition.index(index.attribute.as_str())
      };
    }
    definition
  }
}

#[cfg(test)]
mod tests {
  use tundra_core::Value;

  use super::*;

  const SAMPLE: &str = r#"
    base_path = "data"

    [[record_types]]
    name = "countries"
    auto_reload = true
    change_detection = "digest"

    [record_types.default_attributes]
    contemporary = true

    [[record_types.indexes]]
    attribute = "name"
    unique = true

    [[record_types.indexes]]
    attribute = "continent"

    [[record_types]]
    name = "cars"
    format = "toml"
    file = "vehicles.toml"
    primary_key = "code"
  "#;

  #[test]
  fn parses_defaults_and_overrides() {
    let config = CatalogConfig::from_toml(SAMPLE).unwrap();
    assert_eq!(config.base_path.as_deref(), Some(Path::new("data")));

    let countries = &config.record_types[0];
    assert_eq!(countries.format, Format::Json);
    assert_eq!(countries.primary_key, "id");
    assert_eq!(countries.change_detection, ChangeDetection::Digest);
    assert_eq!(countries.indexes.len(), 2);

    let cars = &config.record_types[1];
    assert_eq!(cars.format, Format::Toml);
    assert_eq!(cars.primary_key, "code");
    assert!(!cars.auto_reload);
  }

  #[test]
  fn resolves_paths() {
    let config = CatalogConfig::from_toml(SAMPLE).unwrap();
    let base = config.base_path.as_deref();
    assert_eq!(
      config.record_types[0].resolve_path(base),
      Some(PathBuf::from("data/countries.json"))
    );
    assert_eq!(
      config.record_types[1].resolve_path(base),
      Some(PathBuf::from("data/vehicles.toml"))
    );
    assert_eq!(config.record_types[0].resolve_path(None), None);
    assert_eq!(
      config.record_types[1].resolve_path(None),
      Some(PathBuf::from("vehicles.toml"))
    );
  }

  #[test]
  fn builds_a_record_type() {
    let config = CatalogConfig::from_toml(SAMPLE).unwrap();
    let definition = config.record_types[0].definition();
    assert!(definition.is_auto_reload());
    assert_eq!(
      definition.default_attributes().get("contemporary"),
      Some(&Value::Bool(true))
    );
    let unique: Vec<bool> = definition.indexes().iter().map(|i| i.unique).collect();
    assert_eq!(unique, [true, false]);
  }

  #[test]
  fn missing_file_yields_empty_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = CatalogConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert!(config.record_types.is_empty());
    assert!(config.base_path.is_none());
  }
}
