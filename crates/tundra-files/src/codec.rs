//! Decoding record files into raw attribute mappings.
//!
//! - JSON and YAML files hold a top-level sequence of objects.
//! - TOML files hold an array of tables named `records`.
//! - CSV files hold a header row followed by one row per record. Every cell
//!   is text, and each record gets a `position` attribute with its row index.
//!
//! An empty document (or a JSON/YAML `null`) means no records.

use std::{path::Path, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};
use tundra_core::{Map, SourceError, Value};

/// A record file format.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Format {
  #[default]
  Json,
  Toml,
  Yaml,
  Csv,
}

impl Format {
  pub fn extension(self) -> &'static str {
    match self {
      Self::Json => "json",
      Self::Toml => "toml",
      Self::Yaml => "yml",
      Self::Csv => "csv",
    }
  }

  /// Decode `text`, read from `path`, into raw records.
  pub fn decode(self, path: &Path, text: &str) -> Result<Vec<Map>, SourceError> {
    match self {
      Self::Json => decode_json(path, text),
      Self::Toml => decode_toml(path, text),
      Self::Yaml => decode_yaml(path, text),
      Self::Csv => decode_csv(path, text),
    }
  }
}

// ─── JSON ────────────────────────────────────────────────────────────────────

fn decode_json(path: &Path, text: &str) -> Result<Vec<Map>, SourceError> {
  if text.trim().is_empty() {
    return Ok(Vec::new());
  }
  let document: serde_json::Value = serde_json::from_str(text).map_err(|e| SourceError::Malformed {
    format:  "json",
    path:    path.to_path_buf(),
    message: e.to_string(),
  })?;

  let entries = match document {
    serde_json::Value::Null => return Ok(Vec::new()),
    serde_json::Value::Array(entries) => entries,
    other => {
      return Err(SourceError::Malformed {
        format:  "json",
        path:    path.to_path_buf(),
        message: format!("expected a top-level array, found {}", json_kind(&other)),
      });
    }
  };

  entries
    .into_iter()
    .enumerate()
    .map(|(index, entry)| match entry {
      serde_json::Value::Object(object) => Ok(json_object(object)),
      other => Err(SourceError::Shape {
        path: path.to_path_buf(),
        index,
        found: json_kind(&other),
      }),
    })
    .collect()
}

/// Convert a JSON value into a record value.
pub fn from_json(value: serde_json::Value) -> Value {
  match value {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(b) => Value::Bool(b),
    serde_json::Value::Number(n) => n
      .as_i64()
      .map(Value::Int)
      .or_else(|| n.as_f64().map(Value::Float))
      .unwrap_or(Value::Null),
    serde_json::Value::String(s) => Value::from(s),
    serde_json::Value::Array(items) => Value::from(items.into_iter().map(from_json).collect::<Vec<_>>()),
    serde_json::Value::Object(object) => Value::from(json_object(object)),
  }
}

fn json_object(object: serde_json::Map<String, serde_json::Value>) -> Map {
  object
    .into_iter()
    .map(|(k, v)| (Arc::<str>::from(k), from_json(v)))
    .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "bool",
    serde_json::Value::Number(_) => "number",
    serde_json::Value::String(_) => "string",
    serde_json::Value::Array(_) => "array",
    serde_json::Value::Object(_) => "object",
  }
}

// ─── TOML ────────────────────────────────────────────────────────────────────

fn decode_toml(path: &Path, text: &str) -> Result<Vec<Map>, SourceError> {
  let malformed = |message: String| SourceError::Malformed {
    format: "toml",
    path: path.to_path_buf(),
    message,
  };

  let mut document: toml::Table = text.parse().map_err(|e: toml::de::Error| malformed(e.to_string()))?;
  let entries = match document.remove("records") {
    None => return Ok(Vec::new()),
    Some(toml::Value::Array(entries)) => entries,
    Some(other) => {
      return Err(malformed(format!(
        "`records` must be an array of tables, found {}",
        other.type_str()
      )));
    }
  };

  entries
    .into_iter()
    .enumerate()
    .map(|(index, entry)| match entry {
      toml::Value::Table(table) => Ok(toml_table(table)),
      other => Err(SourceError::Shape {
        path: path.to_path_buf(),
        index,
        found: other.type_str(),
      }),
    })
    .collect()
}

fn from_toml(value: toml::Value) -> Value {
  match value {
    toml::Value::String(s) => Value::from(s),
    toml::Value::Integer(i) => Value::Int(i),
    toml::Value::Float(f) => Value::Float(f),
    toml::Value::Boolean(b) => Value::Bool(b),
    toml::Value::Datetime(dt) => toml_datetime(&dt),
    toml::Value::Array(items) => Value::from(items.into_iter().map(from_toml).collect::<Vec<_>>()),
    toml::Value::Table(table) => Value::from(toml_table(table)),
  }
}

fn toml_table(table: toml::Table) -> Map {
  table
    .into_iter()
    .map(|(k, v)| (Arc::<str>::from(k), from_toml(v)))
    .collect()
}

/// Offset datetimes become UTC timestamps, local datetimes are read as UTC,
/// dates become dates. Anything else (a bare time) stays text.
fn toml_datetime(dt: &toml::value::Datetime) -> Value {
  let text = dt.to_string();
  let parsed = match (dt.date.is_some(), dt.time.is_some(), dt.offset.is_some()) {
    (true, false, _) => NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok().map(Value::Date),
    (true, true, true) => DateTime::parse_from_rfc3339(&text)
      .ok()
      .map(|t| Value::Timestamp(t.with_timezone(&Utc))),
    (true, true, false) => NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
      .ok()
      .map(|t| Value::Timestamp(t.and_utc())),
    _ => None,
  };
  parsed.unwrap_or_else(|| Value::from(text))
}

// ─── YAML ────────────────────────────────────────────────────────────────────

fn decode_yaml(path: &Path, text: &str) -> Result<Vec<Map>, SourceError> {
  let malformed = |message: String| SourceError::Malformed {
    format: "yaml",
    path: path.to_path_buf(),
    message,
  };

  if text.trim().is_empty() {
    return Ok(Vec::new());
  }
  let mut document: serde_yaml::Value =
    serde_yaml::from_str(text).map_err(|e| malformed(e.to_string()))?;
  document.apply_merge().map_err(|e| malformed(e.to_string()))?;

  let entries = match document {
    serde_yaml::Value::Null => return Ok(Vec::new()),
    serde_yaml::Value::Sequence(entries) => entries,
    other => {
      return Err(malformed(format!(
        "expected a top-level sequence, found {}",
        yaml_kind(&other)
      )));
    }
  };

  entries
    .into_iter()
    .enumerate()
    .map(|(index, entry)| match entry {
      serde_yaml::Value::Mapping(mapping) => yaml_mapping(mapping).map_err(malformed),
      other => Err(SourceError::Shape {
        path: path.to_path_buf(),
        index,
        found: yaml_kind(&other),
      }),
    })
    .collect()
}

fn from_yaml(value: serde_yaml::Value) -> Result<Value, String> {
  Ok(match value {
    serde_yaml::Value::Null => Value::Null,
    serde_yaml::Value::Bool(b) => Value::Bool(b),
    serde_yaml::Value::Number(n) => n
      .as_i64()
      .map(Value::Int)
      .or_else(|| n.as_f64().map(Value::Float))
      .unwrap_or(Value::Null),
    serde_yaml::Value::String(s) => Value::from(s),
    serde_yaml::Value::Sequence(items) => Value::from(
      items
        .into_iter()
        .map(from_yaml)
        .collect::<Result<Vec<_>, _>>()?,
    ),
    serde_yaml::Value::Mapping(mapping) => Value::from(yaml_mapping(mapping)?),
    serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value)?,
  })
}

/// Scalar keys are read as text; sequence or mapping keys are rejected.
fn yaml_mapping(mapping: serde_yaml::Mapping) -> Result<Map, String> {
  mapping
    .into_iter()
    .map(|(key, value)| {
      let key = match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => return Err(format!("unsupported {} mapping key", yaml_kind(&other))),
      };
      Ok((Arc::<str>::from(key), from_yaml(value)?))
    })
    .collect()
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
  match value {
    serde_yaml::Value::Null => "null",
    serde_yaml::Value::Bool(_) => "bool",
    serde_yaml::Value::Number(_) => "number",
    serde_yaml::Value::String(_) => "string",
    serde_yaml::Value::Sequence(_) => "sequence",
    serde_yaml::Value::Mapping(_) => "mapping",
    serde_yaml::Value::Tagged(_) => "tagged value",
  }
}

// ─── CSV ─────────────────────────────────────────────────────────────────────

/// Attribute holding a CSV record's zero-based row index.
pub const CSV_POSITION: &str = "position";

fn decode_csv(path: &Path, text: &str) -> Result<Vec<Map>, SourceError> {
  let malformed = |e: csv::Error| SourceError::Malformed {
    format:  "csv",
    path:    path.to_path_buf(),
    message: e.to_string(),
  };

  let mut reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .from_reader(text.as_bytes());
  let headers: Vec<Arc<str>> = reader
    .headers()
    .map_err(malformed)?
    .iter()
    .map(Arc::from)
    .collect();

  reader
    .records()
    .enumerate()
    .map(|(index, row)| {
      let row = row.map_err(malformed)?;
      let mut record: Map = headers
        .iter()
        .cloned()
        .zip(row.iter().map(Value::from))
        .collect();
      record.insert(Arc::from(CSV_POSITION), Value::Int(index as i64));
      Ok(record)
    })
    .collect()
}
