//! Parsing command-line criteria into matchers.
//!
//! A value is read as JSON when it parses (`2`, `true`, `[1,2]`, `"x"`), and
//! as plain text otherwise. Text that is not JSON and has the shape `a..b` or
//! `a..=b` (either side optional) becomes a range, so `"a..b"` stays literal.

use std::ops::Bound;

use anyhow::{Result, bail};
use tundra_core::{Matcher, Value, ValueRange};
use tundra_files::codec::from_json;

pub fn parse_value(text: &str) -> Value {
  match serde_json::from_str::<serde_json::Value>(text) {
    Ok(json) => from_json(json),
    Err(_) => Value::from(text),
  }
}

pub fn parse_matcher(text: &str) -> Matcher {
  if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
    return Matcher::from(from_json(json));
  }
  if let Some((start, end)) = text.split_once("..=") {
    return Matcher::Covers(ValueRange::new(bound(start, Bound::Included), bound(end, Bound::Included)));
  }
  if let Some((start, end)) = text.split_once("..") {
    return Matcher::Covers(ValueRange::new(bound(start, Bound::Included), bound(end, Bound::Excluded)));
  }
  Matcher::from(parse_value(text))
}

fn bound(text: &str, make: fn(Value) -> Bound<Value>) -> Bound<Value> {
  if text.is_empty() {
    Bound::Unbounded
  } else {
    make(parse_value(text))
  }
}

/// Parse `attribute=value`.
pub fn parse_criterion(text: &str) -> Result<(String, Matcher)> {
  let Some((attribute, value)) = text.split_once('=') else {
    bail!("expected ATTRIBUTE=VALUE, got {text:?}");
  };
  if attribute.is_empty() {
    bail!("missing attribute name in {text:?}");
  }
  Ok((attribute.to_owned(), parse_matcher(value)))
}
