//! Dynamic finders: `find_by_name_and_density`-style lookups built at runtime.

use std::sync::Arc;

use crate::{
  error::{Error, Result},
  matcher::Matcher,
  record::Record,
  scope::Scope,
  store::RecordStore,
  value::Value,
};

/// A parsed finder expression.
///
/// Accepts `name_and_density`, optionally prefixed with `find_by_` and
/// suffixed with `!`. The bang form reports a missing record as
/// [`Error::RecordNotFound`] instead of `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finder {
  attributes: Vec<Arc<str>>,
  required:   bool,
}

impl Finder {
  pub fn parse(expression: &str) -> Result<Self> {
    let (body, required) = match expression.strip_suffix('!') {
      Some(body) => (body, true),
      None => (expression, false),
    };
    let body = body.strip_prefix("find_by_").unwrap_or(body);
    if body.is_empty() {
      return Err(Error::Unsupported("finder expression names no attributes"));
    }

    let attributes: Vec<Arc<str>> = body.split("_and_").map(Arc::from).collect();
    if attributes.iter().any(|a| a.is_empty()) {
      return Err(Error::Unsupported("finder expression has an empty attribute name"));
    }
    Ok(Self { attributes, required })
  }

  pub fn attributes(&self) -> &[Arc<str>] { &self.attributes }

  pub fn is_required(&self) -> bool { self.required }

  /// Check every attribute against the store's discovered attributes.
  pub fn validate(&self, store: &RecordStore) -> Result<()> {
    for attribute in &self.attributes {
      if !store.has_attribute(attribute)? {
        return Err(Error::UnknownAttribute {
          record_type: store.name().clone(),
          attribute:   attribute.to_string(),
        });
      }
    }
    Ok(())
  }

  /// Run the finder within `scope`, pairing attributes with `values` by
  /// position.
  pub fn apply<I>(&self, scope: &Scope, values: I) -> Result<Option<Record>>
  where
    I: IntoIterator,
    I::Item: Into<Value>,
  {
    self.validate(scope.store())?;

    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    if values.len() != self.attributes.len() {
      return Err(Error::Arity {
        expected: self.attributes.len(),
        found:    values.len(),
      });
    }

    let criteria = self
      .attributes
      .iter()
      .cloned()
      .zip(values.into_iter().map(Matcher::from));
    let scope = scope.filter(criteria);
    if self.required {
      scope.first_required().map(Some)
    } else {
      scope.first()
    }
  }
}
