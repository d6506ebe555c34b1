//! Torrent records — the flat field maps fetched from a client and stored as
//! table rows.
//!
//! A record carries primitive values only. The same type is used for what a
//! client reports, for the static/data subsets produced by the classifier and
//! for rows read back from the store.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

// ─── FieldValue ──────────────────────────────────────────────────────────────

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
}

impl FieldValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Integer(i) => Some(*i as f64),
      Self::Real(r) => Some(*r),
      _ => None,
    }
  }

  /// Value equality that treats `Integer(1)` and `Real(1.0)` as equal.
  ///
  /// Clients serialise whole-number ratios without a fraction while the
  /// store hands them back as REAL, so strict `==` would report drift that
  /// never happened.
  pub fn same_as(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Integer(a), Self::Real(b)) | (Self::Real(b), Self::Integer(a)) => {
        (*a as f64) == *b
      }
      _ => self == other,
    }
  }
}

impl fmt::Display for FieldValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => Ok(()),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Real(r) => write!(f, "{r}"),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl From<serde_json::Value> for FieldValue {
  fn from(value: serde_json::Value) -> Self {
    use serde_json::Value;
    match value {
      Value::Null => Self::Null,
      Value::Bool(b) => Self::Integer(i64::from(b)),
      Value::Number(n) => match n.as_i64() {
        Some(i) => Self::Integer(i),
        None => n.as_f64().map(Self::Real).unwrap_or(Self::Null),
      },
      Value::String(s) => Self::Text(s),
      // Nested values are kept verbatim as compact JSON text.
      other @ (Value::Array(_) | Value::Object(_)) => Self::Text(other.to_string()),
    }
  }
}

impl From<&str> for FieldValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for FieldValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for FieldValue {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<i32> for FieldValue {
  fn from(i: i32) -> Self { Self::Integer(i64::from(i)) }
}

impl From<f64> for FieldValue {
  fn from(r: f64) -> Self { Self::Real(r) }
}

// ─── TorrentRecord ───────────────────────────────────────────────────────────

/// A flat mapping of field name to value for one torrent at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TorrentRecord {
  fields: BTreeMap<String, FieldValue>,
}

impl TorrentRecord {
  pub fn new() -> Self { Self::default() }

  /// Build a record from one object of a client's JSON torrent list.
  pub fn from_json(object: serde_json::Map<String, serde_json::Value>) -> Self {
    object
      .into_iter()
      .map(|(k, v)| (k, FieldValue::from(v)))
      .collect()
  }

  /// Builder-style insert, handy for literals in tests and fixtures.
  pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn insert(
    &mut self,
    name: impl Into<String>,
    value: impl Into<FieldValue>,
  ) -> Option<FieldValue> {
    self.fields.insert(name.into(), value.into())
  }

  pub fn get(&self, name: &str) -> Option<&FieldValue> { self.fields.get(name) }

  pub fn contains(&self, name: &str) -> bool { self.fields.contains_key(name) }

  pub fn text(&self, name: &str) -> Option<&str> {
    self.get(name).and_then(FieldValue::as_str)
  }

  /// The torrent hash, if present and textual.
  pub fn hash(&self) -> Option<&str> { self.text("hash") }

  /// The name of the client the record was fetched from.
  pub fn client(&self) -> Option<&str> { self.text("client") }

  /// The `(hash, client)` identity key, if both fields are present.
  pub fn key(&self) -> Option<(String, String)> {
    Some((self.hash()?.to_owned(), self.client()?.to_owned()))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
    self.fields.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> { self.fields.keys().map(String::as_str) }

  pub fn len(&self) -> usize { self.fields.len() }

  pub fn is_empty(&self) -> bool { self.fields.is_empty() }

  /// Keep only the fields for which `keep` returns `true`.
  pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
    self.fields.retain(|k, _| keep(k));
  }

  /// Merge `other` into `self`; fields in `other` win.
  pub fn extend(&mut self, other: TorrentRecord) { self.fields.extend(other.fields); }
}

impl FromIterator<(String, FieldValue)> for TorrentRecord {
  fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
    Self { fields: iter.into_iter().collect() }
  }
}

impl IntoIterator for TorrentRecord {
  type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;
  type Item = (String, FieldValue);

  fn into_iter(self) -> Self::IntoIter { self.fields.into_iter() }
}
