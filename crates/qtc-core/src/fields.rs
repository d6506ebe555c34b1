//! The field classifier.
//!
//! Every torrent record is split into a *static* subset (identity metadata
//! that rarely changes, one row per torrent) and a *data* subset (metrics
//! appended once per poll). The column tables below are the single source of
//! truth for both the split and the store schema.

use crate::record::TorrentRecord;

// ─── Columns ─────────────────────────────────────────────────────────────────

/// Declared SQL type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Text,
  Integer,
  Real,
}

impl ColumnType {
  pub fn sql(self) -> &'static str {
    match self {
      Self::Text => "TEXT",
      Self::Integer => "INTEGER",
      Self::Real => "REAL",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name: &'static str,
  pub ty:   ColumnType,
}

const fn text(name: &'static str) -> Column { Column { name, ty: ColumnType::Text } }
const fn integer(name: &'static str) -> Column { Column { name, ty: ColumnType::Integer } }
const fn real(name: &'static str) -> Column { Column { name, ty: ColumnType::Real } }

pub const STATIC_COLUMNS: &[Column] = &[
  text("hash"),
  text("client"),
  text("name"),
  text("tracker"),
  text("magnet_uri"),
  text("save_path"),
  integer("total_size"),
  integer("added_on"),
  integer("completion_on"),
  text("state"),
  text("category"),
  text("tags"),
];

pub const DATA_COLUMNS: &[Column] = &[
  text("hash"),
  text("client"),
  text("timestamp"),
  real("ratio"),
  integer("uploaded"),
  integer("time_active"),
  integer("completed"),
  integer("size"),
  integer("downloaded"),
  integer("num_seeds"),
  integer("num_leechs"),
  integer("last_activity"),
  integer("seen_complete"),
  integer("dlspeed"),
  integer("upspeed"),
  integer("num_complete"),
  integer("num_incomplete"),
  integer("downloaded_session"),
  integer("uploaded_session"),
];

pub const STAMP_COLUMNS: &[Column] = &[text("timestamp")];

/// Data fields whose change marks real activity. Everything else in the data
/// subset may fluctuate (speeds, peer counts) without the torrent moving.
pub const TRACKED_FIELDS: [&str; 4] = ["ratio", "uploaded", "downloaded", "completed"];

// ─── Classification ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
  Static,
  Data,
}

impl FieldGroup {
  pub fn columns(self) -> &'static [Column] {
    match self {
      Self::Static => STATIC_COLUMNS,
      Self::Data => DATA_COLUMNS,
    }
  }

  pub fn contains(self, name: &str) -> bool {
    self.columns().iter().any(|c| c.name == name)
  }
}

/// Return the sub-record holding only the fields declared in `group`.
///
/// Unknown fields are dropped and missing ones are not defaulted.
pub fn classify(record: &TorrentRecord, group: FieldGroup) -> TorrentRecord {
  let mut subset = record.clone();
  subset.retain(|name| group.contains(name));
  subset
}

/// Split a record into its `(static, data)` subsets.
pub fn split(record: &TorrentRecord) -> (TorrentRecord, TorrentRecord) {
  (classify(record, FieldGroup::Static), classify(record, FieldGroup::Data))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::FieldValue;

  fn sample() -> TorrentRecord {
    TorrentRecord::new()
      .with("hash", "abc")
      .with("client", "local")
      .with("name", "foo")
      .with("category", "linux")
      .with("ratio", 1.0)
      .with("uploaded", 100)
      .with("timestamp", "2024-01-01T00:00:00.000000Z")
      .with("auto_tmm", 0)
      .with("eta", 8640000)
  }

  #[test]
  fn static_subset_keeps_only_static_fields() {
    let s = classify(&sample(), FieldGroup::Static);
    let names: Vec<_> = s.names().collect();
    assert_eq!(names, ["category", "client", "hash", "name"]);
    assert_eq!(s.get("name"), Some(&FieldValue::Text("foo".into())));
  }

  #[test]
  fn data_subset_keeps_only_data_fields() {
    let d = classify(&sample(), FieldGroup::Data);
    let names: Vec<_> = d.names().collect();
    assert_eq!(names, ["client", "hash", "ratio", "timestamp", "uploaded"]);
  }

  #[test]
  fn declared_but_absent_fields_are_not_defaulted() {
    let d = classify(&sample(), FieldGroup::Data);
    assert!(!d.contains("downloaded"));
    assert!(!d.contains("num_seeds"));
  }

  #[test]
  fn split_then_union_drops_only_unknown_fields() {
    let record = sample();
    let (s, d) = split(&record);

    let mut joined = s;
    joined.extend(d);

    let mut expected = record;
    expected.retain(|n| n != "auto_tmm" && n != "eta");
    assert_eq!(joined, expected);
  }

  #[test]
  fn groups_share_only_the_identity_key() {
    let shared: Vec<_> = STATIC_COLUMNS
      .iter()
      .filter(|c| FieldGroup::Data.contains(c.name))
      .map(|c| c.name)
      .collect();
    assert_eq!(shared, ["hash", "client"]);
  }

  #[test]
  fn tracked_fields_are_data_fields() {
    assert!(TRACKED_FIELDS.iter().all(|f| FieldGroup::Data.contains(f)));
  }
}
