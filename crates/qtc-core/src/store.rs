//! The `Repository` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `qtc-store-sqlite`).
//! The poll orchestrator and the CLI depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::{
  fields::{Column, DATA_COLUMNS, STAMP_COLUMNS, STATIC_COLUMNS},
  record::{FieldValue, TorrentRecord},
};

// ─── Tables ──────────────────────────────────────────────────────────────────

/// The three logical tables of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  /// One row per `(hash, client)`.
  Static,
  /// Append-only observations.
  Data,
  /// Append-only poll timestamps.
  Stamps,
}

impl Table {
  pub const ALL: [Table; 3] = [Table::Static, Table::Data, Table::Stamps];

  pub fn name(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Data => "data",
      Self::Stamps => "stamps",
    }
  }

  pub fn columns(self) -> &'static [Column] {
    match self {
      Self::Static => STATIC_COLUMNS,
      Self::Data => DATA_COLUMNS,
      Self::Stamps => STAMP_COLUMNS,
    }
  }

  /// Columns that must be unique together, if any.
  pub fn unique_key(self) -> Option<&'static [&'static str]> {
    match self {
      Self::Static => Some(&["hash", "client"]),
      Self::Data | Self::Stamps => None,
    }
  }

  pub fn has_column(self, name: &str) -> bool {
    self.columns().iter().any(|c| c.name == name)
  }
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// A conjunction of `column = value` terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
  terms: Vec<(String, FieldValue)>,
}

impl Filter {
  pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
    Self::default().and(field, value)
  }

  pub fn and(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
    self.terms.push((field.into(), value.into()));
    self
  }

  /// Match one torrent identity.
  pub fn key(hash: impl Into<String>, client: impl Into<String>) -> Self {
    Self::eq("hash", hash.into()).and("client", client.into())
  }

  pub fn terms(&self) -> &[(String, FieldValue)] { &self.terms }

  pub fn is_empty(&self) -> bool { self.terms.is_empty() }
}

/// How much of the schema a store already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
  Missing,
  /// Some, but not all, tables exist.
  Partial,
  Installed,
}

/// Every write produced by one poll cycle, committed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleWrites {
  /// `(hash, client)` keys whose static row is deleted before `statics` are
  /// inserted.
  pub replaced:     Vec<(String, String)>,
  pub statics:      Vec<TorrentRecord>,
  pub observations: Vec<TorrentRecord>,
}

impl CycleWrites {
  pub fn is_empty(&self) -> bool {
    self.replaced.is_empty() && self.statics.is_empty() && self.observations.is_empty()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a snapshot store backend.
///
/// Each call is atomic: it runs inside its own transaction and releases the
/// connection on every exit path. `data` and `stamps` are append-only; the
/// only deletes ever issued target `static` rows being replaced.
pub trait Repository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Report which of the three tables exist.
  fn schema_state(&self) -> impl Future<Output = Result<SchemaState, Self::Error>> + Send + '_;

  /// Create `table` with `columns`. Fails if the table already exists.
  fn create_table(
    &self,
    table: Table,
    columns: &'static [Column],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn insert_row(
    &self,
    table: Table,
    row: TorrentRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert all `rows` in a single transaction.
  fn insert_many(
    &self,
    table: Table,
    rows: Vec<TorrentRecord>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All rows of `table` in insertion order.
  fn select_all(
    &self,
    table: Table,
  ) -> impl Future<Output = Result<Vec<TorrentRecord>, Self::Error>> + Send + '_;

  /// Rows of `table` matching `filter`, in insertion order.
  fn select_where(
    &self,
    table: Table,
    filter: Filter,
  ) -> impl Future<Output = Result<Vec<TorrentRecord>, Self::Error>> + Send + '_;

  /// Delete rows matching `filter`; returns the number removed.
  fn delete_where(
    &self,
    table: Table,
    filter: Filter,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn row_exists(
    &self,
    table: Table,
    filter: Filter,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// The most recently logged stamp, verbatim.
  fn latest_stamp(&self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// The most recent data row of every `(hash, client)`.
  fn latest_observations(
    &self,
  ) -> impl Future<Output = Result<Vec<TorrentRecord>, Self::Error>> + Send + '_;

  /// Apply one cycle's writes in a single transaction: delete replaced static
  /// rows, insert new static rows, append observations.
  fn commit_cycle(
    &self,
    writes: CycleWrites,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

/// Create the `static`, `data` and `stamps` tables.
///
/// Not idempotent on purpose: installing over an existing table is an error
/// rather than a silent re-create.
pub async fn install_schema<R: Repository>(repo: &R) -> Result<(), R::Error> {
  for table in Table::ALL {
    repo.create_table(table, table.columns()).await?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_filter_matches_identity_columns() {
    let f = Filter::key("abc", "local");
    assert_eq!(
      f.terms(),
      &[
        ("hash".to_owned(), FieldValue::Text("abc".into())),
        ("client".to_owned(), FieldValue::Text("local".into())),
      ]
    );
  }

  #[test]
  fn only_static_has_a_unique_key() {
    assert_eq!(Table::Static.unique_key(), Some(&["hash", "client"][..]));
    assert!(Table::Data.unique_key().is_none());
    assert!(Table::Stamps.unique_key().is_none());
  }

  #[test]
  fn stamps_table_has_single_text_column() {
    assert!(Table::Stamps.has_column("timestamp"));
    assert_eq!(Table::Stamps.columns().len(), 1);
  }
}
