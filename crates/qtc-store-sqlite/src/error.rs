//! Error type for `qtc-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A row or filter named a column the table does not declare.
  #[error("table {table} has no column {column:?}")]
  UnknownColumn { table: &'static str, column: String },

  #[error("cannot insert an empty row into {0}")]
  EmptyRow(&'static str),

  /// Deletes must be scoped; an empty filter would clear the table.
  #[error("refusing to delete from {0} without a filter")]
  EmptyFilter(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
