//! SQL DDL for the Qtc store.
//!
//! Unlike a migration script this is not idempotent: tables are created with
//! a plain `CREATE TABLE` so that installing over an existing store fails.

use qtc_core::{fields::Column, store::Table};

use crate::encode::quote_ident;

/// Pragmas applied to every connection on open.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous  = NORMAL;
";

/// Count how many of the three tables exist.
pub const TABLE_COUNT: &str = "
SELECT COUNT(*) FROM sqlite_master
 WHERE type = 'table' AND name IN ('static', 'data', 'stamps')
";

/// `CREATE TABLE` for `table` with `columns`, plus its unique key if any.
pub fn create_table(table: Table, columns: &[Column]) -> String {
  let mut defs: Vec<String> = columns
    .iter()
    .map(|c| format!("{} {}", quote_ident(c.name), c.ty.sql()))
    .collect();

  if let Some(key) = table.unique_key() {
    let key: Vec<String> = key.iter().map(|c| quote_ident(c)).collect();
    defs.push(format!("UNIQUE ({})", key.join(", ")));
  }

  format!("CREATE TABLE {} (\n    {}\n)", quote_ident(table.name()), defs.join(",\n    "))
}

/// Indexes created alongside `table`.
pub fn indexes(table: Table) -> &'static [&'static str] {
  match table {
    // History lookups and the latest-observation query both go by key.
    Table::Data => &[
      "CREATE INDEX data_key_idx   ON \"data\"(\"hash\", \"client\")",
      "CREATE INDEX data_stamp_idx ON \"data\"(\"timestamp\")",
    ],
    Table::Static | Table::Stamps => &[],
  }
}

/// The newest row of each `(hash, client)` in append order.
pub const LATEST_OBSERVATIONS: &str = "
SELECT d.* FROM \"data\" d
  JOIN (SELECT MAX(rowid) AS last FROM \"data\" GROUP BY \"hash\", \"client\") l
    ON d.rowid = l.last
 ORDER BY d.rowid
";

pub const LATEST_STAMP: &str =
  "SELECT \"timestamp\" FROM \"stamps\" ORDER BY rowid DESC LIMIT 1";

pub const CLIENT_NAMES: &str =
  "SELECT DISTINCT \"client\" FROM \"static\" WHERE \"client\" IS NOT NULL ORDER BY \"client\"";

pub const TORRENTS_FOR_CLIENT: &str = "
SELECT \"hash\", \"name\", \"client\" FROM \"static\"
 WHERE \"client\" = ?1
 ORDER BY \"name\", rowid
";
