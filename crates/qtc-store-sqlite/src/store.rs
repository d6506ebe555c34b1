//! [`SqliteStore`] — the SQLite implementation of [`Repository`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, params_from_iter, types::Value};

use qtc_core::{
  fields::Column,
  record::TorrentRecord,
  store::{CycleWrites, Filter, Repository, SchemaState, Table},
};

use crate::{
  Result,
  encode::{self, Statement, decode_row},
  schema::{
    self, CLIENT_NAMES, LATEST_OBSERVATIONS, LATEST_STAMP, PRAGMAS, TABLE_COUNT,
    TORRENTS_FOR_CLIENT,
  },
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Qtc snapshot store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) the store file at `path`. The schema is not installed
  /// here; the poller does that on its first cycle.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.apply_pragmas().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.apply_pragmas().await?;
    Ok(store)
  }

  async fn apply_pragmas(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run one read statement and decode every row.
  async fn query(&self, stmt: Statement) -> Result<Vec<TorrentRecord>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut prepared = conn.prepare(&stmt.sql)?;
        let names: Vec<String> =
          prepared.column_names().into_iter().map(str::to_owned).collect();
        let rows = prepared
          .query_map(params_from_iter(stmt.params), |row| decode_row(row, &names))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Run write statements in one transaction; returns total rows affected.
  async fn execute_all(&self, stmts: Vec<Statement>) -> Result<usize> {
    let affected = self
      .conn
      .call(move |conn| {
        // Dropping an uncommitted transaction rolls it back.
        let tx = conn.transaction()?;
        let mut affected = 0;
        for stmt in stmts {
          let mut prepared = tx.prepare_cached(&stmt.sql)?;
          affected += prepared.execute(params_from_iter(stmt.params))?;
        }
        tx.commit()?;
        Ok(affected)
      })
      .await?;
    Ok(affected)
  }

  // ── History ───────────────────────────────────────────────────────────────

  /// Every client that has at least one stored torrent, sorted.
  pub async fn client_names(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(CLIENT_NAMES)?;
        let names = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
      })
      .await?;
    Ok(names)
  }

  /// `hash`, `name` and `client` of each torrent stored for `client`, by name.
  pub async fn torrents_for_client(&self, client: &str) -> Result<Vec<TorrentRecord>> {
    self
      .query(Statement {
        sql:    TORRENTS_FOR_CLIENT.to_owned(),
        params: vec![Value::Text(client.to_owned())],
      })
      .await
  }

  /// The static rows of `hash`: one per client that reports it, or only the
  /// row of `client` when given.
  pub async fn torrent(&self, hash: &str, client: Option<&str>) -> Result<Vec<TorrentRecord>> {
    self.select_where(Table::Static, key_filter(hash, client)).await
  }

  /// Recorded observations of `hash` in the order they were taken, from one
  /// client or from all of them.
  pub async fn history(&self, hash: &str, client: Option<&str>) -> Result<Vec<TorrentRecord>> {
    self.select_where(Table::Data, key_filter(hash, client)).await
  }
}

fn key_filter(hash: &str, client: Option<&str>) -> Filter {
  match client {
    Some(client) => Filter::key(hash, client),
    None => Filter::eq("hash", hash),
  }
}

// ─── Repository impl ─────────────────────────────────────────────────────────

impl Repository for SqliteStore {
  type Error = crate::Error;

  // ── Schema ────────────────────────────────────────────────────────────────

  async fn schema_state(&self) -> Result<SchemaState> {
    let count: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row(TABLE_COUNT, [], |r| r.get(0))?))
      .await?;

    Ok(match count {
      0 => SchemaState::Missing,
      n if n == Table::ALL.len() as i64 => SchemaState::Installed,
      _ => SchemaState::Partial,
    })
  }

  async fn create_table(&self, table: Table, columns: &'static [Column]) -> Result<()> {
    let mut stmts = vec![schema::create_table(table, columns)];
    stmts.extend(schema::indexes(table).iter().map(|s| (*s).to_owned()));

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for sql in &stmts {
          tx.execute(sql, [])?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn insert_row(&self, table: Table, row: TorrentRecord) -> Result<()> {
    self.execute_all(vec![encode::insert(table, &row)?]).await?;
    Ok(())
  }

  async fn insert_many(&self, table: Table, rows: Vec<TorrentRecord>) -> Result<()> {
    let stmts = rows
      .iter()
      .map(|row| encode::insert(table, row))
      .collect::<Result<Vec<_>>>()?;
    self.execute_all(stmts).await?;
    Ok(())
  }

  async fn delete_where(&self, table: Table, filter: Filter) -> Result<usize> {
    self.execute_all(vec![encode::delete(table, &filter)?]).await
  }

  async fn commit_cycle(&self, writes: CycleWrites) -> Result<()> {
    let mut stmts = Vec::with_capacity(
      writes.replaced.len() + writes.statics.len() + writes.observations.len(),
    );
    for (hash, client) in writes.replaced {
      stmts.push(encode::delete(Table::Static, &Filter::key(hash, client))?);
    }
    for row in &writes.statics {
      stmts.push(encode::insert(Table::Static, row)?);
    }
    for row in &writes.observations {
      stmts.push(encode::insert(Table::Data, row)?);
    }
    self.execute_all(stmts).await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn select_all(&self, table: Table) -> Result<Vec<TorrentRecord>> {
    self.query(encode::select(table, &Filter::default())?).await
  }

  async fn select_where(&self, table: Table, filter: Filter) -> Result<Vec<TorrentRecord>> {
    self.query(encode::select(table, &filter)?).await
  }

  async fn row_exists(&self, table: Table, filter: Filter) -> Result<bool> {
    let stmt = encode::exists(table, &filter)?;
    let exists: bool = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&stmt.sql, params_from_iter(stmt.params), |r| r.get(0))?)
      })
      .await?;
    Ok(exists)
  }

  async fn latest_stamp(&self) -> Result<Option<String>> {
    let stamp: Option<String> = self
      .conn
      .call(|conn| Ok(conn.query_row(LATEST_STAMP, [], |r| r.get(0)).optional()?))
      .await?;
    Ok(stamp)
  }

  async fn latest_observations(&self) -> Result<Vec<TorrentRecord>> {
    self
      .query(Statement { sql: LATEST_OBSERVATIONS.to_owned(), params: Vec::new() })
      .await
  }
}
