//! In-memory collaborators for orchestrator tests.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use thiserror::Error;

use crate::{
  config::ClientConfig,
  fields::Column,
  gateway::{Gateway, GatewayError},
  record::TorrentRecord,
  store::{CycleWrites, Filter, Repository, SchemaState, Table},
};

// ─── MemoryRepository ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("table {0} already exists")]
  TableExists(&'static str),
  #[error("no such table: {0}")]
  NoSuchTable(&'static str),
  #[error("duplicate static row for {0:?}")]
  Duplicate((String, String)),
}

/// A [`Repository`] over plain vectors, with the same uniqueness rule on
/// `static` as the SQLite store.
#[derive(Default)]
pub struct MemoryRepository {
  tables: Mutex<HashMap<Table, Vec<TorrentRecord>>>,
}

impl MemoryRepository {
  pub fn rows(&self, table: Table) -> Vec<TorrentRecord> {
    self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default()
  }

  pub fn count(&self, table: Table) -> usize { self.rows(table).len() }

  fn with_table<T>(
    &self,
    table: Table,
    f: impl FnOnce(&mut Vec<TorrentRecord>) -> Result<T, MemoryError>,
  ) -> Result<T, MemoryError> {
    let mut tables = self.tables.lock().unwrap();
    let rows = tables.get_mut(&table).ok_or(MemoryError::NoSuchTable(table.name()))?;
    f(rows)
  }
}

fn matches(row: &TorrentRecord, filter: &Filter) -> bool {
  filter
    .terms()
    .iter()
    .all(|(field, value)| row.get(field).is_some_and(|v| v.same_as(value)))
}

fn check_unique(rows: &[TorrentRecord]) -> Result<(), MemoryError> {
  let mut keys = std::collections::HashSet::new();
  for key in rows.iter().filter_map(TorrentRecord::key) {
    if !keys.insert(key.clone()) {
      return Err(MemoryError::Duplicate(key));
    }
  }
  Ok(())
}

impl Repository for MemoryRepository {
  type Error = MemoryError;

  async fn schema_state(&self) -> Result<SchemaState, MemoryError> {
    let tables = self.tables.lock().unwrap();
    Ok(match tables.len() {
      0 => SchemaState::Missing,
      n if n == Table::ALL.len() => SchemaState::Installed,
      _ => SchemaState::Partial,
    })
  }

  async fn create_table(&self, table: Table, _: &'static [Column]) -> Result<(), MemoryError> {
    let mut tables = self.tables.lock().unwrap();
    if tables.contains_key(&table) {
      return Err(MemoryError::TableExists(table.name()));
    }
    tables.insert(table, Vec::new());
    Ok(())
  }

  async fn insert_row(&self, table: Table, row: TorrentRecord) -> Result<(), MemoryError> {
    self.insert_many(table, vec![row]).await
  }

  async fn insert_many(&self, table: Table, rows: Vec<TorrentRecord>) -> Result<(), MemoryError> {
    self.with_table(table, |existing| {
      let mut next = existing.clone();
      next.extend(rows);
      if table == Table::Static {
        check_unique(&next)?;
      }
      *existing = next;
      Ok(())
    })
  }

  async fn select_all(&self, table: Table) -> Result<Vec<TorrentRecord>, MemoryError> {
    self.with_table(table, |rows| Ok(rows.clone()))
  }

  async fn select_where(
    &self,
    table: Table,
    filter: Filter,
  ) -> Result<Vec<TorrentRecord>, MemoryError> {
    self.with_table(table, |rows| {
      Ok(rows.iter().filter(|r| matches(r, &filter)).cloned().collect())
    })
  }

  async fn delete_where(&self, table: Table, filter: Filter) -> Result<usize, MemoryError> {
    self.with_table(table, |rows| {
      let before = rows.len();
      rows.retain(|r| !matches(r, &filter));
      Ok(before - rows.len())
    })
  }

  async fn row_exists(&self, table: Table, filter: Filter) -> Result<bool, MemoryError> {
    self.with_table(table, |rows| Ok(rows.iter().any(|r| matches(r, &filter))))
  }

  async fn latest_stamp(&self) -> Result<Option<String>, MemoryError> {
    self.with_table(Table::Stamps, |rows| {
      Ok(rows.last().and_then(|r| r.text("timestamp")).map(str::to_owned))
    })
  }

  async fn latest_observations(&self) -> Result<Vec<TorrentRecord>, MemoryError> {
    self.with_table(Table::Data, |rows| {
      let mut latest: HashMap<(String, String), TorrentRecord> = HashMap::new();
      for row in rows.iter() {
        if let Some(key) = row.key() {
          latest.insert(key, row.clone());
        }
      }
      Ok(latest.into_values().collect())
    })
  }

  async fn commit_cycle(&self, writes: CycleWrites) -> Result<(), MemoryError> {
    let mut tables = self.tables.lock().unwrap();

    let mut statics = tables.get(&Table::Static).cloned().ok_or(MemoryError::NoSuchTable("static"))?;
    let mut data = tables.get(&Table::Data).cloned().ok_or(MemoryError::NoSuchTable("data"))?;

    for (hash, client) in writes.replaced {
      let filter = Filter::key(hash, client);
      statics.retain(|r| !matches(r, &filter));
    }
    statics.extend(writes.statics);
    check_unique(&statics)?;
    data.extend(writes.observations);

    tables.insert(Table::Static, statics);
    tables.insert(Table::Data, data);
    Ok(())
  }
}

// ─── ScriptedGateway ─────────────────────────────────────────────────────────

enum Reply {
  Records(Vec<TorrentRecord>),
  Fail(GatewayError),
  Stall,
}

/// A [`Gateway`] that replays canned replies per client name. Replies for a
/// client are consumed in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedGateway {
  script:    Mutex<HashMap<String, VecDeque<Reply>>>,
  pub calls: AtomicUsize,
}

impl ScriptedGateway {
  fn push(self, client: &str, reply: Reply) -> Self {
    self.script.lock().unwrap().entry(client.to_owned()).or_default().push_back(reply);
    self
  }

  pub fn respond(self, client: &str, records: Vec<TorrentRecord>) -> Self {
    self.push(client, Reply::Records(records))
  }

  pub fn fail(self, client: &str, error: GatewayError) -> Self { self.push(client, Reply::Fail(error)) }

  /// Never answer; exercises the orchestrator's fetch timeout.
  pub fn stall(self, client: &str) -> Self { self.push(client, Reply::Stall) }

  fn next_reply(&self, client: &str) -> Option<Result<Vec<TorrentRecord>, GatewayError>> {
    let mut script = self.script.lock().unwrap();
    let queue = script.get_mut(client)?;
    let reply = if queue.len() > 1 { queue.pop_front()? } else { queue.front().map(Reply::clone_reply)? };
    match reply {
      Reply::Records(records) => Some(Ok(records)),
      Reply::Fail(error) => Some(Err(error)),
      Reply::Stall => None,
    }
  }
}

impl Reply {
  fn clone_reply(&self) -> Reply {
    match self {
      Reply::Records(r) => Reply::Records(r.clone()),
      Reply::Fail(e) => Reply::Fail(e.clone()),
      Reply::Stall => Reply::Stall,
    }
  }
}

impl Gateway for ScriptedGateway {
  async fn fetch(&self, name: &str, _: &ClientConfig) -> Result<Vec<TorrentRecord>, GatewayError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match self.next_reply(name) {
      Some(reply) => reply,
      None => std::future::pending().await,
    }
  }
}
