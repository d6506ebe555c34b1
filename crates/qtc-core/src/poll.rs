//! The poll orchestrator.
//!
//! One call to [`Poller::run`] is one poll cycle: ensure the schema, pass the
//! throttle, fetch every enabled client, tag and classify the records, and
//! commit the resulting writes in one transaction.
//!
//! At most one cycle may run against a store at a time. The throttle and the
//! change detector read and then write across several statements, so
//! concurrent cycles could race; callers run cycles sequentially.

use std::{
  collections::{HashMap, HashSet},
  time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::PollConfig,
  detect::{Change, detect},
  fields::{FieldGroup, classify, split},
  gateway::{Gateway, GatewayError},
  record::TorrentRecord,
  store::{CycleWrites, Filter, Repository, SchemaState, Table, install_schema},
  throttle::{Gate, Throttle, encode_stamp},
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// A client that could not be polled this cycle.
#[derive(Debug, Clone)]
pub struct ClientFailure {
  pub client: String,
  pub error:  GatewayError,
}

/// Counts for one admitted cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
  /// The stamp shared by every data row written this cycle.
  pub stamp:      String,
  pub fetched:    usize,
  pub new:        usize,
  pub replaced:   usize,
  pub updated:    usize,
  pub unchanged:  usize,
  /// Records skipped because they lacked a hash or repeated a key.
  pub skipped:    usize,
  pub failures:   Vec<ClientFailure>,
}

impl CycleSummary {
  /// Every enabled client was polled successfully.
  pub fn is_clean(&self) -> bool { self.failures.is_empty() }

  pub fn rows_written(&self) -> usize { self.new + self.replaced + self.updated }
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
  /// Not an error: the previous cycle is too recent.
  Throttled { last: DateTime<Utc>, retry_in: Duration },
  Completed(CycleSummary),
}

// ─── Poller ──────────────────────────────────────────────────────────────────

pub struct Poller<R, G> {
  repo:     R,
  gateway:  G,
  config:   PollConfig,
  throttle: Throttle,
}

impl<R: Repository, G: Gateway> Poller<R, G> {
  pub fn new(repo: R, gateway: G, config: PollConfig) -> Result<Self> {
    config.validate()?;
    let throttle = Throttle::new(config.interval());
    Ok(Self { repo, gateway, config, throttle })
  }

  pub fn repository(&self) -> &R { &self.repo }

  pub fn gateway(&self) -> &G { &self.gateway }

  pub fn config(&self) -> &PollConfig { &self.config }

  /// Run one cycle stamped with the current time.
  pub async fn run(&self) -> Result<PollOutcome> { self.run_at(Utc::now()).await }

  /// Run one cycle as if it started at `now`.
  pub async fn run_at(&self, now: DateTime<Utc>) -> Result<PollOutcome> {
    debug!("poll cycle starting");
    self.ensure_schema().await?;

    match self.throttle.admit(&self.repo, now).await? {
      Gate::Closed { last, remaining } => {
        info!(%last, retry_in = ?remaining, "poll throttled");
        return Ok(PollOutcome::Throttled { last, retry_in: remaining });
      }
      Gate::Open { previous } => debug!(?previous, "poll admitted"),
    }

    let mut summary = CycleSummary { stamp: encode_stamp(now), ..Default::default() };

    let records = self.fetch_all(&summary.stamp, &mut summary.failures).await;
    summary.fetched = records.len();

    let writes = self.reconcile(records, &mut summary).await?;
    if !writes.is_empty() {
      self.repo.commit_cycle(writes).await.map_err(Error::store)?;
    }

    info!(
      stamp = %summary.stamp,
      fetched = summary.fetched,
      new = summary.new,
      replaced = summary.replaced,
      updated = summary.updated,
      unchanged = summary.unchanged,
      failed_clients = summary.failures.len(),
      "poll cycle complete"
    );
    Ok(PollOutcome::Completed(summary))
  }

  /// Install the schema on a fresh store; refuse to touch a partial one.
  async fn ensure_schema(&self) -> Result<()> {
    match self.repo.schema_state().await.map_err(Error::unavailable)? {
      SchemaState::Installed => Ok(()),
      SchemaState::Missing => {
        info!("store is empty; installing schema");
        install_schema(&self.repo).await.map_err(Error::unavailable)
      }
      SchemaState::Partial => {
        Err(Error::unavailable("store holds some but not all tables; refusing to install"))
      }
    }
  }

  /// Fetch every enabled client concurrently and tag the records.
  async fn fetch_all(&self, stamp: &str, failures: &mut Vec<ClientFailure>) -> Vec<TorrentRecord> {
    let timeout = self.config.fetch_timeout();
    let clients = self.config.enabled_clients();

    let results = join_all(clients.into_iter().map(|(name, client)| async move {
      let result = match tokio::time::timeout(timeout, self.gateway.fetch(name, client)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
      };
      (name, result)
    }))
    .await;

    let mut records = Vec::new();
    for (name, result) in results {
      match result {
        Ok(fetched) => {
          debug!(client = name, torrents = fetched.len(), "client fetch succeeded");
          records.extend(fetched.into_iter().map(|mut record| {
            record.insert("timestamp", stamp);
            record.insert("client", name);
            record
          }));
        }
        Err(error) => {
          warn!(client = name, %error, "client fetch failed");
          failures.push(ClientFailure { client: name.to_owned(), error });
        }
      }
    }
    records
  }

  /// Run the change detector over every record and collect the writes.
  async fn reconcile(
    &self,
    records: Vec<TorrentRecord>,
    summary: &mut CycleSummary,
  ) -> Result<CycleWrites> {
    let latest: HashMap<(String, String), TorrentRecord> = self
      .repo
      .latest_observations()
      .await
      .map_err(Error::store)?
      .into_iter()
      .filter_map(|row| Some((row.key()?, row)))
      .collect();

    let mut writes = CycleWrites::default();
    let mut seen = HashSet::new();

    for record in records {
      let Some(key) = record.key() else {
        warn!("record without a hash; skipping");
        summary.skipped += 1;
        continue;
      };
      if !seen.insert(key.clone()) {
        warn!(hash = %key.0, client = %key.1, "hash reported twice by one client; keeping the first");
        summary.skipped += 1;
        continue;
      }

      let prior_static = self
        .repo
        .select_where(Table::Static, Filter::key(key.0.clone(), key.1.clone()))
        .await
        .map_err(Error::store)?
        .into_iter()
        .next();

      let change = detect(&record, prior_static.as_ref(), latest.get(&key));
      debug!(hash = %key.0, client = %key.1, ?change, "change detected");

      match change {
        Change::Unchanged => summary.unchanged += 1,
        Change::MetricUpdate { .. } => {
          summary.updated += 1;
          writes.observations.push(classify(&record, FieldGroup::Data));
        }
        Change::New | Change::Replaced { .. } => {
          if prior_static.is_some() {
            summary.replaced += 1;
            writes.replaced.push(key);
          } else {
            summary.new += 1;
          }
          let (static_row, data_row) = split(&record);
          writes.statics.push(static_row);
          writes.observations.push(data_row);
        }
      }
    }
    Ok(writes)
  }
}
