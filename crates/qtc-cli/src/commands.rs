//! Subcommand implementations.

use std::{process::ExitCode, time::Duration};

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use qtc_core::{
  Error,
  config::PollConfig,
  poll::{CycleSummary, PollOutcome, Poller},
  record::{FieldValue, TorrentRecord},
  store::{Repository, SchemaState},
};
use qtc_gateway::QbittorrentGateway;
use qtc_store_sqlite::SqliteStore;
use tracing::{error, info};

/// Columns shown by `history` when not emitting JSON.
const HISTORY_COLUMNS: [&str; 6] =
  ["timestamp", "client", "ratio", "uploaded", "downloaded", "completed"];

/// Labelled static fields shown by `show`, in display order.
const SHOW_FIELDS: [(&str, &str); 12] = [
  ("Client", "client"),
  ("Hash", "hash"),
  ("Torrent Name", "name"),
  ("Total Size", "total_size"),
  ("Tracker", "tracker"),
  ("Date Added", "added_on"),
  ("Magnet Link", "magnet_uri"),
  ("Date Completed", "completion_on"),
  ("Save Path", "save_path"),
  ("Category", "category"),
  ("Tags", "tags"),
  ("State", "state"),
];

/// Labelled fields of the latest observation shown by `show`.
const SHOW_METRICS: [(&str, &str); 4] = [
  ("Downloaded", "downloaded"),
  ("Uploaded", "uploaded"),
  ("Ratio", "ratio"),
  ("Last Seen", "timestamp"),
];

const SIZE_FIELDS: [&str; 7] = [
  "total_size",
  "size",
  "completed",
  "downloaded",
  "uploaded",
  "downloaded_session",
  "uploaded_session",
];

const TIME_FIELDS: [&str; 4] = ["added_on", "completion_on", "last_activity", "seen_complete"];

// ─── Polling ──────────────────────────────────────────────────────────────────

/// Open the store for polling, creating its directory and file if needed.
async fn open_store(config: &PollConfig) -> Result<SqliteStore> {
  let path = &config.store_path;
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open store at {}", path.display()))
}

async fn poller(config: PollConfig) -> Result<Poller<SqliteStore, QbittorrentGateway>> {
  let store = open_store(&config).await?;
  let gateway = QbittorrentGateway::new(config.fetch_timeout())?;
  Ok(Poller::new(store, gateway, config)?)
}

fn report(summary: &CycleSummary) {
  println!(
    "{}: {} fetched, {} new, {} replaced, {} updated, {} unchanged",
    summary.stamp,
    summary.fetched,
    summary.new,
    summary.replaced,
    summary.updated,
    summary.unchanged,
  );
  for failure in &summary.failures {
    eprintln!("client {}: {}", failure.client, failure.error);
  }
}

pub async fn poll(config: PollConfig) -> Result<ExitCode> {
  let poller = poller(config).await?;
  match poller.run().await.context("poll cycle failed")? {
    PollOutcome::Throttled { last, retry_in } => {
      println!("throttled: last poll at {last}, next allowed in {}s", retry_in.as_secs());
      Ok(ExitCode::SUCCESS)
    }
    PollOutcome::Completed(summary) => {
      report(&summary);
      Ok(if summary.is_clean() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
  }
}

/// How long `watch` sleeps after a cycle, or the error that ends it.
fn next_wait(result: qtc_core::Result<PollOutcome>, interval: Duration) -> Result<Duration> {
  match result {
    Ok(PollOutcome::Completed(summary)) => {
      report(&summary);
      Ok(interval)
    }
    Ok(PollOutcome::Throttled { retry_in, .. }) => Ok(retry_in),
    // A failed write aborts only that cycle; the next one retries.
    Err(e @ Error::Store(_)) => {
      error!(error = %e, "poll cycle failed");
      Ok(interval)
    }
    Err(e) => Err(e).context("poll cycle failed"),
  }
}

pub async fn watch(config: PollConfig) -> Result<ExitCode> {
  let poller = poller(config).await?;
  let interval = poller.config().interval();
  info!(interval_secs = interval.as_secs(), "watching");

  loop {
    let wait = next_wait(poller.run().await, interval)?;

    tokio::select! {
      _ = tokio::time::sleep(wait.max(Duration::from_secs(1))) => {}
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted; stopping");
        return Ok(ExitCode::SUCCESS);
      }
    }
  }
}

// ─── Inspection ───────────────────────────────────────────────────────────────

pub async fn clients(config: &PollConfig) -> Result<ExitCode> {
  for (name, client) in &config.clients {
    let state = if config.is_enabled(name) { "enabled" } else { "disabled" };
    println!("{name:<16} {state:<8} {}", client.url);
  }

  // Clients with stored history that have since been removed from the config.
  if config.store_path.exists() {
    let store = open_store(config).await?;
    if store.schema_state().await? == SchemaState::Installed {
      for name in store.client_names().await? {
        if !config.clients.contains_key(&name) {
          println!("{name:<16} {:<8} (history only)", "removed");
        }
      }
    }
  }
  Ok(ExitCode::SUCCESS)
}

/// Open the store for reading. Never creates a file; refuses a store no
/// cycle has run against.
async fn open_existing(config: &PollConfig) -> Result<SqliteStore> {
  let path = &config.store_path;
  if !path.exists() {
    bail!("no store at {}; run `qtc poll` first", path.display());
  }
  let store = open_store(config).await?;
  if store.schema_state().await? != SchemaState::Installed {
    bail!("no snapshot history at {}; run `qtc poll` first", path.display());
  }
  Ok(store)
}

pub async fn torrents(config: &PollConfig, client: &str) -> Result<ExitCode> {
  let store = open_existing(config).await?;
  let rows = store.torrents_for_client(client).await?;
  for row in &rows {
    println!("{}  {}", field(row, "hash"), field(row, "name"));
  }
  Ok(ExitCode::SUCCESS)
}

pub async fn show(config: &PollConfig, hash: &str, client: Option<&str>) -> Result<ExitCode> {
  let store = open_existing(config).await?;
  let rows = store.torrent(hash, client).await?;
  if rows.is_empty() {
    bail!("no stored torrent with hash {hash}");
  }

  for (i, row) in rows.iter().enumerate() {
    if i > 0 {
      println!();
    }
    let latest = match row.client() {
      Some(client) => store.history(hash, Some(client)).await?.pop(),
      None => None,
    };
    for line in detail_lines(row, latest.as_ref()) {
      println!("{line}");
    }
  }
  Ok(ExitCode::SUCCESS)
}

pub async fn history(
  config: &PollConfig,
  hash: &str,
  client: Option<&str>,
  json: bool,
) -> Result<ExitCode> {
  let store = open_existing(config).await?;
  let rows = store.history(hash, client).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&rows)?);
    return Ok(ExitCode::SUCCESS);
  }

  println!("{}", HISTORY_COLUMNS.join("\t"));
  for row in &rows {
    let cells: Vec<String> = HISTORY_COLUMNS.iter().map(|c| field(row, c)).collect();
    println!("{}", cells.join("\t"));
  }
  Ok(ExitCode::SUCCESS)
}

// ─── Formatting ───────────────────────────────────────────────────────────────

/// `Label: value` lines for one static row and its latest observation.
fn detail_lines(row: &TorrentRecord, latest: Option<&TorrentRecord>) -> Vec<String> {
  let mut lines: Vec<String> = SHOW_FIELDS
    .iter()
    .map(|(label, name)| format!("{label:<15} {}", field(row, name)))
    .collect();
  if let Some(latest) = latest {
    lines.extend(
      SHOW_METRICS
        .iter()
        .map(|(label, name)| format!("{label:<15} {}", field(latest, name))),
    );
  }
  lines
}

fn field(row: &TorrentRecord, name: &str) -> String {
  match row.get(name) {
    Some(value) => render(name, value),
    None => String::new(),
  }
}

fn render(name: &str, value: &FieldValue) -> String {
  match value {
    FieldValue::Integer(n) if SIZE_FIELDS.contains(&name) => human_size(*n),
    FieldValue::Integer(n) if TIME_FIELDS.contains(&name) => human_time(*n),
    _ if name == "ratio" => value.as_f64().map(|r| format!("{r:.3}")).unwrap_or_default(),
    _ => value.to_string(),
  }
}

/// Decimal byte units with two places, e.g. `1.50 GB`.
fn human_size(bytes: i64) -> String {
  let b = bytes as f64;
  if bytes > 1_000_000_000 {
    format!("{:.2} GB", b / 1e9)
  } else if bytes > 1_000_000 {
    format!("{:.2} MB", b / 1e6)
  } else if bytes > 1_000 {
    format!("{:.2} KB", b / 1e3)
  } else {
    format!("{bytes} B")
  }
}

/// A Unix timestamp as UTC; the client reports `0` or `-1` for "never".
fn human_time(secs: i64) -> String {
  if secs <= 0 {
    return "-".to_owned();
  }
  DateTime::from_timestamp(secs, 0)
    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    .unwrap_or_else(|| secs.to_string())
}
