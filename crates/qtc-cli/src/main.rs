//! `qtc` — snapshot qBittorrent clients into a local SQLite history.
//!
//! # Usage
//!
//! ```
//! qtc --config ~/.config/qtc/qtc.toml poll
//! qtc watch
//! qtc show 8f3a... --client seedbox
//! qtc history 8f3a... --client seedbox --json
//! ```

mod commands;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qtc_core::config::PollConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "qtc", version, about = "Poll qBittorrent clients and keep a torrent history")]
struct Args {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", env = "QTC_CONFIG", default_value = "qtc.toml")]
  config: PathBuf,

  /// Log at debug level.
  #[arg(long)]
  debug: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one poll cycle.
  Poll,
  /// Run a poll cycle every interval until interrupted.
  Watch,
  /// List the configured clients.
  Clients,
  /// List the stored torrents of one client.
  Torrents {
    client: String,
  },
  /// Print the stored details of one torrent.
  Show {
    hash:   String,
    /// Only the torrent as seen by this client.
    #[arg(long)]
    client: Option<String>,
  },
  /// Print the recorded metrics of one torrent.
  History {
    hash:   String,
    /// Only rows from this client.
    #[arg(long)]
    client: Option<String>,
    /// Emit JSON instead of a table.
    #[arg(long)]
    json:   bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
  let args = Args::parse();

  let mut config = load_config(&args.config)?;
  config.store_path = expand_tilde(&config.store_path);

  let level = if args.debug || config.debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::builder().with_default_directive(level.into()).from_env_lossy())
    .init();

  match args.command {
    Command::Poll => commands::poll(config).await,
    Command::Watch => commands::watch(config).await,
    Command::Clients => commands::clients(&config).await,
    Command::Torrents { client } => commands::torrents(&config, &client).await,
    Command::Show { hash, client } => commands::show(&config, &hash, client.as_deref()).await,
    Command::History { hash, client, json } => {
      commands::history(&config, &hash, client.as_deref(), json).await
    }
  }
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Layer the optional TOML file under `QTC__*` environment variables.
fn load_config(path: &Path) -> Result<PollConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("QTC")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("enabled")
        .try_parsing(true),
    )
    .build()
    .with_context(|| format!("failed to read config from {}", path.display()))?;

  settings
    .try_deserialize()
    .context("failed to deserialise configuration")
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/qtc/qtcdata.db")), Path::new(&home).join("qtc/qtcdata.db"));
  }

  #[test]
  fn plain_paths_are_untouched() {
    assert_eq!(expand_tilde(Path::new("/var/lib/qtc.db")), Path::new("/var/lib/qtc.db"));
    assert_eq!(expand_tilde(Path::new("qtcdata.db")), Path::new("qtcdata.db"));
  }

  #[test]
  fn config_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qtc.toml");
    std::fs::write(&path, r#"
store_path    = "/tmp/qtc.db"
enabled       = ["local"]
interval_secs = 60

[clients.local]
url         = "http://localhost:8080/api/v2/"
credentials = { username = "admin", password = "secret" }

[clients.seedbox]
url         = "https://seedbox.example/api/v2/"
credentials = { username = "me", password = "pw" }
"#)
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.interval_secs, 60);
    assert_eq!(config.fetch_timeout_secs, qtc_core::config::DEFAULT_FETCH_TIMEOUT_SECS);
    assert_eq!(config.clients.len(), 2);
    assert!(config.is_enabled("local"));
    assert!(!config.is_enabled("seedbox"));
    assert_eq!(config.clients["seedbox"].credentials.username, "me");
  }

  #[test]
  fn missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir.path().join("absent.toml")).unwrap();
    assert!(config.clients.is_empty());
    assert_eq!(config.store_path, Path::new("qtcdata.db"));
  }

  #[test]
  fn args_parse_history_flags() {
    let args = Args::parse_from(["qtc", "--debug", "history", "abc", "--client", "local", "--json"]);
    assert!(args.debug);
    assert!(matches!(
      args.command,
      Command::History { ref hash, client: Some(ref c), json: true } if hash == "abc" && c == "local"
    ));
  }

  #[test]
  fn args_parse_show() {
    let args = Args::parse_from(["qtc", "show", "abc"]);
    assert!(matches!(args.command, Command::Show { ref hash, client: None } if hash == "abc"));
  }
}
