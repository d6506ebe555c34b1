//! Poller configuration, deserialised by the binary from TOML + environment.

use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Minimum time between two admitted poll cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 720;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
  pub username: String,
  pub password: String,
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("username", &self.username)
      .field("password", &"<redacted>")
      .finish()
  }
}

/// Connection settings for one remote client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
  /// API root, e.g. `http://localhost:8080/api/v2/`.
  pub url:         String,
  pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  #[serde(default)]
  pub clients:            BTreeMap<String, ClientConfig>,
  /// Names of the clients to poll; every configured client when absent.
  #[serde(default)]
  pub enabled:            Option<Vec<String>>,
  #[serde(default = "default_interval_secs")]
  pub interval_secs:      u64,
  #[serde(default = "default_fetch_timeout_secs")]
  pub fetch_timeout_secs: u64,
  #[serde(default)]
  pub debug:              bool,
}

fn default_store_path() -> PathBuf { PathBuf::from("qtcdata.db") }

fn default_interval_secs() -> u64 { DEFAULT_INTERVAL_SECS }

fn default_fetch_timeout_secs() -> u64 { DEFAULT_FETCH_TIMEOUT_SECS }

impl Default for PollConfig {
  fn default() -> Self {
    Self {
      store_path:         default_store_path(),
      clients:            BTreeMap::new(),
      enabled:            None,
      interval_secs:      DEFAULT_INTERVAL_SECS,
      fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
      debug:              false,
    }
  }
}

impl PollConfig {
  /// Reject configurations the poller cannot run with.
  pub fn validate(&self) -> Result<()> {
    if let Some(enabled) = &self.enabled {
      for name in enabled {
        if !self.clients.contains_key(name) {
          return Err(Error::Config(format!("enabled client {name:?} is not configured")));
        }
      }
    }
    if self.fetch_timeout_secs == 0 {
      return Err(Error::Config("fetch_timeout_secs must be positive".into()));
    }
    Ok(())
  }

  pub fn is_enabled(&self, name: &str) -> bool {
    match &self.enabled {
      Some(enabled) => enabled.iter().any(|n| n == name),
      None => self.clients.contains_key(name),
    }
  }

  /// Enabled clients in configuration order.
  pub fn enabled_clients(&self) -> Vec<(&str, &ClientConfig)> {
    match &self.enabled {
      Some(enabled) => enabled
        .iter()
        .filter_map(|n| self.clients.get_key_value(n))
        .map(|(n, c)| (n.as_str(), c))
        .collect(),
      None => self.clients.iter().map(|(n, c)| (n.as_str(), c)).collect(),
    }
  }

  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs) }

  pub fn fetch_timeout(&self) -> Duration { Duration::from_secs(self.fetch_timeout_secs) }
}
