//! The `Gateway` trait: fetch the current torrent list from one client.

use std::{future::Future, time::Duration};

use thiserror::Error;

use crate::{config::ClientConfig, record::TorrentRecord};

/// Why a client could not be polled. Always isolated to that client.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
  #[error("authentication rejected: {0}")]
  Auth(String),

  #[error("fetch failed: {0}")]
  Fetch(String),

  #[error("timed out after {0:?}")]
  Timeout(Duration),
}

/// Abstraction over a remote torrent client API.
pub trait Gateway: Send + Sync {
  /// Authenticate against the client called `name` and return its torrent
  /// list, one flat record per torrent. Records are returned as reported;
  /// tagging with client name and timestamp happens in the orchestrator.
  fn fetch<'a>(
    &'a self,
    name: &'a str,
    client: &'a ClientConfig,
  ) -> impl Future<Output = Result<Vec<TorrentRecord>, GatewayError>> + Send + 'a;
}
