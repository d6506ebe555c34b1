//! [`QbittorrentGateway`]: the [`Gateway`] implementation over the qBittorrent
//! WebUI API.
//!
//! Each fetch logs in afresh and forwards the session cookies from the login
//! response to `torrents/info`. No cookie jar is shared between fetches, so
//! two clients on the same host never see each other's sessions.

use std::time::Duration;

use qtc_core::{
  config::ClientConfig,
  gateway::{Gateway, GatewayError},
  record::TorrentRecord,
};
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum Error {
  #[error("could not build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Gateway ─────────────────────────────────────────────────────────────────

pub struct QbittorrentGateway {
  http:    Client,
  timeout: Duration,
}

impl QbittorrentGateway {
  /// Build a gateway whose every request is bounded by `timeout`.
  pub fn new(timeout: Duration) -> Result<Self> {
    let http = Client::builder().timeout(timeout).build()?;
    Ok(Self { http, timeout })
  }

  fn transport(&self, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
      GatewayError::Timeout(self.timeout)
    } else {
      GatewayError::Fetch(e.to_string())
    }
  }

  /// Log in and return the `Cookie` header value for the new session.
  async fn login(&self, base: &str, client: &ClientConfig) -> Result<String, GatewayError> {
    let params = [
      ("username", client.credentials.username.as_str()),
      ("password", client.credentials.password.as_str()),
    ];
    let resp = self
      .http
      .post(format!("{base}/auth/login"))
      .form(&params)
      .send()
      .await
      .map_err(|e| self.transport(e))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(GatewayError::Auth(format!("login returned HTTP {status}")));
    }

    let cookies: Vec<String> =
      resp.cookies().map(|c| format!("{}={}", c.name(), c.value())).collect();
    let body = resp.text().await.map_err(|e| self.transport(e))?;
    if body.trim() == "Fails." {
      return Err(GatewayError::Auth("invalid credentials".into()));
    }
    Ok(cookies.join("; "))
  }

  async fn torrents(&self, base: &str, cookie: &str) -> Result<Vec<TorrentRecord>, GatewayError> {
    let mut req = self.http.get(format!("{base}/torrents/info"));
    if !cookie.is_empty() {
      req = req.header(header::COOKIE, cookie);
    }
    let resp = req.send().await.map_err(|e| self.transport(e))?;

    match resp.status() {
      s if s.is_success() => {}
      StatusCode::FORBIDDEN => {
        return Err(GatewayError::Fetch("torrent list refused the session (HTTP 403)".into()));
      }
      s => return Err(GatewayError::Fetch(format!("torrent list returned HTTP {s}"))),
    }

    let body: Value = resp.json().await.map_err(|e| {
      if e.is_timeout() {
        GatewayError::Timeout(self.timeout)
      } else {
        GatewayError::Fetch(format!("torrent list is not JSON: {e}"))
      }
    })?;
    parse_torrents(body)
  }
}

/// Turn a `torrents/info` body into records, one per torrent object.
fn parse_torrents(body: Value) -> Result<Vec<TorrentRecord>, GatewayError> {
  let Value::Array(items) = body else {
    return Err(GatewayError::Fetch("torrent list is not a JSON array".into()));
  };
  items
    .into_iter()
    .map(|item| match item {
      Value::Object(object) => Ok(TorrentRecord::from_json(object)),
      other => Err(GatewayError::Fetch(format!("torrent entry is not an object: {other}"))),
    })
    .collect()
}

impl Gateway for QbittorrentGateway {
  async fn fetch(&self, name: &str, client: &ClientConfig) -> Result<Vec<TorrentRecord>, GatewayError> {
    let base = client.url.trim_end_matches('/');
    let cookie = self.login(base, client).await?;
    debug!(client = name, "logged in");
    let records = self.torrents(base, &cookie).await?;
    debug!(client = name, torrents = records.len(), "torrent list fetched");
    Ok(records)
  }
}
