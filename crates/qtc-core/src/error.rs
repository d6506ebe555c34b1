//! Error types for `qtc-core`.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The store cannot be opened or its schema cannot be installed. Fatal to
  /// the cycle; nothing is written.
  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] BoxError),

  /// Any other persistence failure; aborts the current cycle.
  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("configuration error: {0}")]
  Config(String),

  #[error("invalid timestamp: {0:?}")]
  Timestamp(String),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn unavailable(e: impl Into<BoxError>) -> Self { Self::StoreUnavailable(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
