//! Error kinds surfaced by the fetch, storage and resolution layers.

/// Failure reported by a [`RemoteFetcher`](crate::remote::RemoteFetcher).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// Transport-level failure: connectivity loss, DNS, timeout.
  #[error("network error: {0}")]
  Network(String),

  /// The remote answered with a non-2xx status.
  #[error("http status {code}")]
  HttpStatus { code: u16 },
}

/// Failure reported by a [`LocalStore`](crate::cache::LocalStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
  #[error("storage backend failure: {0}")]
  Backend(String),

  #[error("failed to (de)serialize cached value: {0}")]
  Serialization(String),

  #[error("lock poisoned: {0}")]
  LockPoisoned(String),
}

impl From<rusqlite::Error> for StorageError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Backend(e.to_string())
  }
}

impl From<serde_json::Error> for StorageError {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

/// Tagged error carried in a [`ResolutionResult`](crate::cache::ResolutionResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// Neither the remote nor the local store could supply a value.
  #[error("no data available from remote or local store")]
  NoDataAvailable,

  /// `LocalThenRemote` was requested without an expected version.
  #[error("local-then-remote requires an expected version")]
  MissingVersion,

  /// The caller cancelled the resolution before it completed.
  #[error("resolution cancelled")]
  Cancelled,
}
