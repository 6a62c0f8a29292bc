//! Core types for the caching system.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::ResolveError;

/// Opaque payload as deserialized from a remote response body.
pub type Payload = serde_json::Value;

/// A stored value together with its version tag.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub key: String,
  pub value: Payload,
  /// Monotonically non-decreasing per key as seen by one client
  pub version: u64,
  /// When the value was written to the store
  pub fetched_at: DateTime<Utc>,
}

/// Indicates where resolved data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Fresh data from the remote fetcher
  Remote,
  /// Data served from the local store
  Local,
  /// Nothing could be served
  None,
}

/// Outcome of a single resolution, including metadata about the source.
///
/// Failures never escape as `Err`; they are tagged in `error`.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
  pub value: Option<Payload>,
  pub source: Source,
  pub error: Option<ResolveError>,
  /// Served from the store after a remote failure
  pub stale: bool,
  /// False when a fetched value could not be written back
  pub persisted: bool,
  /// Version of the served local entry, or the version written for a remote value
  pub version: Option<u64>,
}

impl ResolutionResult {
  /// Fresh remote data. `version` is the version written to the store, if any.
  pub fn remote(value: Payload, version: Option<u64>, persisted: bool) -> Self {
    Self {
      value: Some(value),
      source: Source::Remote,
      error: None,
      stale: false,
      persisted,
      version,
    }
  }

  /// Data served from the store.
  pub fn local(entry: CacheEntry, stale: bool) -> Self {
    Self {
      value: Some(entry.value),
      source: Source::Local,
      error: None,
      stale,
      persisted: true,
      version: Some(entry.version),
    }
  }

  /// No data; the reason is carried in `error`.
  pub fn failed(error: ResolveError) -> Self {
    Self {
      value: None,
      source: Source::None,
      error: Some(error),
      stale: false,
      persisted: false,
      version: None,
    }
  }

  pub fn is_ok(&self) -> bool {
    self.error.is_none()
  }

  /// Decode the payload into a concrete type.
  pub fn decode<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
    self
      .value
      .as_ref()
      .map(|v| serde_json::from_value(v.clone()))
  }
}
