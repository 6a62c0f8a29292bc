//! Policy resolver that orchestrates local lookups with remote fetching.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use super::cancel::CancelHandle;
use super::policy::PolicyKind;
use super::storage::LocalStore;
use super::traits::{CacheEntry, Payload, ResolutionResult};
use crate::error::ResolveError;
use crate::remote::RemoteFetcher;

type KeyLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Decides, per call, whether to serve from the local store, fetch
/// remotely, or both, and how to update the store afterward.
///
/// The resolver keeps no state between calls. Concurrent calls for the
/// same key race on the store (last write wins) unless the resolver was
/// built with [`serialized`](Self::serialized).
pub struct CachePolicyResolver<F: RemoteFetcher, S: LocalStore> {
  fetcher: Arc<F>,
  store: Arc<S>,
  key_locks: Option<Arc<KeyLocks>>,
}

impl<F: RemoteFetcher, S: LocalStore> CachePolicyResolver<F, S> {
  /// Create a new resolver over the given fetcher and store.
  pub fn new(fetcher: F, store: S) -> Self {
    Self {
      fetcher: Arc::new(fetcher),
      store: Arc::new(store),
      key_locks: None,
    }
  }

  /// Hold a per-key lock across each read-decide-write sequence.
  pub fn serialized(mut self) -> Self {
    self.key_locks = Some(Arc::new(Mutex::new(HashMap::new())));
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Resolve `key` under `policy`.
  ///
  /// `expected_version` is required by `LocalThenRemote` and ignored by
  /// every other policy. Failures are tagged in the returned result.
  pub async fn resolve(
    &self,
    key: &str,
    policy: PolicyKind,
    expected_version: Option<u64>,
  ) -> ResolutionResult {
    self
      .resolve_with_cancel(key, policy, expected_version, &CancelHandle::new())
      .await
  }

  /// Like [`resolve`](Self::resolve), abandoning the call once `cancel` fires.
  ///
  /// A cancelled call stops waiting on the fetcher and never writes to the
  /// store afterward.
  pub async fn resolve_with_cancel(
    &self,
    key: &str,
    policy: PolicyKind,
    expected_version: Option<u64>,
    cancel: &CancelHandle,
  ) -> ResolutionResult {
    if cancel.is_cancelled() {
      return ResolutionResult::failed(ResolveError::Cancelled);
    }

    let expected = match (policy.is_versioned(), expected_version) {
      (true, None) => return ResolutionResult::failed(ResolveError::MissingVersion),
      (_, version) => version.unwrap_or_default(),
    };

    // Released on drop, including when the caller abandons this future
    let _lease = match self.lock_key(key, cancel).await {
      Ok(lease) => lease,
      Err(err) => return ResolutionResult::failed(err),
    };

    let result = match policy {
      PolicyKind::NoCache => self.no_cache(key, cancel).await,
      PolicyKind::PreferRemote => self.prefer_remote(key, cancel).await,
      PolicyKind::PreferLocal => self.prefer_local(key, cancel).await,
      PolicyKind::LocalThenRemote => self.local_then_remote(key, expected, cancel).await,
    };

    debug!(
      key,
      %policy,
      source = ?result.source,
      stale = result.stale,
      error = ?result.error,
      "resolved"
    );
    result
  }

  async fn no_cache(&self, key: &str, cancel: &CancelHandle) -> ResolutionResult {
    match self.fetch(key, cancel).await {
      Ok(value) => ResolutionResult::remote(value, None, false),
      Err(err) => ResolutionResult::failed(err),
    }
  }

  async fn prefer_remote(&self, key: &str, cancel: &CancelHandle) -> ResolutionResult {
    match self.fetch(key, cancel).await {
      Ok(value) => ResolutionResult::remote(value, None, false),
      Err(ResolveError::Cancelled) => ResolutionResult::failed(ResolveError::Cancelled),
      Err(err) => match self.read(key) {
        Some(entry) => {
          warn!(key, error = %err, "remote fetch failed, serving stale local value");
          ResolutionResult::local(entry, true)
        }
        None => {
          debug!(key, error = %err, "remote fetch failed and nothing stored");
          ResolutionResult::failed(ResolveError::NoDataAvailable)
        }
      },
    }
  }

  async fn prefer_local(&self, key: &str, cancel: &CancelHandle) -> ResolutionResult {
    if let Some(entry) = self.read(key) {
      return ResolutionResult::local(entry, false);
    }

    match self.fetch(key, cancel).await {
      Ok(value) => self.write(key, value, 1, cancel),
      Err(ResolveError::Cancelled) => ResolutionResult::failed(ResolveError::Cancelled),
      Err(err) => {
        debug!(key, error = %err, "remote fetch failed and nothing stored");
        ResolutionResult::failed(ResolveError::NoDataAvailable)
      }
    }
  }

  async fn local_then_remote(
    &self,
    key: &str,
    expected: u64,
    cancel: &CancelHandle,
  ) -> ResolutionResult {
    let cached = self.read(key);

    if let Some(entry) = &cached {
      if entry.version >= expected {
        return ResolutionResult::local(entry.clone(), false);
      }
      debug!(key, stored = entry.version, expected, "stored version is outdated");
    }

    match self.fetch(key, cancel).await {
      Ok(value) => self.write(key, value, expected, cancel),
      Err(ResolveError::Cancelled) => ResolutionResult::failed(ResolveError::Cancelled),
      Err(err) => match cached {
        Some(entry) => {
          warn!(key, error = %err, "refresh failed, serving stale local value");
          ResolutionResult::local(entry, true)
        }
        None => {
          debug!(key, error = %err, "remote fetch failed and nothing stored");
          ResolutionResult::failed(ResolveError::NoDataAvailable)
        }
      },
    }
  }

  /// Await the fetcher unless the caller cancels first.
  async fn fetch(&self, key: &str, cancel: &CancelHandle) -> Result<Payload, ResolveError> {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(ResolveError::Cancelled),
      result = self.fetcher.fetch(key) => result.map_err(ResolveError::from),
    }
  }

  /// Read failures count as a miss.
  fn read(&self, key: &str) -> Option<CacheEntry> {
    match self.store.get(key) {
      Ok(entry) => entry,
      Err(err) => {
        warn!(key, error = %err, "local store read failed, treating as miss");
        None
      }
    }
  }

  /// Persist a fetched value and build the remote result.
  fn write(
    &self,
    key: &str,
    value: Payload,
    version: u64,
    cancel: &CancelHandle,
  ) -> ResolutionResult {
    if cancel.is_cancelled() {
      return ResolutionResult::failed(ResolveError::Cancelled);
    }

    // Never move a key's version backwards
    if let Some(current) = self.read(key) {
      if current.version > version {
        debug!(
          key,
          stored = current.version,
          version,
          "newer version already stored, skipping write"
        );
        return ResolutionResult::remote(value, Some(version), false);
      }
    }

    match self.store.set(key, &value, version) {
      Ok(()) => ResolutionResult::remote(value, Some(version), true),
      Err(err) => {
        warn!(key, error = %err, "failed to persist fetched value");
        ResolutionResult::remote(value, Some(version), false)
      }
    }
  }

  async fn lock_key(
    &self,
    key: &str,
    cancel: &CancelHandle,
  ) -> Result<Option<KeyLease>, ResolveError> {
    let Some(locks) = &self.key_locks else {
      return Ok(None);
    };

    let lock = {
      let mut map = locks.lock().unwrap_or_else(|e| e.into_inner());
      Arc::clone(map.entry(key.to_string()).or_default())
    };

    // Created before waiting so an abandoned waiter still cleans up
    let mut lease = KeyLease {
      locks: Arc::clone(locks),
      key: key.to_string(),
      lock: Some(Arc::clone(&lock)),
      guard: None,
    };

    let guard = tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      guard = lock.lock_owned() => Some(guard),
    };

    match guard {
      Some(guard) => {
        lease.guard = Some(guard);
        lease.lock = None;
        Ok(Some(lease))
      }
      None => Err(ResolveError::Cancelled),
    }
  }
}

/// Holds (or waits for) a per-key lock and removes the map entry once
/// nobody else holds or awaits it.
struct KeyLease {
  locks: Arc<KeyLocks>,
  key: String,
  lock: Option<Arc<tokio::sync::Mutex<()>>>,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLease {
  fn drop(&mut self) {
    self.guard.take();
    self.lock.take();

    let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
    if map.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
      map.remove(&self.key);
    }
  }
}

impl<F: RemoteFetcher, S: LocalStore> Clone for CachePolicyResolver<F, S> {
  fn clone(&self) -> Self {
    Self {
      fetcher: Arc::clone(&self.fetcher),
      store: Arc::clone(&self.store),
      key_locks: self.key_locks.clone(),
    }
  }
}
