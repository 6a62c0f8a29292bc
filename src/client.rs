//! HTTP client with transparent, policy-driven caching.

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::cache::{
  CachePolicyResolver, CancelHandle, LocalStore, MemoryStore, NoopStore, PolicyKind,
  ResolutionResult, SqliteStore,
};
use crate::config::{Config, StorageBackend, StorageConfig};
use crate::error::StorageError;
use crate::remote::{HttpFetcher, RemoteFetcher};

/// Shared store handle chosen at runtime from configuration.
pub type SharedStore = Arc<dyn LocalStore>;

/// Remote client wired to a local store through the policy resolver.
///
/// Every lookup goes through [`CachePolicyResolver`], so the same key can be
/// read with different policies depending on how fresh the caller needs it.
pub struct CachedClient<F: RemoteFetcher = HttpFetcher> {
  resolver: CachePolicyResolver<F, SharedStore>,
  default_policy: PolicyKind,
}

impl CachedClient<HttpFetcher> {
  /// Create a new cached client from configuration.
  pub fn new(config: &Config) -> Result<Self> {
    let fetcher = HttpFetcher::from_config(config)?;
    let store = open_store(&config.storage)?;
    Ok(Self::with_parts(
      fetcher,
      store,
      config.default_policy,
      config.storage.serialize_per_key,
    ))
  }
}

impl<F: RemoteFetcher> CachedClient<F> {
  pub fn with_parts(
    fetcher: F,
    store: SharedStore,
    default_policy: PolicyKind,
    serialize_per_key: bool,
  ) -> Self {
    let resolver = CachePolicyResolver::new(fetcher, store);
    let resolver = if serialize_per_key {
      resolver.serialized()
    } else {
      resolver
    };

    Self {
      resolver,
      default_policy,
    }
  }

  pub fn resolver(&self) -> &CachePolicyResolver<F, SharedStore> {
    &self.resolver
  }

  pub fn default_policy(&self) -> PolicyKind {
    self.default_policy
  }

  /// Resolve with the configured default policy.
  pub async fn get(&self, key: &str) -> ResolutionResult {
    self.resolver.resolve(key, self.default_policy, None).await
  }

  /// Resolve with an explicit policy.
  pub async fn get_with(&self, key: &str, policy: PolicyKind) -> ResolutionResult {
    self.resolver.resolve(key, policy, None).await
  }

  /// Serve the stored value while it is at least `version`, else refetch.
  pub async fn get_versioned(&self, key: &str, version: u64) -> ResolutionResult {
    self
      .resolver
      .resolve(key, PolicyKind::LocalThenRemote, Some(version))
      .await
  }

  /// Resolve with an explicit policy, abandoning the call on `cancel`.
  pub async fn get_cancellable(
    &self,
    key: &str,
    policy: PolicyKind,
    version: Option<u64>,
    cancel: &CancelHandle,
  ) -> ResolutionResult {
    self
      .resolver
      .resolve_with_cancel(key, policy, version, cancel)
      .await
  }

  /// Resolve and decode into `T`, turning a tagged failure into an error.
  pub async fn get_json<T: DeserializeOwned>(&self, key: &str, policy: PolicyKind) -> Result<T> {
    let result = self.get_with(key, policy).await;
    if let Some(err) = &result.error {
      return Err(eyre!("Failed to resolve {}: {}", key, err));
    }

    match result.decode::<T>() {
      Some(decoded) => decoded.map_err(|e| eyre!("Failed to decode {}: {}", key, e)),
      None => Err(eyre!("No value resolved for {}", key)),
    }
  }

  /// Resolve several keys concurrently with the same policy.
  pub async fn get_many(&self, keys: &[&str], policy: PolicyKind) -> Vec<ResolutionResult> {
    futures::future::join_all(keys.iter().map(|key| self.get_with(key, policy))).await
  }

  /// Drop the stored value for `key` (write operation - not cached).
  pub fn invalidate(&self, key: &str) -> Result<(), StorageError> {
    tracing::debug!(key, "invalidating cached value");
    self.resolver.store().delete(key)
  }
}

impl<F: RemoteFetcher> Clone for CachedClient<F> {
  fn clone(&self) -> Self {
    Self {
      resolver: self.resolver.clone(),
      default_policy: self.default_policy,
    }
  }
}

/// Open the store selected by configuration.
pub fn open_store(config: &StorageConfig) -> Result<SharedStore> {
  let store: SharedStore = match config.backend {
    StorageBackend::Sqlite => {
      let sqlite = match &config.path {
        Some(path) => SqliteStore::open_at(path),
        None => SqliteStore::open(),
      };
      Arc::new(sqlite.map_err(|e| eyre!("Failed to open cache store: {}", e))?)
    }
    StorageBackend::Memory => Arc::new(MemoryStore::new()),
    StorageBackend::None => Arc::new(NoopStore),
  };
  Ok(store)
}
