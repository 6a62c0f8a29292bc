//! Remote data sources consulted by the resolver.

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::cache::Payload;
use crate::error::FetchError;

/// Performs the network request for a key.
///
/// Timeouts and retries are the fetcher's business; the resolver treats
/// any `Err` as an ordinary fetch failure.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
  async fn fetch(&self, key: &str) -> Result<Payload, FetchError>;
}

#[async_trait]
impl<F: RemoteFetcher + ?Sized> RemoteFetcher for Arc<F> {
  async fn fetch(&self, key: &str) -> Result<Payload, FetchError> {
    (**self).fetch(key).await
  }
}

/// Adapts an async closure into a [`RemoteFetcher`].
pub struct FnFetcher<F> {
  f: F,
}

impl<F, Fut> FnFetcher<F>
where
  F: Fn(String) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Payload, FetchError>> + Send,
{
  pub fn new(f: F) -> Self {
    Self { f }
  }
}

#[async_trait]
impl<F, Fut> RemoteFetcher for FnFetcher<F>
where
  F: Fn(String) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Payload, FetchError>> + Send,
{
  async fn fetch(&self, key: &str) -> Result<Payload, FetchError> {
    (self.f)(key.to_string()).await
  }
}
