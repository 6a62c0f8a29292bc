//! Versioned client-side response cache.
//!
//! A [`CachePolicyResolver`](cache::CachePolicyResolver) mediates between a
//! [`RemoteFetcher`](remote::RemoteFetcher) and a
//! [`LocalStore`](cache::LocalStore) under one of four policies.
//! [`CachedClient`] wires an HTTP fetcher and a configured store together.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod remote;

pub use cache::{CachePolicyResolver, CancelHandle, PolicyKind, ResolutionResult, Source};
pub use client::CachedClient;
pub use config::Config;
pub use error::{FetchError, ResolveError, StorageError};
