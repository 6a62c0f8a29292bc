//! Versioned client-side response cache.
//!
//! This module provides the policy resolver that mediates between a remote
//! data source and a local persistent store:
//! - Four named policies: no-cache, prefer-remote, prefer-local, local-then-remote
//! - Integer versions per key, never lowered by the resolver
//! - Stale fallback when the remote is unavailable
//! - Cooperative cancellation that suppresses writes after abandonment

mod cancel;
mod policy;
mod resolver;
mod storage;
mod traits;

pub use cancel::CancelHandle;
pub use policy::PolicyKind;
pub use resolver::CachePolicyResolver;
pub use storage::{LocalStore, MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheEntry, Payload, ResolutionResult, Source};
