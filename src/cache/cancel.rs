//! Cooperative cancellation for in-flight resolutions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cloneable handle a caller uses to abandon a resolution.
///
/// Once cancelled, the resolver stops waiting on the fetcher and performs
/// no further writes to the store.
#[derive(Clone, Default)]
pub struct CancelHandle {
  inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
  cancelled: AtomicBool,
  notify: Notify,
}

impl CancelHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.inner.cancelled.store(true, Ordering::SeqCst);
    self.inner.notify.notify_waiters();
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::SeqCst)
  }

  /// Completes once `cancel` has been called.
  pub async fn cancelled(&self) {
    loop {
      let notified = self.inner.notify.notified();
      tokio::pin!(notified);
      // Register before checking the flag so a concurrent cancel is not missed
      notified.as_mut().enable();
      if self.is_cancelled() {
        return;
      }
      notified.await;
    }
  }
}

impl std::fmt::Debug for CancelHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CancelHandle")
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}
