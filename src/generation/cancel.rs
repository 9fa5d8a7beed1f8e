use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use crate::error::{AppError, Result};

// ============================================================================
// CANCELLATION TOKEN
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: RwLock<bool>,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.write().await;
        *cancelled = true;
        self.inner.notify.notify_waiters();
    }

    pub async fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.read().await
    }

    pub async fn check(&self) -> Result<()> {
        if self.is_cancelled().await {
            Err(AppError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled().await {
                return;
            }
            notified.await;
        }
    }
}
