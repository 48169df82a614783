//! Bounded worker pool for webhook processing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore limiting concurrent reconciliations.
///
/// Each webhook holds one permit while it is processed. On shutdown,
/// [`WorkerPool::close_and_drain`] waits for the permits handed out so far to
/// come back, then closes the pool so later requests are refused.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

impl WorkerPool {
    /// Create a pool allowing `max_concurrent` (at least 1) concurrent workers.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = u32::try_from(max_concurrent.max(1)).unwrap_or(u32::MAX);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// Wait for a free slot. Returns `None` once the pool is closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of workers currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        (self.capacity as usize).saturating_sub(self.semaphore.available_permits())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Stop handing out permits and wait up to `timeout` for in-flight work.
    ///
    /// Returns `true` if every worker finished in time. The pool is closed
    /// either way; calling this on a closed pool returns `false`.
    pub async fn close_and_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, self.semaphore.acquire_many(self.capacity)).await;
        self.semaphore.close();
        matches!(drained, Ok(Ok(_)))
    }
}
