//! Shared concurrency budget for heavy operations.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A cloneable handle to the process-wide job slot pool.
///
/// Every container read, loudness measurement and container write acquires
/// one slot for its duration, bounding total concurrent I/O and CPU work no
/// matter how many logical tracks and albums are in flight. Waiting tasks
/// are unbounded; only running work is limited.
#[derive(Debug, Clone)]
pub struct JobSlots {
    permits: Arc<Semaphore>,
}

impl JobSlots {
    /// Create a pool with `jobs` slots (at least one).
    pub fn new(jobs: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(jobs.max(1))),
        }
    }

    /// Acquire one slot, waiting until one is free. The slot is released
    /// when the returned permit drops, including on error paths.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // the semaphore is never closed
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("job slot pool closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_bound_concurrent_holders() {
        let slots = JobSlots::new(2);
        let first = slots.acquire().await;
        let _second = slots.acquire().await;

        // a third acquire must wait until a permit drops
        let third = tokio::time::timeout(std::time::Duration::from_millis(20), slots.acquire());
        assert!(third.await.is_err());

        drop(first);
        let reacquired =
            tokio::time::timeout(std::time::Duration::from_millis(20), slots.acquire());
        assert!(reacquired.await.is_ok());
    }

    #[tokio::test]
    async fn zero_requested_jobs_still_provides_one_slot() {
        let slots = JobSlots::new(0);
        let _permit = slots.acquire().await;
    }
}
