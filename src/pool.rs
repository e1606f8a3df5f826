//! Bounded per-stage worker pools.
//!
//! Each pipeline stage (parsing, embedding, vector store, watch dispatch)
//! gets its own pool so a slow backend cannot starve another stage. A pool
//! runs at most `workers` tasks at once and admits at most
//! `workers + queue` submitted tasks; further submissions either wait
//! ([`StagePool::spawn`]) or are refused ([`StagePool::try_spawn`]).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Returned by [`StagePool::try_spawn`] when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFull;

/// A bounded pool of async workers for one stage.
#[derive(Debug, Clone)]
pub struct StagePool {
    name: &'static str,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    size: usize,
}

impl StagePool {
    /// Create a pool. Zero sizes are bumped to one worker and an empty queue.
    #[must_use]
    pub fn new(name: &'static str, workers: usize, queue: usize) -> Self {
        let workers = workers.max(1);
        Self {
            name,
            workers: Arc::new(Semaphore::new(workers)),
            admission: Arc::new(Semaphore::new(workers + queue)),
            size: workers,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of tasks that may run at the same time.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Run `fut` on the caller's task once a worker slot is free.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        let _permit = self.workers.acquire().await.ok();
        fut.await
    }

    /// Spawn `fut`, waiting for queue space first.
    pub async fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slot = Arc::clone(&self.admission).acquire_owned().await.ok();
        self.spawn_admitted(slot, fut)
    }

    /// Spawn `fut` if the queue has room.
    ///
    /// # Errors
    ///
    /// Returns [`PoolFull`] when `workers + queue` tasks are already admitted.
    pub fn try_spawn<F>(&self, fut: F) -> Result<JoinHandle<F::Output>, PoolFull>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slot = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| PoolFull)?;
        Ok(self.spawn_admitted(Some(slot), fut))
    }

    fn spawn_admitted<F>(&self, slot: Option<OwnedSemaphorePermit>, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let _slot = slot;
            let _permit = workers.acquire_owned().await.ok();
            fut.await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_limits_concurrency() {
        let pool = StagePool::new("test", 2, 0);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..6).map(|_| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let pool = pool.clone();
            async move {
                pool.run(async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }
        });
        futures::future::join_all(tasks).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_try_spawn_refuses_when_full() {
        let pool = StagePool::new("watch", 1, 1);
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        let blocker = |mut rx: tokio::sync::watch::Receiver<bool>| async move {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };

        let first = pool.try_spawn(blocker(release_rx.clone())).unwrap();
        let second = pool.try_spawn(blocker(release_rx.clone())).unwrap();
        assert_eq!(pool.try_spawn(async {}).unwrap_err(), PoolFull);

        release_tx.send(true).unwrap();
        first.await.unwrap();
        second.await.unwrap();

        assert!(pool.try_spawn(async {}).is_ok());
    }

    #[tokio::test]
    async fn test_spawn_returns_output() {
        let pool = StagePool::new("store", 2, 4);
        let handle = pool.spawn(async { 21 * 2 }).await;
        assert_eq!(handle.await.unwrap(), 42);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.name(), "store");
    }
}
