//! Asynchronous republishing of chunk bitmap snapshots.
//!
//! Producers hold a [`RepublishQueue`]; a single [`RepublishWorker`] drains
//! it. The queue is bounded and **drops on full**: [`RepublishQueue::enqueue`]
//! never waits, and a purchase or edit never fails because its republish was
//! not accepted. Delivery is at most once and best effort. A task whose
//! recompute or upload fails is logged and discarded, with no retry.
//!
//! Each task recomputes the chunk from the ledger (refreshing the in-memory
//! cache as a side effect) and uploads the bitmap to the published bucket
//! under [`snapshot_key`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use baldosa_types::Coords;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::blob::{snapshot_key, BlobStore};
use crate::cache::AvailabilityMap;
use crate::Result;

/// Request to refresh the chunk containing a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepublishTask {
    pub coords: Coords,
}

/// What happened to an enqueued task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// Queue full or worker gone; the task was discarded.
    Dropped,
}

/// Counters for the queue's drop policy.
#[derive(Debug, Default)]
pub struct QueueStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl QueueStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer side of the republish queue. Cheap to clone.
#[derive(Clone)]
pub struct RepublishQueue {
    sender: mpsc::Sender<RepublishTask>,
    stats: Arc<QueueStats>,
}

/// Create a queue holding at most `capacity` pending tasks, plus the
/// receiver to hand to [`RepublishWorker::new`].
pub fn queue(capacity: usize) -> (RepublishQueue, mpsc::Receiver<RepublishTask>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        RepublishQueue {
            sender,
            stats: Arc::new(QueueStats::default()),
        },
        receiver,
    )
}

impl RepublishQueue {
    /// Offer a task without waiting.
    pub fn enqueue(&self, coords: Coords) -> Enqueued {
        match self.sender.try_send(RepublishTask { coords }) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Enqueued::Accepted
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(x = task.coords.x, y = task.coords.y, "republish queue full, dropping task");
                Enqueued::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(x = task.coords.x, y = task.coords.y, "republish worker stopped, dropping task");
                Enqueued::Dropped
            }
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

/// Single consumer of the republish queue.
pub struct RepublishWorker {
    receiver: mpsc::Receiver<RepublishTask>,
    map: Arc<AvailabilityMap>,
    published: Arc<dyn BlobStore>,
}

impl RepublishWorker {
    pub fn new(
        receiver: mpsc::Receiver<RepublishTask>,
        map: Arc<AvailabilityMap>,
        published: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            receiver,
            map,
            published,
        }
    }

    /// Process tasks until `shutdown` fires or every producer is dropped.
    ///
    /// Pending tasks are abandoned on shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(bucket = self.published.bucket(), "republish worker started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("republish worker shutting down");
                    break;
                }
                task = self.receiver.recv() => match task {
                    Some(task) => self.process(task).await,
                    None => {
                        info!("republish queue closed");
                        break;
                    }
                },
            }
        }
    }

    /// Process every task currently queued, without waiting for more.
    /// Returns how many were taken off the queue.
    pub async fn drain(&mut self) -> usize {
        let mut taken = 0;
        while let Ok(task) = self.receiver.try_recv() {
            self.process(task).await;
            taken += 1;
        }
        taken
    }

    async fn process(&self, task: RepublishTask) {
        debug!(x = task.coords.x, y = task.coords.y, "handling republish task");
        match self.handle(task).await {
            Ok(()) => debug!(x = task.coords.x, y = task.coords.y, "republish task handled"),
            Err(e) => error!(
                x = task.coords.x,
                y = task.coords.y,
                error = %e,
                "republish task failed, dropping"
            ),
        }
    }

    /// Recompute the task's chunk and upload its snapshot.
    pub async fn handle(&self, task: RepublishTask) -> Result<()> {
        let bitmap = self.map.recompute(task.coords.chunk()).await?;
        let key = snapshot_key(bitmap.origin());
        self.published.put(&key, bitmap.as_bytes()).await?;
        info!(key = %key, bucket = self.published.bucket(), "bitmap snapshot published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::ledger::{Ledger, SqliteLedger};
    use baldosa_types::{ChunkOrigin, BITMAP_BYTES};

    struct Fixture {
        ledger: Arc<SqliteLedger>,
        map: Arc<AvailabilityMap>,
        published: Arc<MemoryBlobStore>,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(SqliteLedger::open_memory().expect("ledger"));
        ledger
            .create_user("alice@example.com", "hash", 100)
            .await
            .expect("user");
        let map = Arc::new(AvailabilityMap::new(ledger.clone()));
        let published = Arc::new(MemoryBlobStore::new("published"));
        Fixture {
            ledger,
            map,
            published,
        }
    }

    #[tokio::test]
    async fn test_enqueue_drops_when_full() {
        let (queue, _receiver) = queue(2);
        assert_eq!(queue.enqueue(Coords::new(0, 0)), Enqueued::Accepted);
        assert_eq!(queue.enqueue(Coords::new(1, 0)), Enqueued::Accepted);
        assert_eq!(queue.enqueue(Coords::new(2, 0)), Enqueued::Dropped);

        assert_eq!(queue.stats().accepted(), 2);
        assert_eq!(queue.stats().dropped(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_gone() {
        let (queue, receiver) = queue(4);
        drop(receiver);
        assert_eq!(queue.enqueue(Coords::new(0, 0)), Enqueued::Dropped);
    }

    #[tokio::test]
    async fn test_task_uploads_fresh_snapshot() {
        let f = fixture().await;
        f.map.chunk_bitmap(0, 0).await.expect("prime cache");
        f.ledger
            .claim_tile(Coords::new(5, 5), "alice@example.com", 1)
            .await
            .expect("claim");

        let (queue, receiver) = queue(8);
        let mut worker = RepublishWorker::new(receiver, f.map.clone(), f.published.clone());
        queue.enqueue(Coords::new(5, 5));
        assert_eq!(worker.drain().await, 1);

        let snapshot = f.published.get("maps-0-0.bin").await.expect("snapshot");
        assert_eq!(snapshot.len(), BITMAP_BYTES);
        let index = 5 + 5 * 256;
        assert_ne!(snapshot[index / 8] & (1 << (index % 8)), 0);

        // The cache was refreshed too.
        let cached = f.map.cache().get(ChunkOrigin::containing(0, 0)).await.expect("cached");
        assert!(cached.is_owned(Coords::new(5, 5)));
    }

    #[tokio::test]
    async fn test_failed_upload_is_dropped_not_retried() {
        let f = fixture().await;
        f.published.set_failing(true);

        let (queue, receiver) = queue(8);
        let mut worker = RepublishWorker::new(receiver, f.map.clone(), f.published.clone());
        queue.enqueue(Coords::new(1, 1));
        queue.enqueue(Coords::new(300, 300));
        assert_eq!(worker.drain().await, 2);
        assert!(f.published.is_empty().await);

        // Nothing comes back once the store recovers.
        f.published.set_failing(false);
        assert_eq!(worker.drain().await, 0);
        assert!(f.published.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let f = fixture().await;
        let (queue, receiver) = queue(8);
        let worker = RepublishWorker::new(receiver, f.map.clone(), f.published.clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(worker.run(shutdown_rx));
        queue.enqueue(Coords::new(-5, -5));

        // Wait until the worker has handled the task, then stop it.
        for _ in 0..100 {
            if f.published.get("maps--256--256.bin").await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(f.published.get("maps--256--256.bin").await.is_some());

        shutdown_tx.send(()).expect("send shutdown");
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("worker stopped")
            .expect("join");
    }

    #[tokio::test]
    async fn test_run_exits_when_producers_dropped() {
        let f = fixture().await;
        let (queue, receiver) = queue(8);
        let worker = RepublishWorker::new(receiver, f.map.clone(), f.published.clone());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(worker.run(shutdown_rx));
        drop(queue);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("worker stopped")
            .expect("join");
    }
}
