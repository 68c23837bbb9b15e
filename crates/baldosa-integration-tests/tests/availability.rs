//! Integration test: availability bitmaps and the republish pipeline.
//!
//! Exercises the read side against purchases:
//! 1. A cached chunk lags a purchase until the worker refreshes it
//! 2. Chunk resolution at boundaries and for negative coordinates
//! 3. A full republish queue drops tasks without failing purchases, and
//!    the next accepted task still publishes every committed cell
//!
//! Uses baldosa-map (cache, purchase, republish, blob) over baldosa-db.

use std::sync::Arc;
use std::time::Duration;

use baldosa_map::blob::{snapshot_key, MemoryBlobStore};
use baldosa_map::cache::AvailabilityMap;
use baldosa_map::ledger::{Ledger, SqliteLedger};
use baldosa_map::purchase::PurchaseCoordinator;
use baldosa_map::republish::{self, RepublishWorker};
use baldosa_types::{ChunkOrigin, Coords, BITMAP_BYTES};
use tokio::sync::broadcast;

struct Market {
    ledger: Arc<SqliteLedger>,
    map: Arc<AvailabilityMap>,
    published: Arc<MemoryBlobStore>,
    coordinator: PurchaseCoordinator,
    worker: RepublishWorker,
    queue: republish::RepublishQueue,
}

async fn market(queue_capacity: usize) -> Market {
    let ledger = Arc::new(SqliteLedger::open_memory().expect("ledger"));
    ledger
        .create_user("alice@example.com", "hash", 1_000)
        .await
        .expect("alice");
    let map = Arc::new(AvailabilityMap::new(ledger.clone()));
    let published = Arc::new(MemoryBlobStore::new("published"));
    let (queue, receiver) = republish::queue(queue_capacity);
    let worker = RepublishWorker::new(receiver, map.clone(), published.clone());
    let coordinator = PurchaseCoordinator::new(ledger.clone(), queue.clone(), 10);
    Market {
        ledger,
        map,
        published,
        coordinator,
        worker,
        queue,
    }
}

fn bit_set(bytes: &[u8], ex: usize, ey: usize) -> bool {
    let index = ex + ey * 256;
    bytes[index / 8] & (1 << (index % 8)) != 0
}

#[tokio::test]
async fn test_stale_read_then_refresh() {
    let m = market(16).await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let before = m.map.chunk_bitmap(5, 5).await.expect("bitmap");
    assert!(!before.is_owned(Coords::new(5, 5)));

    m.coordinator
        .purchase("alice@example.com", Coords::new(5, 5))
        .await
        .expect("purchase");

    // Nothing has run the queue yet: the cached bitmap is stale.
    let stale = m.map.chunk_bitmap(0, 0).await.expect("bitmap");
    assert!(!stale.is_owned(Coords::new(5, 5)));

    let handle = tokio::spawn(m.worker.run(shutdown_rx));
    let key = snapshot_key(ChunkOrigin::containing(0, 0));
    let mut snapshot = None;
    for _ in 0..200 {
        snapshot = m.published.get(&key).await;
        if snapshot.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let snapshot = snapshot.expect("snapshot published");
    assert_eq!(snapshot.len(), BITMAP_BYTES);
    assert!(bit_set(&snapshot, 5, 5));

    let fresh = m.map.chunk_bitmap(0, 0).await.expect("bitmap");
    assert!(fresh.is_owned(Coords::new(5, 5)));
    assert_eq!(fresh.as_bytes(), &snapshot[..]);

    shutdown_tx.send(()).expect("shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker stopped")
        .expect("join");
}

#[tokio::test]
async fn test_boundary_and_negative_chunks() {
    let mut m = market(16).await;
    for (x, y) in [(300, 10), (255, 10), (-1, -1), (-256, -256), (-257, 0)] {
        m.coordinator
            .purchase("alice@example.com", Coords::new(x, y))
            .await
            .expect("purchase");
    }
    assert_eq!(m.worker.drain().await, 5);

    let east = m.published.get("maps-256-0.bin").await.expect("east chunk");
    assert!(bit_set(&east, 44, 10));
    assert_eq!(east.iter().map(|b| b.count_ones()).sum::<u32>(), 1);

    let west = m.published.get("maps-0-0.bin").await.expect("home chunk");
    assert!(bit_set(&west, 255, 10));

    let south_west = m
        .published
        .get("maps--256--256.bin")
        .await
        .expect("negative chunk");
    assert!(bit_set(&south_west, 255, 255));
    assert!(bit_set(&south_west, 0, 0));

    let far_west = m.published.get("maps--512-0.bin").await.expect("far west chunk");
    assert!(bit_set(&far_west, 255, 0));
}

#[tokio::test]
async fn test_full_queue_drops_but_purchases_commit() {
    let mut m = market(2).await;
    for x in 0..5 {
        m.coordinator
            .purchase("alice@example.com", Coords::new(x, 3))
            .await
            .expect("purchase commits regardless of queue");
    }
    assert_eq!(m.queue.stats().accepted(), 2);
    assert_eq!(m.queue.stats().dropped(), 3);
    assert_eq!(
        m.ledger
            .get_user("alice@example.com")
            .await
            .expect("alice")
            .coins,
        950
    );

    // Each task recomputes the whole chunk from the ledger, so the accepted
    // ones cover the dropped cells too.
    assert_eq!(m.worker.drain().await, 2);
    let snapshot = m.published.get("maps-0-0.bin").await.expect("snapshot");
    for x in 0..5 {
        assert!(bit_set(&snapshot, x, 3), "cell ({x}, 3) missing");
    }
}
