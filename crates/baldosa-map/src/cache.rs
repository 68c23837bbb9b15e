//! Chunk availability cache.
//!
//! [`ChunkCache`] owns the chunk → bitmap map and its lock; nothing outside
//! this module touches either. [`AvailabilityMap`] puts the ledger behind it:
//! a miss queries the ledger, encodes the chunk and stores the result.
//!
//! The lock is a single reader/writer lock over the whole map and is never
//! held across ledger I/O. Two concurrent misses on the same chunk both query
//! the ledger and the later write wins; both results are valid snapshots.
//!
//! Entries are never evicted, only overwritten by a recompute.

use std::collections::HashMap;
use std::sync::Arc;

use baldosa_types::ChunkOrigin;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bitmap::{self, Bitmap};
use crate::ledger::Ledger;
use crate::Result;

/// In-memory chunk → bitmap map.
#[derive(Default)]
pub struct ChunkCache {
    entries: RwLock<HashMap<ChunkOrigin, Bitmap>>,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached bitmap for `origin`, if any.
    pub async fn get(&self, origin: ChunkOrigin) -> Option<Bitmap> {
        self.entries.read().await.get(&origin).cloned()
    }

    /// Store or replace the bitmap for its chunk.
    pub async fn put(&self, bitmap: Bitmap) {
        self.entries.write().await.insert(bitmap.origin(), bitmap);
    }

    /// Number of cached chunks.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Ledger-backed availability bitmaps, served from [`ChunkCache`].
pub struct AvailabilityMap {
    ledger: Arc<dyn Ledger>,
    cache: ChunkCache,
}

impl AvailabilityMap {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            cache: ChunkCache::new(),
        }
    }

    /// Bitmap of the chunk containing `(x, y)`.
    ///
    /// Served from the cache when present, so it may lag behind recent
    /// purchases until the chunk is recomputed.
    pub async fn chunk_bitmap(&self, x: i32, y: i32) -> Result<Bitmap> {
        let origin = ChunkOrigin::containing(x, y);
        if let Some(bitmap) = self.cache.get(origin).await {
            return Ok(bitmap);
        }
        debug!(x = origin.x(), y = origin.y(), "chunk cache miss");
        self.recompute(origin).await
    }

    /// Rebuild the chunk's bitmap from the ledger, bypassing the cache, and
    /// store the result.
    pub async fn recompute(&self, origin: ChunkOrigin) -> Result<Bitmap> {
        let (x2, y2) = origin.end();
        let owned = self
            .ledger
            .tiles_in_range(i64::from(origin.x()), i64::from(origin.y()), x2, y2)
            .await?;

        let bitmap = bitmap::encode(origin, owned);
        debug!(
            x = origin.x(),
            y = origin.y(),
            owned = bitmap.owned_count(),
            "chunk bitmap recomputed"
        );
        self.cache.put(bitmap.clone()).await;
        Ok(bitmap)
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }
}
