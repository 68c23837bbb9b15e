//! Blob storage for tile images and published bitmap snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use baldosa_types::{ChunkOrigin, Coords};
use tokio::sync::Mutex;

use crate::{MapError, Result};

/// Key of the published bitmap snapshot for a chunk.
pub fn snapshot_key(origin: ChunkOrigin) -> String {
    format!("maps-{}-{}.bin", origin.x(), origin.y())
}

/// Key of a tile's image in the submitted bucket.
pub fn image_key(coords: Coords) -> String {
    format!("tile-{}-{}", coords.x, coords.y)
}

/// One bucket of an object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket name, for logging.
    fn bucket(&self) -> &str;

    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// A URL a client can upload `key` to directly, valid for `ttl`.
    async fn presigned_put_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Last modification time of `key`, or `None` if there is no such object.
    async fn last_modified(&self, key: &str) -> Result<Option<SystemTime>>;
}

/// In-process [`BlobStore`]. Used by tests and by daemons running without
/// durable storage.
pub struct MemoryBlobStore {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: AtomicBool,
}

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Vec<u8>,
    modified: SystemTime,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `put` fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored bytes for `key`.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(key).map(|o| o.bytes.clone())
    }

    /// Store an object with an explicit modification time.
    pub async fn put_at(&self, key: &str, bytes: &[u8], modified: SystemTime) {
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                modified,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MapError::BlobStore(format!(
                "{}: put {key} rejected",
                self.bucket
            )));
        }
        self.put_at(key, bytes, SystemTime::now()).await;
        Ok(())
    }

    async fn presigned_put_url(&self, key: &str, ttl: Duration) -> Result<String> {
        Ok(format!(
            "memory://{}/{key}?ttl={}",
            self.bucket,
            ttl.as_secs()
        ))
    }

    async fn last_modified(&self, key: &str) -> Result<Option<SystemTime>> {
        Ok(self.objects.lock().await.get(key).map(|o| o.modified))
    }
}
