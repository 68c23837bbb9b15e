//! Filesystem-backed blob buckets.
//!
//! One directory per bucket, one file per object. Writes go to a temporary
//! sibling first and are renamed into place, so readers never see a partial
//! snapshot. Presigned upload URLs carry an expiry and a keyed BLAKE3
//! signature over `bucket/key/expires`, checked by the upload front end.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use baldosa_map::blob::BlobStore;
use baldosa_map::{MapError, Result};
use tracing::debug;

const SIGNING_CONTEXT: &str = "baldosa 2024-05 presigned upload url";

/// A bucket stored as a directory.
pub struct FsBlobStore {
    bucket: String,
    root: PathBuf,
    public_base_url: String,
    signing_key: [u8; 32],
}

impl FsBlobStore {
    pub fn new(
        bucket: impl Into<String>,
        root: impl Into<PathBuf>,
        public_base_url: &str,
        signing_secret: &str,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_key: blake3::derive_key(SIGNING_CONTEXT, signing_secret.as_bytes()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(MapError::BlobStore(format!(
                "{}: invalid object key {key:?}",
                self.bucket
            )));
        }
        Ok(self.root.join(key))
    }

    fn signature(&self, key: &str, expires: u64) -> blake3::Hash {
        let message = format!("{}/{key}/{expires}", self.bucket);
        blake3::keyed_hash(&self.signing_key, message.as_bytes())
    }

    fn io_error(&self, op: &str, key: &str, err: std::io::Error) -> MapError {
        MapError::BlobStore(format!("{}: {op} {key}: {err}", self.bucket))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| self.io_error("create bucket for", key, e))?;

        let tmp = self.root.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error("write", key, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| self.io_error("rename", key, e))?;

        debug!(bucket = %self.bucket, key, bytes = bytes.len(), "object stored");
        Ok(())
    }

    async fn presigned_put_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.object_path(key)?;
        let expires = unix_secs(SystemTime::now()).saturating_add(ttl.as_secs());
        let signature = self.signature(key, expires);
        Ok(format!(
            "{}/{}/{key}?expires={expires}&signature={}",
            self.public_base_url,
            self.bucket,
            hex::encode(signature.as_bytes())
        ))
    }

    async fn last_modified(&self, key: &str) -> Result<Option<SystemTime>> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta
                .modified()
                .map(Some)
                .map_err(|e| self.io_error("stat", key, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("stat", key, e)),
        }
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
