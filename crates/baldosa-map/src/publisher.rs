//! Downstream publisher notified when tile content changes.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use baldosa_types::Coords;
use tokio::sync::Mutex;

use crate::{MapError, Result};

/// Pushes a tile's current content downstream. Implementations are
/// timeout-bound and never retry.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, coords: Coords) -> Result<()>;
}

/// Publisher that does nothing. Used when no downstream is configured.
pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish(&self, coords: Coords) -> Result<()> {
        tracing::debug!(x = coords.x, y = coords.y, "publishing disabled, skipping");
        Ok(())
    }
}

/// Publisher that records every call, optionally failing them.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Coords>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Cells published so far, in call order.
    pub async fn published(&self) -> Vec<Coords> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, coords: Coords) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MapError::Publish(format!("downstream rejected {coords}")));
        }
        self.published.lock().await.push(coords);
        Ok(())
    }
}
