//! Owner edits and image uploads.
//!
//! A successful content edit offers a republish task for the tile's chunk,
//! the same way a purchase does; a full queue drops it. The editor then checks when the tile's image
//! in the submitted bucket last changed. If that was within the freshness
//! window, the publisher is called synchronously to push the new content
//! downstream. Publishing is best effort: its failures are logged and the
//! edit still succeeds.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use baldosa_types::tile::validate_image_type;
use baldosa_types::{Coords, Tile, TileContent};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blob::{image_key, BlobStore};
use crate::ledger::Ledger;
use crate::publisher::Publisher;
use crate::republish::{Enqueued, RepublishQueue};
use crate::{MapError, Result};

/// Whether a content change should be pushed downstream.
///
/// True when the image exists and was modified less than `window` before
/// `content_changed_at`. An image timestamp later than the content change
/// counts as fresh.
pub fn should_republish(
    content_changed_at: SystemTime,
    image_changed_at: Option<SystemTime>,
    window: Duration,
) -> bool {
    let Some(image_changed_at) = image_changed_at else {
        return false;
    };
    match content_changed_at.duration_since(image_changed_at) {
        Ok(elapsed) => elapsed < window,
        Err(_) => true,
    }
}

/// Where and how a client uploads a tile image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageUpload {
    pub upload_url: String,
    pub key: String,
}

/// Applies owner edits and drives downstream publication.
pub struct TileEditor {
    ledger: Arc<dyn Ledger>,
    submitted: Arc<dyn BlobStore>,
    publisher: Arc<dyn Publisher>,
    republish: RepublishQueue,
    freshness_window: Duration,
}

impl TileEditor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        submitted: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
        republish: RepublishQueue,
        freshness_window: Duration,
    ) -> Self {
        Self {
            ledger,
            submitted,
            publisher,
            republish,
            freshness_window,
        }
    }

    /// Validate and store new content for a tile `owner` owns, then publish
    /// it if the tile's image is fresh.
    pub async fn edit(&self, owner: &str, coords: Coords, content: TileContent) -> Result<Tile> {
        content.validate()?;
        let tile = self
            .ledger
            .edit_tile_by_owner(coords, owner, &content)
            .await?;
        info!(x = coords.x, y = coords.y, owner, "tile content updated");

        if self.republish.enqueue(coords) == Enqueued::Dropped {
            debug!(x = coords.x, y = coords.y, "edit committed without republish");
        }
        self.publish_if_fresh(coords).await;
        Ok(tile)
    }

    /// Returns whether the tile was published.
    async fn publish_if_fresh(&self, coords: Coords) -> bool {
        let key = image_key(coords);
        let image_changed_at = match self.submitted.last_modified(&key).await {
            Ok(modified) => modified,
            Err(e) => {
                warn!(key = %key, error = %e, "could not read image metadata, not publishing");
                return false;
            }
        };

        if !should_republish(SystemTime::now(), image_changed_at, self.freshness_window) {
            debug!(key = %key, "image not fresh, not publishing");
            return false;
        }

        match self.publisher.publish(coords).await {
            Ok(()) => {
                info!(x = coords.x, y = coords.y, "tile published downstream");
                true
            }
            Err(e) => {
                warn!(x = coords.x, y = coords.y, error = %e, "publish failed");
                false
            }
        }
    }

    /// Presign an image upload for a tile `owner` owns and record the image
    /// key on the tile. The URL stays valid for the freshness window.
    pub async fn prepare_image_upload(
        &self,
        owner: &str,
        coords: Coords,
        content_type: &str,
    ) -> Result<ImageUpload> {
        validate_image_type(content_type)?;

        let tile = self
            .ledger
            .get_tile(coords)
            .await?
            .ok_or_else(|| MapError::NotFound(format!("tile {coords}")))?;
        if tile.owner != owner {
            return Err(MapError::Unauthorized(format!("tile {coords}")));
        }

        let key = image_key(coords);
        let upload_url = self
            .submitted
            .presigned_put_url(&key, self.freshness_window)
            .await?;
        self.ledger.set_tile_image(coords, owner, &key).await?;

        debug!(x = coords.x, y = coords.y, key = %key, "image upload prepared");
        Ok(ImageUpload { upload_url, key })
    }
}
