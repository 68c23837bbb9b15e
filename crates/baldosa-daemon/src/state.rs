//! Daemon-wide shared state and its wiring.

use std::sync::Arc;

use baldosa_map::blob::BlobStore;
use baldosa_map::cache::AvailabilityMap;
use baldosa_map::edit::TileEditor;
use baldosa_map::ledger::Ledger;
use baldosa_map::publisher::Publisher;
use baldosa_map::purchase::PurchaseCoordinator;
use baldosa_map::republish::{self, RepublishQueue, RepublishWorker};
use tokio::sync::broadcast;

use crate::config::DaemonConfig;

/// Everything RPC handlers need.
pub struct DaemonState {
    /// Configuration.
    pub config: DaemonConfig,
    /// The tile ledger.
    pub ledger: Arc<dyn Ledger>,
    /// Chunk availability bitmaps.
    pub map: Arc<AvailabilityMap>,
    /// Claim protocol.
    pub purchases: PurchaseCoordinator,
    /// Owner edits and image uploads.
    pub editor: TileEditor,
    /// Producer side of the republish queue, for stats.
    pub republish: RepublishQueue,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Wire the core together. The returned worker must be spawned for
    /// republish tasks to be processed.
    pub fn new(
        config: DaemonConfig,
        ledger: Arc<dyn Ledger>,
        submitted: Arc<dyn BlobStore>,
        published: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
    ) -> (Arc<Self>, RepublishWorker) {
        let map = Arc::new(AvailabilityMap::new(ledger.clone()));
        let (queue, receiver) = republish::queue(config.tiles.republish_queue_capacity);
        let worker = RepublishWorker::new(receiver, map.clone(), published);

        let purchases =
            PurchaseCoordinator::new(ledger.clone(), queue.clone(), config.tiles.base_price);
        let editor = TileEditor::new(
            ledger.clone(),
            submitted,
            publisher,
            queue.clone(),
            config.tiles.freshness_window(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(Self {
            config,
            ledger,
            map,
            purchases,
            editor,
            republish: queue,
            shutdown_tx,
        });
        (state, worker)
    }
}
