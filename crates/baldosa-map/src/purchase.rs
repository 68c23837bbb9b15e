//! Tile purchases.
//!
//! ## Protocol
//!
//! 1. Look the cell up; if it has an owner, fail with `AlreadyOwned`.
//! 2. In one ledger transaction, debit the price and insert the tile row.
//! 3. On success, offer a republish task for the cell's chunk.
//!
//! Step 1 only saves a transaction in the common case. Correctness comes
//! from step 2: the tile primary key rejects the second of two concurrent
//! inserts, its transaction rolls back, and the loser is not charged.
//!
//! Step 3 never affects the outcome. A full queue drops the task and the
//! purchase still succeeds.

use std::sync::Arc;

use baldosa_types::{Coords, Tile};
use serde::Serialize;
use tracing::{debug, info};

use crate::ledger::Ledger;
use crate::republish::{Enqueued, RepublishQueue};
use crate::{MapError, Result};

/// Ownership state of a cell, as shown to a prospective buyer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TileQuote {
    Owned { tile: Tile },
    Available { price: u64 },
}

/// Runs the claim protocol against the ledger.
pub struct PurchaseCoordinator {
    ledger: Arc<dyn Ledger>,
    republish: RepublishQueue,
    base_price: u64,
}

impl PurchaseCoordinator {
    pub fn new(ledger: Arc<dyn Ledger>, republish: RepublishQueue, base_price: u64) -> Self {
        Self {
            ledger,
            republish,
            base_price,
        }
    }

    /// Current price of a free cell. Uniform for now.
    pub fn price_of(&self, _coords: Coords) -> u64 {
        self.base_price
    }

    /// The tile at `coords`, or its price if nobody owns it.
    pub async fn quote(&self, coords: Coords) -> Result<TileQuote> {
        Ok(match self.ledger.get_tile(coords).await? {
            Some(tile) => TileQuote::Owned { tile },
            None => TileQuote::Available {
                price: self.price_of(coords),
            },
        })
    }

    /// Buy `coords` for `buyer` at the current price.
    pub async fn purchase(&self, buyer: &str, coords: Coords) -> Result<Tile> {
        self.purchase_at(buyer, coords, self.price_of(coords)).await
    }

    /// Buy `coords` for `buyer` at an explicit `price`.
    pub async fn purchase_at(&self, buyer: &str, coords: Coords, price: u64) -> Result<Tile> {
        if self.ledger.get_tile(coords).await?.is_some() {
            debug!(x = coords.x, y = coords.y, buyer, "purchase rejected, cell owned");
            return Err(MapError::AlreadyOwned(coords));
        }

        let tile = self.ledger.claim_tile(coords, buyer, price).await?;
        info!(x = coords.x, y = coords.y, buyer, price, "tile purchased");

        if self.republish.enqueue(coords) == Enqueued::Dropped {
            debug!(x = coords.x, y = coords.y, "purchase committed without republish");
        }
        Ok(tile)
    }
}
