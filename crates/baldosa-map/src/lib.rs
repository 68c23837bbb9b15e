//! # baldosa-map
//!
//! Availability cache and purchase consistency for the tile canvas.
//!
//! ## Modules
//!
//! - [`bitmap`]: packs the owned cells of one chunk into a bit array.
//! - [`cache`]: in-memory chunk → bitmap cache, recomputed from the ledger on miss.
//! - [`purchase`]: the claim protocol (check, then debit and insert atomically).
//! - [`republish`]: bounded drop-on-full task queue and the worker that
//!   refreshes durable bitmap snapshots.
//! - [`edit`]: owner edits, image upload preparation and the
//!   publish-on-fresh-image policy.
//! - [`ledger`], [`blob`], [`publisher`]: the external collaborators, as
//!   traits with SQLite and in-memory implementations.
//!
//! ## Consistency
//!
//! The ledger is the only source of truth. A purchase does not touch the
//! cache; cached bitmaps may report a freshly bought cell as free until the
//! chunk is recomputed, either by the republish worker or by an explicit
//! [`cache::AvailabilityMap::recompute`].

pub mod bitmap;
pub mod blob;
pub mod cache;
pub mod edit;
pub mod ledger;
pub mod publisher;
pub mod purchase;
pub mod republish;

use baldosa_db::DbError;
use baldosa_types::{ContentError, Coords};

/// Error types for map, purchase and edit operations.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Cell or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Someone already owns the cell.
    #[error("tile {0} is already owned")]
    AlreadyOwned(Coords),

    /// The buyer cannot cover the price.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// The caller does not own the tile.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Tile content or upload request failed validation.
    #[error("invalid content: {0}")]
    InvalidContent(#[from] ContentError),

    /// A coin amount the ledger cannot represent.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A uniqueness violation outside of tile claims (e.g. duplicate user).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The ledger could not be reached or failed internally.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("blob store error: {0}")]
    BlobStore(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

impl MapError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MapError::LedgerUnavailable(_))
    }
}

impl From<DbError> for MapError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => MapError::NotFound(what),
            DbError::Constraint(what) => MapError::Conflict(what),
            DbError::InsufficientFunds {
                required,
                available,
            } => MapError::InsufficientFunds {
                required,
                available,
            },
            DbError::NotOwner(what) => MapError::Unauthorized(what),
            DbError::InvalidAmount(what) => MapError::InvalidAmount(what),
            other @ (DbError::Sqlite(_) | DbError::Migration(_)) => {
                MapError::LedgerUnavailable(other.to_string())
            }
        }
    }
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, MapError>;
