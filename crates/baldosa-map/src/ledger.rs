//! The tile ledger as seen by this crate.
//!
//! [`Ledger`] is the capability the cache, the purchase coordinator and the
//! editor depend on. [`SqliteLedger`] implements it over `baldosa-db`.

use std::sync::Arc;

use async_trait::async_trait;
use baldosa_db::queries::{tiles, users};
use baldosa_db::DbError;
use baldosa_types::{Coords, Tile, TileContent, User};
use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::Mutex;

use crate::{MapError, Result};

/// Authoritative store of tile ownership and user balances.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// The tile at `coords`, or `None` if the cell is free.
    async fn get_tile(&self, coords: Coords) -> Result<Option<Tile>>;

    /// Debit `price` from `owner` and insert the tile row, atomically.
    ///
    /// Fails with [`MapError::AlreadyOwned`] if another claim committed
    /// first, and [`MapError::InsufficientFunds`] if the balance does not
    /// cover `price`. On any failure the balance is left untouched.
    async fn claim_tile(&self, coords: Coords, owner: &str, price: u64) -> Result<Tile>;

    /// Owned cells with `x1 <= x < x2` and `y1 <= y < y2`.
    async fn tiles_in_range(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Vec<Coords>>;

    /// Replace a tile's content if `owner` owns it.
    async fn edit_tile_by_owner(
        &self,
        coords: Coords,
        owner: &str,
        content: &TileContent,
    ) -> Result<Tile>;

    /// Attach an image object key to a tile if `owner` owns it.
    async fn set_tile_image(&self, coords: Coords, owner: &str, key: &str) -> Result<Tile>;

    async fn create_user(&self, email: &str, password_hash: &str, coins: u64) -> Result<User>;

    async fn get_user(&self, email: &str) -> Result<User>;

    /// Credit coins to a user (administrative top-up).
    async fn grant_coins(&self, email: &str, amount: u64) -> Result<User>;
}

/// [`Ledger`] backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// An in-memory ledger with the schema applied.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::new(baldosa_db::open_memory()?))
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn get_tile(&self, coords: Coords) -> Result<Option<Tile>> {
        let conn = self.conn.lock().await;
        Ok(tiles::find(&conn, coords)?)
    }

    async fn claim_tile(&self, coords: Coords, owner: &str, price: u64) -> Result<Tile> {
        let mut conn = self.conn.lock().await;
        claim(&mut conn, coords, owner, price)
    }

    async fn tiles_in_range(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Vec<Coords>> {
        let conn = self.conn.lock().await;
        Ok(tiles::in_range(&conn, x1, y1, x2, y2)?)
    }

    async fn edit_tile_by_owner(
        &self,
        coords: Coords,
        owner: &str,
        content: &TileContent,
    ) -> Result<Tile> {
        let conn = self.conn.lock().await;
        Ok(tiles::edit_by_owner(
            &conn,
            coords,
            owner,
            content,
            baldosa_db::now_secs(),
        )?)
    }

    async fn set_tile_image(&self, coords: Coords, owner: &str, key: &str) -> Result<Tile> {
        let conn = self.conn.lock().await;
        Ok(tiles::set_image(
            &conn,
            coords,
            owner,
            key,
            baldosa_db::now_secs(),
        )?)
    }

    async fn create_user(&self, email: &str, password_hash: &str, coins: u64) -> Result<User> {
        let conn = self.conn.lock().await;
        Ok(users::create(
            &conn,
            email,
            password_hash,
            coins,
            baldosa_db::now_secs(),
        )?)
    }

    async fn get_user(&self, email: &str) -> Result<User> {
        let conn = self.conn.lock().await;
        Ok(users::get(&conn, email)?)
    }

    async fn grant_coins(&self, email: &str, amount: u64) -> Result<User> {
        let conn = self.conn.lock().await;
        Ok(users::grant_coins(&conn, amount, email)?)
    }
}

/// Insert and spend inside one transaction. Dropping the transaction on an
/// early return rolls both back.
///
/// The insert goes first so a taken cell reports `AlreadyOwned` even when
/// the buyer also could not pay. The buyer is looked up before that, since
/// the foreign key on an unknown owner is also a constraint violation.
///
/// The transaction is IMMEDIATE so that claims from separate connections to
/// the same database queue on the write lock instead of failing on upgrade.
fn claim(conn: &mut Connection, coords: Coords, owner: &str, price: u64) -> Result<Tile> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DbError::from)?;
    users::get(&tx, owner)?;
    let tile = tiles::create(&tx, coords, owner, baldosa_db::now_secs()).map_err(|e| match e {
        DbError::Constraint(_) => MapError::AlreadyOwned(coords),
        other => other.into(),
    })?;
    users::spend_coins(&tx, price, owner)?;
    tx.commit().map_err(DbError::from)?;
    Ok(tile)
}
