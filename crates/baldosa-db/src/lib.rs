//! # baldosa-db
//!
//! The tile ledger: source of truth for tile ownership and user coin
//! balances, stored in a single SQLite database at `$BALDOSA_DATA_DIR/baldosa.db`.
//!
//! ## Schema
//!
//! - WAL mode
//! - Foreign keys enforced
//! - `(x, y)` is the tile primary key; a second insert for the same cell
//!   fails with a constraint violation
//! - `users.coins` carries a `CHECK (coins >= 0)` constraint
//! - All timestamps are Unix epoch seconds
//! - Schema version stored in `PRAGMA user_version`
//!
//! Query functions take a `&Connection`, so they work unchanged inside a
//! [`rusqlite::Transaction`].

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::{Connection, ErrorCode};
use std::path::Path;

/// Schema version a fully migrated ledger reports in `user_version`.
pub const SCHEMA_VERSION: u32 = schema::MIGRATIONS.len() as u32;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("{0} is not owned by the caller")]
    NotOwner(String),

    /// A coin amount that does not fit the ledger, or a credit that would
    /// push a balance past it. Nothing was written.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Convert a unique/primary-key violation into [`DbError::Constraint`],
/// leaving other errors untouched.
pub(crate) fn map_constraint(err: rusqlite::Error, what: &str) -> DbError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            DbError::Constraint(what.to_string())
        }
        other => DbError::Sqlite(other),
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the ledger database at `path`, migrated to
/// [`SCHEMA_VERSION`].
pub fn open(path: &Path) -> Result<Connection> {
    prepare(Connection::open(path)?)
}

/// A private in-memory ledger, migrated to [`SCHEMA_VERSION`].
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection> {
    // WAL lets snapshot readers proceed while a claim holds the write lock.
    // busy_timeout makes competing writers queue instead of failing fast.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
