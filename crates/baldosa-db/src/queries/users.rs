//! User & balance query functions.

use baldosa_types::User;
use rusqlite::{Connection, Row};

use crate::{map_constraint, DbError, Result};

const USER_COLUMNS: &str = "email, password_hash, coins, created_at";

/// Insert a new user with an initial balance.
pub fn create(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    coins: u64,
    created_at: u64,
) -> Result<User> {
    conn.execute(
        "INSERT INTO users (email, password_hash, coins, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![email, password_hash, to_amount(coins)?, created_at as i64],
    )
    .map_err(|e| map_constraint(e, "user already exists"))?;
    get(conn, email)
}

/// Get a user by email.
pub fn get(conn: &Connection, email: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        [email],
        from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("user {email}")),
        other => DbError::Sqlite(other),
    })
}

/// Debit `amount` coins from a user.
///
/// Fails closed: the balance is only touched when it covers the whole
/// amount, otherwise [`DbError::InsufficientFunds`] is returned and nothing
/// changes.
pub fn spend_coins(conn: &Connection, amount: u64, email: &str) -> Result<User> {
    let updated = conn.execute(
        "UPDATE users SET coins = coins - ?1 WHERE email = ?2 AND coins >= ?1",
        rusqlite::params![to_amount(amount)?, email],
    )?;
    if updated == 0 {
        let user = get(conn, email)?;
        return Err(DbError::InsufficientFunds {
            required: amount,
            available: user.coins,
        });
    }
    get(conn, email)
}

/// Credit `amount` coins to a user.
///
/// A credit that would take the balance past `i64::MAX` is refused with
/// [`DbError::InvalidAmount`] before anything is written; SQLite would
/// otherwise store the sum as a REAL.
pub fn grant_coins(conn: &Connection, amount: u64, email: &str) -> Result<User> {
    let updated = conn.execute(
        "UPDATE users SET coins = coins + ?1 WHERE email = ?2 AND coins <= ?3 - ?1",
        rusqlite::params![to_amount(amount)?, email, i64::MAX],
    )?;
    if updated == 0 {
        let user = get(conn, email)?;
        return Err(DbError::InvalidAmount(format!(
            "granting {amount} to a balance of {} overflows",
            user.coins
        )));
    }
    get(conn, email)
}

fn to_amount(amount: u64) -> Result<i64> {
    i64::try_from(amount).map_err(|_| DbError::InvalidAmount(format!("{amount} out of range")))
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        email: row.get(0)?,
        password_hash: row.get(1)?,
        coins: row.get::<_, i64>(2)? as u64,
        created_at: row.get::<_, i64>(3)? as u64,
    })
}
