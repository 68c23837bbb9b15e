//! Tile query functions.

use baldosa_types::{Coords, Tile, TileContent};
use rusqlite::{ffi, Connection, OptionalExtension, Row};

use crate::{DbError, Result};

const TILE_COLUMNS: &str = "x, y, owner, title, subtitle, link, image, created_at, updated_at";

/// Get the tile at `coords`.
pub fn get(conn: &Connection, coords: Coords) -> Result<Tile> {
    find(conn, coords)?.ok_or_else(|| DbError::NotFound(format!("tile {coords}")))
}

/// Get the tile at `coords`, or `None` if the cell is unowned.
pub fn find(conn: &Connection, coords: Coords) -> Result<Option<Tile>> {
    let tile = conn
        .query_row(
            &format!("SELECT {TILE_COLUMNS} FROM tiles WHERE x = ?1 AND y = ?2"),
            [coords.x, coords.y],
            from_row,
        )
        .optional()?;
    Ok(tile)
}

/// Insert a tile row owned by `owner`.
///
/// Fails with [`DbError::Constraint`] if the cell already has a row. This is
/// what serializes concurrent purchasers of the same cell.
pub fn create(conn: &Connection, coords: Coords, owner: &str, now: u64) -> Result<Tile> {
    conn.execute(
        "INSERT INTO tiles (x, y, owner, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![coords.x, coords.y, owner, now as i64],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DbError::Constraint(format!("tile {coords} already owned"))
        }
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            DbError::NotFound(format!("user {owner}"))
        }
        other => DbError::Sqlite(other),
    })?;
    get(conn, coords)
}

/// List owned cells with `x1 <= x < x2` and `y1 <= y < y2`.
pub fn in_range(conn: &Connection, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Vec<Coords>> {
    let mut stmt = conn.prepare_cached(
        "SELECT x, y FROM tiles WHERE x >= ?1 AND x < ?2 AND y >= ?3 AND y < ?4",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![x1, x2, y1, y2], |row| {
            Ok(Coords::new(row.get(0)?, row.get(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Overwrite a tile's content, but only if `owner` owns it.
///
/// Returns [`DbError::NotFound`] for an unowned cell and
/// [`DbError::NotOwner`] when someone else owns it.
pub fn edit_by_owner(
    conn: &Connection,
    coords: Coords,
    owner: &str,
    content: &TileContent,
    now: u64,
) -> Result<Tile> {
    let updated = conn.execute(
        "UPDATE tiles SET title = ?1, subtitle = ?2, link = ?3, updated_at = ?4
         WHERE x = ?5 AND y = ?6 AND owner = ?7",
        rusqlite::params![
            content.title,
            content.subtitle,
            content.link,
            now as i64,
            coords.x,
            coords.y,
            owner,
        ],
    )?;
    if updated == 0 {
        return Err(ownership_failure(conn, coords)?);
    }
    get(conn, coords)
}

/// Record the image object key of a tile, only if `owner` owns it.
pub fn set_image(conn: &Connection, coords: Coords, owner: &str, key: &str, now: u64) -> Result<Tile> {
    let updated = conn.execute(
        "UPDATE tiles SET image = ?1, updated_at = ?2 WHERE x = ?3 AND y = ?4 AND owner = ?5",
        rusqlite::params![key, now as i64, coords.x, coords.y, owner],
    )?;
    if updated == 0 {
        return Err(ownership_failure(conn, coords)?);
    }
    get(conn, coords)
}

/// Explain why an owner-scoped update touched no rows.
fn ownership_failure(conn: &Connection, coords: Coords) -> Result<DbError> {
    Ok(match find(conn, coords)? {
        Some(_) => DbError::NotOwner(format!("tile {coords}")),
        None => DbError::NotFound(format!("tile {coords}")),
    })
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Tile> {
    Ok(Tile {
        x: row.get(0)?,
        y: row.get(1)?,
        owner: row.get(2)?,
        title: row.get(3)?,
        subtitle: row.get(4)?,
        link: row.get(5)?,
        image: row.get(6)?,
        created_at: row.get::<_, i64>(7)? as u64,
        updated_at: row.get::<_, i64>(8)? as u64,
    })
}
