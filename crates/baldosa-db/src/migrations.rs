//! Applies [`schema::MIGRATIONS`] on open.
//!
//! The applied step count lives in `PRAGMA user_version`. Each step runs in
//! its own transaction together with its version bump, so a crash mid-way
//! leaves the database at the last complete step.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::{schema, DbError, Result, SCHEMA_VERSION};

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring `conn` up to [`SCHEMA_VERSION`]. A database written by a newer
/// build is refused.
pub fn run(conn: &Connection) -> Result<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "ledger schema v{found} is newer than this build (v{SCHEMA_VERSION})"
        )));
    }
    if found == SCHEMA_VERSION {
        debug!(version = found, "ledger schema up to date");
        return Ok(());
    }

    for (step, sql) in schema::MIGRATIONS.iter().enumerate().skip(found as usize) {
        let target = step as u32 + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| DbError::Migration(format!("step to v{target}: {e}")))?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        info!(version = target, "ledger schema migrated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .expect("sqlite_master")
            == 1
    }

    #[test]
    fn test_fresh_database_reaches_latest() {
        let conn = Connection::open_in_memory().expect("open");
        run(&conn).expect("migrate");
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
        assert!(table_exists(&conn, "users"));
        assert!(table_exists(&conn, "tiles"));
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = Connection::open_in_memory().expect("open");
        run(&conn).expect("first");
        run(&conn).expect("second");
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_resumes_from_partial_schema() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(schema::MIGRATIONS[0]).expect("first step");
        conn.pragma_update(None, "user_version", 1u32).expect("bump");
        assert!(!table_exists(&conn, "tiles"));

        run(&conn).expect("migrate");
        assert!(table_exists(&conn, "tiles"));
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_database_refused() {
        let conn = Connection::open_in_memory().expect("open");
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("bump");
        assert!(matches!(run(&conn), Err(DbError::Migration(_))));
    }
}
