//! SQL schema, as an ordered list of forward-only steps.
//!
//! Step `n` (zero-based) brings a database from `user_version = n` to
//! `n + 1`. Append new steps; never edit a released one.

/// Every schema step, oldest first.
pub const MIGRATIONS: &[&str] = &[USERS, TILES];

const USERS: &str = r#"
CREATE TABLE users (
    email TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    coins INTEGER NOT NULL DEFAULT 0 CHECK (coins >= 0),
    created_at INTEGER NOT NULL
);
"#;

const TILES: &str = r#"
CREATE TABLE tiles (
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    owner TEXT NOT NULL REFERENCES users(email),
    title TEXT NOT NULL DEFAULT '',
    subtitle TEXT,
    link TEXT,
    image TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (x, y)
);

CREATE INDEX idx_tiles_owner ON tiles(owner);
"#;
