//! SQLite request store.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` so pollers read while writers commit
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` to protect the photo rows' relational integrity
//!
//! Correctness of concurrent claims rests entirely on the conditional
//! `UPDATE ... WHERE version = ?` in [`requests::conditional_update`]; no
//! in-process lock is authoritative, so any number of connections (and
//! processes) may share one database file.

pub mod migrations;
pub mod requests;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used for request store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the request database, apply runtime pragmas, and
/// migrate schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create request db directory {}", parent.display()))?;
    }

    let mut conn = connect(path)?;
    migrations::migrate(&mut conn).context("apply request store migrations")?;

    Ok(conn)
}

/// Open an additional connection to an already-migrated database.
///
/// Request handlers call this per invocation; SQLite in WAL mode carries
/// the cross-connection coordination.
///
/// # Errors
///
/// Returns an error if opening or configuring the connection fails.
pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open request database {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}
