//! Connection bootstrap utilities for SQLite.
//!
//! # Invariants
//! - Returned connections have pragmas from [`DbOptions`] applied.
//! - Returned connections have all supplied migrations applied.

use super::migrations::{apply_migrations, Migration};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection settings applied right after open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            foreign_keys: true,
        }
    }
}

/// Opens a SQLite database file and applies pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(
    path: impl AsRef<Path>,
    options: &DbOptions,
    migrations: &[Migration],
) -> DbResult<Connection> {
    open_with("file", || Connection::open(path), options, migrations)
}

/// Opens a private in-memory database and applies pending migrations.
pub fn open_db_in_memory(options: &DbOptions, migrations: &[Migration]) -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory, options, migrations)
}

fn open_with<F>(
    mode: &str,
    open: F,
    options: &DbOptions,
    migrations: &[Migration],
) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = open().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn, options, migrations) {
        error!(
            "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={} duration_ms={}",
        mode,
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(
    conn: &mut Connection,
    options: &DbOptions,
    migrations: &[Migration],
) -> DbResult<()> {
    let foreign_keys = if options.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(options.busy_timeout)?;
    apply_migrations(conn, migrations)?;
    Ok(())
}
