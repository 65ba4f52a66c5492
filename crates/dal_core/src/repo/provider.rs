//! Per-call connection acquisition.
//!
//! # Invariants
//! - A connection lent to `op` is released before `with_connection` returns,
//!   on every exit path.
//! - A release failure after success is logged and swallowed; after failure
//!   it is attached to the original error.

use crate::db::{open_db, DbOptions, Migration};
use crate::repo::error::RepoResult;
use log::warn;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source of relational connections scoped to one repository call.
pub trait ConnectionProvider {
    fn with_connection<R, F>(&self, op: F) -> RepoResult<R>
    where
        F: FnOnce(&mut Connection) -> RepoResult<R>;
}

impl<P: ConnectionProvider + ?Sized> ConnectionProvider for &P {
    fn with_connection<R, F>(&self, op: F) -> RepoResult<R>
    where
        F: FnOnce(&mut Connection) -> RepoResult<R>,
    {
        (**self).with_connection(op)
    }
}

/// Opens, migrates and closes one SQLite connection per call.
#[derive(Debug, Clone)]
pub struct FileConnectionProvider {
    path: PathBuf,
    options: DbOptions,
    migrations: Vec<Migration>,
}

impl FileConnectionProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: DbOptions::default(),
            migrations: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: DbOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_migrations(mut self, migrations: &[Migration]) -> Self {
        self.migrations = migrations.to_vec();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionProvider for FileConnectionProvider {
    fn with_connection<R, F>(&self, op: F) -> RepoResult<R>
    where
        F: FnOnce(&mut Connection) -> RepoResult<R>,
    {
        let mut conn = open_db(&self.path, &self.options, &self.migrations)?;
        let outcome = op(&mut conn);

        match conn.close() {
            Ok(()) => outcome,
            Err((_conn, release)) => match outcome {
                Ok(value) => {
                    warn!("event=conn_release module=repo status=error error={release}");
                    Ok(value)
                }
                Err(cause) => Err(cause.with_release_failure(release)),
            },
        }
    }
}

/// Lends one long-lived connection to one call at a time.
///
/// Suited to in-memory databases, which vanish when their only connection
/// closes.
#[derive(Debug)]
pub struct SharedConnectionProvider {
    conn: Mutex<Connection>,
}

impl SharedConnectionProvider {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn into_inner(self) -> Connection {
        self.conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConnectionProvider for SharedConnectionProvider {
    fn with_connection<R, F>(&self, op: F) -> RepoResult<R>
    where
        F: FnOnce(&mut Connection) -> RepoResult<R>,
    {
        // A panic mid-call rolls back through the transaction drop guard, so a
        // poisoned lock still guards a consistent connection.
        let mut conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&mut conn)
    }
}

impl From<Connection> for SharedConnectionProvider {
    fn from(value: Connection) -> Self {
        Self::new(value)
    }
}
