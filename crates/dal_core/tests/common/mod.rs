#![allow(dead_code)]

use dal_core::db::{open_db_in_memory, DbOptions, Migration};
use dal_core::{
    Entity, EntityRepository, FileConnectionProvider, SharedConnectionProvider,
};
use rusqlite::types::Value;
use rusqlite::Row;
use tempfile::TempDir;

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        "CREATE TABLE accounts (
            id INTEGER PRIMARY KEY,
            owner TEXT NOT NULL,
            balance INTEGER NOT NULL CHECK (balance >= 0)
        );",
    ),
    Migration::new(
        2,
        "CREATE TABLE audit_notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            body TEXT NOT NULL
        );",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn new(id: i64, owner: &str, balance: i64) -> Self {
        Self {
            id,
            owner: owner.to_string(),
            balance,
        }
    }
}

impl Entity for Account {
    type Id = i64;

    const TABLE: &'static str = "accounts";
    const ID_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "owner", "balance"];

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.owner.clone()),
            Value::Integer(self.balance),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            owner: row.get("owner")?,
            balance: row.get("balance")?,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.owner.trim().is_empty() {
            return Err("owner cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Row whose id is assigned by SQLite when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditNote {
    pub id: Option<i64>,
    pub body: String,
}

impl Entity for AuditNote {
    type Id = Option<i64>;

    const TABLE: &'static str = "audit_notes";
    const ID_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "body"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.map_or(Value::Null, Value::Integer),
            Value::Text(self.body.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            body: row.get("body")?,
        })
    }
}

pub fn file_provider() -> (TempDir, FileConnectionProvider) {
    let dir = tempfile::tempdir().unwrap();
    let provider =
        FileConnectionProvider::new(dir.path().join("accounts.db")).with_migrations(MIGRATIONS);
    (dir, provider)
}

pub fn file_repo() -> (TempDir, EntityRepository<Account, FileConnectionProvider>) {
    let (dir, provider) = file_provider();
    (dir, EntityRepository::new(provider))
}

pub fn shared_provider() -> SharedConnectionProvider {
    let conn = open_db_in_memory(&DbOptions::default(), MIGRATIONS).unwrap();
    SharedConnectionProvider::new(conn)
}

pub fn seed(repo: &EntityRepository<Account, FileConnectionProvider>, count: i64) {
    for id in 1..=count {
        repo.save(&Account::new(id, &format!("owner-{id:02}"), id * 10))
            .unwrap();
    }
}
