mod common;

use common::MIGRATIONS;
use dal_core::db::{latest_version, open_db, open_db_in_memory, DbError, DbOptions, Migration};
use rusqlite::Connection;
use std::time::Duration;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory(&DbOptions::default(), MIGRATIONS).unwrap();

    assert_eq!(schema_version(&conn), latest_version(MIGRATIONS));
    assert_table_exists(&conn, "accounts");
    assert_table_exists(&conn, "audit_notes");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bootstrap.db");

    let conn_first = open_db(&path, &DbOptions::default(), MIGRATIONS).unwrap();
    assert_eq!(schema_version(&conn_first), 2);
    drop(conn_first);

    let conn_second = open_db(&path, &DbOptions::default(), MIGRATIONS).unwrap();
    assert_eq!(schema_version(&conn_second), 2);
    assert_table_exists(&conn_second, "accounts");
}

#[test]
fn later_migrations_apply_on_top_of_existing_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upgrade.db");

    drop(open_db(&path, &DbOptions::default(), &MIGRATIONS[..1]).unwrap());
    let conn = open_db(&path, &DbOptions::default(), MIGRATIONS).unwrap();

    assert_eq!(schema_version(&conn), 2);
    assert_table_exists(&conn, "audit_notes");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, &DbOptions::default(), MIGRATIONS).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unordered_migrations_are_rejected() {
    let migrations = [
        Migration::new(2, "CREATE TABLE b (id INTEGER);"),
        Migration::new(1, "CREATE TABLE a (id INTEGER);"),
    ];

    let err = open_db_in_memory(&DbOptions::default(), &migrations).unwrap_err();
    assert!(matches!(
        err,
        DbError::UnorderedMigrations {
            previous: 2,
            next: 1
        }
    ));
}

#[test]
fn options_are_applied_to_the_connection() {
    let options = DbOptions {
        busy_timeout: Duration::from_millis(1_500),
        foreign_keys: false,
    };
    let conn = open_db_in_memory(&options, MIGRATIONS).unwrap();

    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    let busy_timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 0);
    assert_eq!(busy_timeout, 1_500);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
