//! Mapping contract between a Rust type and one table.

use rusqlite::types::{ToSql, Value};
use rusqlite::Row;
use std::fmt::Debug;

/// A type persisted as one row of [`Entity::TABLE`].
///
/// `values()` must yield one value per entry of `COLUMNS`, in the same order.
/// `COLUMNS` must contain `ID_COLUMN`. An id that binds as SQL `NULL` lets
/// SQLite assign the rowid on insert.
pub trait Entity: Sized {
    type Id: ToSql + Debug;

    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> Self::Id;

    fn values(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Checked before every write.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
