//! Generic entity repository over SQLite.
//!
//! # Responsibility
//! - Run caller-written queries and map rows to `T`.
//! - Page results and count them.
//! - Bracket every write in its own transaction.
//!
//! # Invariants
//! - Connections, statements and rows never outlive one call.
//! - `find_for_page` counts the unbounded result, then fetches the slice in a
//!   separate query on the same connection.
//! - Writes call `Entity::validate` before any SQL runs.

use crate::repo::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::page::{Page, PageRequest};
use crate::repo::params::{bind, QueryParams};
use crate::repo::provider::ConnectionProvider;
use crate::repo::transaction::TransactionExecutor;
use log::{debug, error};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, Row};
use std::marker::PhantomData;
use std::time::Instant;

/// Repository for one entity type. Holds only its connection provider.
pub struct EntityRepository<T, P> {
    provider: P,
    log_sql: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, P: ConnectionProvider> EntityRepository<T, P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            log_sql: false,
            _entity: PhantomData,
        }
    }

    /// Logs SQL text (never parameter values) at `debug` level.
    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Runs `sql` unbounded and maps every row.
    pub fn query_list(&self, sql: &str, params: &QueryParams) -> RepoResult<Vec<T>> {
        self.observe("query_list", || {
            self.provider
                .with_connection(|conn| self.fetch(conn, sql, params, map_entity::<T>))
        })
    }

    /// Runs `sql` limited to one row.
    pub fn query_first(&self, sql: &str, params: &QueryParams) -> RepoResult<Option<T>> {
        self.observe("query_first", || {
            self.provider.with_connection(|conn| {
                let bounded = bounded_sql(sql, 1, 0);
                let rows = self.fetch(conn, &bounded, params, map_entity::<T>)?;
                Ok(rows.into_iter().next())
            })
        })
    }

    /// Runs a query projecting exactly one integer in exactly one row.
    pub fn get_count(&self, sql: &str, params: &QueryParams) -> RepoResult<i64> {
        self.observe("get_count", || {
            self.provider
                .with_connection(|conn| self.scalar_count(conn, sql, params))
        })
    }

    /// Returns rows `[(page_index - 1) * page_size, page_index * page_size)`.
    pub fn query_for_page(
        &self,
        sql: &str,
        page_index: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> RepoResult<Vec<T>> {
        self.observe("query_for_page", || {
            let request = PageRequest::new(page_index, page_size)?;
            self.provider
                .with_connection(|conn| self.fetch_page(conn, sql, request, params))
        })
    }

    /// Returns one page plus the size of the full unbounded result.
    pub fn find_for_page(
        &self,
        sql: &str,
        page_index: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> RepoResult<Page<T>> {
        self.observe("find_for_page", || {
            let request = PageRequest::new(page_index, page_size)?;
            self.provider.with_connection(|conn| {
                let total_count = self.fetch(conn, sql, params, |_| Ok(()))?.len() as u64;
                let items = self.fetch_page(conn, sql, request, params)?;
                Ok(Page::new(items, request, total_count))
            })
        })
    }

    /// Looks up one row by primary key.
    pub fn get(&self, id: &T::Id) -> RepoResult<Option<T>> {
        self.observe("get", || {
            self.provider
                .with_connection(|conn| find_by_id::<T>(conn, id))
        })
    }

    /// Like [`get`](Self::get), but a store failure is logged and yields `None`.
    pub fn load(&self, id: &T::Id) -> Option<T> {
        match self.get(id) {
            Ok(entity) => entity,
            Err(err) => {
                error!(
                    "event=repo_load module=repo entity={} status=error id={:?} error={}",
                    T::TABLE,
                    id,
                    err
                );
                None
            }
        }
    }

    /// Inserts `entity`. Returns rows affected.
    pub fn save(&self, entity: &T) -> RepoResult<usize> {
        self.mutate("save", entity, |tx| {
            Ok(tx.execute(&insert_sql::<T>(), rusqlite::params_from_iter(entity.values()))?)
        })
    }

    /// Updates the row matching `entity.id()`. `Ok(0)` when no row matches.
    pub fn update(&self, entity: &T) -> RepoResult<usize> {
        self.mutate("update", entity, |tx| {
            let mut values = non_id_values(entity);
            values.push(id_value(&entity.id())?);
            Ok(tx.execute(&update_sql::<T>(), rusqlite::params_from_iter(values))?)
        })
    }

    /// Inserts `entity`, or updates it when its id already exists.
    pub fn save_or_update(&self, entity: &T) -> RepoResult<usize> {
        self.mutate("save_or_update", entity, |tx| {
            Ok(tx.execute(&upsert_sql::<T>(), rusqlite::params_from_iter(entity.values()))?)
        })
    }

    /// Upserts `entity` and returns the row as persisted.
    pub fn merge(&self, entity: &T) -> RepoResult<Option<T>> {
        self.mutate("merge", entity, |tx| {
            tx.execute(&upsert_sql::<T>(), rusqlite::params_from_iter(entity.values()))?;
            let id = id_value(&entity.id())?;
            if id == Value::Null {
                let rowid = tx.last_insert_rowid();
                let sql = format!("SELECT * FROM {} WHERE rowid = ?1", T::TABLE);
                return select_one::<T>(tx, &sql, &rowid);
            }
            find_by_id::<T>(tx, &entity.id())
        })
    }

    /// Deletes the row matching `entity.id()`.
    pub fn delete(&self, entity: &T) -> RepoResult<usize> {
        self.mutate("delete", entity, |tx| delete_row::<T>(tx, &entity.id()))
    }

    /// Deletes by primary key. A missing row is a no-op returning `Ok(0)`.
    pub fn delete_by_id(&self, id: &T::Id) -> RepoResult<usize> {
        self.observe("delete_by_id", || {
            self.provider.with_connection(|conn| {
                TransactionExecutor::new("delete_by_id")
                    .execute(conn, |tx| delete_row::<T>(tx, id))
            })
        })
    }

    /// Runs a projection query and returns raw column values per row.
    pub fn project(&self, sql: &str, params: &QueryParams) -> RepoResult<Vec<Vec<Value>>> {
        self.observe("project", || {
            self.provider
                .with_connection(|conn| self.fetch(conn, sql, params, raw_row))
        })
    }

    /// Returns the first column of the first row, if any.
    pub fn single(&self, sql: &str, params: &QueryParams) -> RepoResult<Option<Value>> {
        self.observe("single", || {
            self.provider.with_connection(|conn| {
                let bounded = bounded_sql(sql, 1, 0);
                let rows = self.fetch(conn, &bounded, params, |row| Ok(row.get::<_, Value>(0)?))?;
                Ok(rows.into_iter().next())
            })
        })
    }

    /// Runs one DML statement in a transaction. Returns rows affected.
    pub fn execute_update(&self, sql: &str, params: &QueryParams) -> RepoResult<usize> {
        self.observe("execute_update", || {
            self.provider.with_connection(|conn| {
                TransactionExecutor::new("execute_update")
                    .execute(conn, |tx| self.run(tx, sql, params))
            })
        })
    }

    /// Runs one INSERT in a transaction. Returns the generated rowid, or `0`
    /// when nothing was inserted.
    pub fn execute_insert(&self, sql: &str, params: &QueryParams) -> RepoResult<i64> {
        self.observe("execute_insert", || {
            self.provider.with_connection(|conn| {
                TransactionExecutor::new("execute_insert").execute(conn, |tx| {
                    let inserted = self.run(tx, sql, params)?;
                    Ok(if inserted > 0 { tx.last_insert_rowid() } else { 0 })
                })
            })
        })
    }

    fn mutate<R, F>(&self, op: &'static str, entity: &T, work: F) -> RepoResult<R>
    where
        F: FnOnce(&Connection) -> RepoResult<R>,
    {
        self.observe(op, || {
            entity.validate().map_err(RepoError::Validation)?;
            self.provider.with_connection(|conn| {
                TransactionExecutor::new(op).execute(conn, |tx| work(tx))
            })
        })
    }

    fn fetch<R, F>(
        &self,
        conn: &Connection,
        sql: &str,
        params: &QueryParams,
        mut map: F,
    ) -> RepoResult<Vec<R>>
    where
        F: FnMut(&Row<'_>) -> RepoResult<R>,
    {
        self.trace_sql(sql, params);
        let mut stmt = conn.prepare(sql).map_err(|source| RepoError::Preparation {
            sql: sql.to_string(),
            source,
        })?;
        let binding = bind(&mut stmt, params).map_err(|source| RepoError::Preparation {
            sql: sql.to_string(),
            source,
        })?;
        binding.ensure_complete(&stmt, sql)?;

        let mut rows = stmt.raw_query();
        let mut mapped = Vec::new();
        while let Some(row) = rows.next()? {
            mapped.push(map(row)?);
        }
        Ok(mapped)
    }

    fn fetch_page(
        &self,
        conn: &Connection,
        sql: &str,
        request: PageRequest,
        params: &QueryParams,
    ) -> RepoResult<Vec<T>> {
        let bounded = bounded_sql(sql, request.limit(), request.offset());
        self.fetch(conn, &bounded, params, map_entity::<T>)
    }

    fn scalar_count(&self, conn: &Connection, sql: &str, params: &QueryParams) -> RepoResult<i64> {
        let rows = self.fetch(conn, sql, params, raw_row)?;
        let [row] = rows.as_slice() else {
            return Err(RepoError::NotScalar(format!("got {} rows", rows.len())));
        };
        match row.as_slice() {
            [Value::Integer(count)] => Ok(*count),
            [other] => Err(RepoError::NotScalar(format!(
                "got a {} value",
                other.data_type()
            ))),
            columns => Err(RepoError::NotScalar(format!(
                "got {} columns",
                columns.len()
            ))),
        }
    }

    fn run(&self, conn: &Connection, sql: &str, params: &QueryParams) -> RepoResult<usize> {
        self.trace_sql(sql, params);
        let mut stmt = conn.prepare(sql).map_err(|source| RepoError::Preparation {
            sql: sql.to_string(),
            source,
        })?;
        let binding = bind(&mut stmt, params).map_err(|source| RepoError::Preparation {
            sql: sql.to_string(),
            source,
        })?;
        binding.ensure_complete(&stmt, sql)?;
        Ok(stmt.raw_execute()?)
    }

    fn trace_sql(&self, sql: &str, params: &QueryParams) {
        if self.log_sql {
            debug!(
                "event=sql module=repo entity={} param_count={} sql={}",
                T::TABLE,
                params.len(),
                sql.split_whitespace().collect::<Vec<_>>().join(" ")
            );
        }
    }

    fn observe<R>(&self, op: &str, call: impl FnOnce() -> RepoResult<R>) -> RepoResult<R> {
        let started_at = Instant::now();
        let result = call();
        match &result {
            Ok(_) => debug!(
                "event=repo_call module=repo op={} entity={} status=ok duration_ms={}",
                op,
                T::TABLE,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=repo_call module=repo op={} entity={} status=error duration_ms={} error={}",
                op,
                T::TABLE,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

fn map_entity<T: Entity>(row: &Row<'_>) -> RepoResult<T> {
    Ok(T::from_row(row)?)
}

fn raw_row(row: &Row<'_>) -> RepoResult<Vec<Value>> {
    let width = row.as_ref().column_count();
    let mut values = Vec::with_capacity(width);
    for index in 0..width {
        values.push(row.get::<_, Value>(index)?);
    }
    Ok(values)
}

fn find_by_id<T: Entity>(conn: &Connection, id: &T::Id) -> RepoResult<Option<T>> {
    let sql = format!("SELECT * FROM {} WHERE {} = ?1", T::TABLE, T::ID_COLUMN);
    select_one::<T>(conn, &sql, id)
}

fn select_one<T: Entity>(conn: &Connection, sql: &str, key: &dyn ToSql) -> RepoResult<Option<T>> {
    let mut stmt = conn.prepare(sql).map_err(|source| RepoError::Preparation {
        sql: sql.to_string(),
        source,
    })?;
    let mut rows = stmt.query([key])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(T::from_row(row)?));
    }
    Ok(None)
}

fn delete_row<T: Entity>(conn: &Connection, id: &T::Id) -> RepoResult<usize> {
    let sql = format!("DELETE FROM {} WHERE {} = ?1", T::TABLE, T::ID_COLUMN);
    let deleted = conn.execute(&sql, [id])?;
    if deleted == 0 {
        debug!(
            "event=repo_delete module=repo entity={} status=noop id={:?}",
            T::TABLE,
            id
        );
    }
    Ok(deleted)
}

fn id_value(id: &dyn ToSql) -> RepoResult<Value> {
    Ok(match id.to_sql()? {
        ToSqlOutput::Borrowed(value) => Value::from(value),
        ToSqlOutput::Owned(value) => value,
        _ => {
            return Err(RepoError::InvalidData(
                "entity id must bind as a plain SQL value".to_string(),
            ))
        }
    })
}

fn non_id_values<T: Entity>(entity: &T) -> Vec<Value> {
    T::COLUMNS
        .iter()
        .zip(entity.values())
        .filter(|(column, _)| **column != T::ID_COLUMN)
        .map(|(_, value)| value)
        .collect()
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql<T: Entity>() -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        T::TABLE,
        T::COLUMNS.join(", "),
        placeholders(T::COLUMNS.len())
    )
}

fn update_sql<T: Entity>() -> String {
    let assignments = T::COLUMNS
        .iter()
        .filter(|column| **column != T::ID_COLUMN)
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        T::TABLE,
        assignments.join(", "),
        T::ID_COLUMN,
        assignments.len() + 1
    )
}

fn upsert_sql<T: Entity>() -> String {
    let assignments = T::COLUMNS
        .iter()
        .filter(|column| **column != T::ID_COLUMN)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>();
    let on_conflict = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };
    format!("{} ON CONFLICT({}) {}", insert_sql::<T>(), T::ID_COLUMN, on_conflict)
}

/// Wraps `sql` so at most `limit` rows are returned after skipping `offset`.
fn bounded_sql(sql: &str, limit: u64, offset: u64) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT * FROM ({inner}) LIMIT {limit} OFFSET {offset}")
}
