//! Edge driver backed by an embedded SQLite handle.
//!
//! In the edge runtime the host owns the database handle and injects it with
//! [`SqliteDriver::from_handle`]. [`SqliteDriver::open`] builds a handle from
//! a path or URL for local runs and tests.

use async_trait::async_trait;
use sqlx::{
    query::Query,
    sqlite::{Sqlite, SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow},
    Column, Row as _, TypeInfo, ValueRef,
};

use super::driver::{Driver, WriteOutcome};
use super::error::{DatabaseError, DbResult};
use super::statement::Statement;
use super::value::{Row, SqlValue};
use crate::config::Runtime;

pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    /// Wrap a handle supplied by the host.
    pub fn from_handle(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool from a file path, `sqlite:` URL or `:memory:`.
    pub async fn open(url: &str, max_connections: u32) -> DbResult<Self> {
        if !url.starts_with(":memory:") && !url.starts_with("sqlite::memory:") {
            let path = url.trim_start_matches("sqlite:");
            let path = path.split('?').next().unwrap_or(path);

            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::EnvironmentUnavailable(format!(
                            "cannot create database directory {:?}: {}",
                            parent, e
                        ))
                    })?;
                }
            }
        }

        let connection_url = if url.starts_with("sqlite:") {
            if url.contains('?') || url.starts_with("sqlite::memory:") {
                url.to_string()
            } else {
                format!("{}?mode=rwc", url)
            }
        } else if url == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_url)
            .await
            .map_err(|e| {
                DatabaseError::from_sqlx(format!("Failed to open SQLite database {}", url), e)
            })?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Failed to enable foreign keys", e))?;

        Ok(Self { pool })
    }
}

fn bind<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// Decode by the storage class of each value, not the declared column type.
fn decode_row(row: &SqliteRow) -> DbResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let decode_err = |e: sqlx::Error| {
            DatabaseError::from_sqlx(format!("Failed to decode column {}", column.name()), e)
        };

        let storage = {
            let raw = row.try_get_raw(idx).map_err(decode_err)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage.as_deref() {
            None => SqlValue::Null,
            Some("INTEGER") => SqlValue::Int(row.try_get::<i64, _>(idx).map_err(decode_err)?),
            Some("REAL") => SqlValue::Float(row.try_get::<f64, _>(idx).map_err(decode_err)?),
            Some("BLOB") => {
                let bytes = row.try_get::<Vec<u8>, _>(idx).map_err(decode_err)?;
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(_) => SqlValue::Text(row.try_get_unchecked::<String, _>(idx).map_err(decode_err)?),
        };

        columns.push(name);
        values.push(value);
    }

    Ok(Row::new(columns, values))
}

#[async_trait]
impl Driver for SqliteDriver {
    fn runtime(&self) -> Runtime {
        Runtime::Edge
    }

    async fn fetch_all(&self, stmt: &Statement) -> DbResult<Vec<Row>> {
        let rows = bind(sqlx::query(stmt.sql()), stmt.params())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Failed to fetch rows", e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_optional(&self, stmt: &Statement) -> DbResult<Option<Row>> {
        let row = bind(sqlx::query(stmt.sql()), stmt.params())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Failed to fetch row", e))?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn execute(&self, stmt: &Statement) -> DbResult<WriteOutcome> {
        let result = bind(sqlx::query(stmt.sql()), stmt.params())
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Failed to execute statement", e))?;
        Ok(WriteOutcome::new(
            result.rows_affected(),
            Some(result.last_insert_rowid()),
        ))
    }

    async fn exec_raw(&self, sql: &str) -> DbResult<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Failed to execute raw SQL", e))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Database ping failed", e))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
