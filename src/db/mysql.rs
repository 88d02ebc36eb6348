//! Server driver backed by a pooled MySQL connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow},
    query::Query,
    Column, Row as _, TypeInfo, ValueRef,
};

use super::driver::{Driver, WriteOutcome};
use super::error::{DatabaseError, DbResult};
use super::statement::Statement;
use super::value::{Row, SqlValue};
use crate::config::Runtime;

pub struct MysqlDriver {
    pool: MySqlPool,
}

impl MysqlDriver {
    pub async fn connect(url: &str, max_connections: u32) -> DbResult<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_url)
            .await
            .map_err(|e| DatabaseError::from_sqlx("Failed to connect to MySQL database", e))?;

        Ok(Self { pool })
    }
}

fn bind<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
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

/// Decode by declared column type.
fn decode_row(row: &MySqlRow) -> DbResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let decode_err = |e: sqlx::Error| {
            DatabaseError::from_sqlx(format!("Failed to decode column {}", column.name()), e)
        };

        let type_name = {
            let raw = row.try_get_raw(idx).map_err(decode_err)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match type_name.as_deref() {
            None => SqlValue::Null,
            Some("BOOLEAN") => SqlValue::Bool(row.try_get::<bool, _>(idx).map_err(decode_err)?),
            Some("TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR") => {
                SqlValue::Int(row.try_get::<i64, _>(idx).map_err(decode_err)?)
            }
            Some(t) if t.ends_with(" UNSIGNED") => {
                let v = row.try_get::<u64, _>(idx).map_err(decode_err)?;
                match i64::try_from(v) {
                    Ok(v) => SqlValue::Int(v),
                    Err(_) => SqlValue::Text(v.to_string()),
                }
            }
            Some("FLOAT") => SqlValue::Float(row.try_get::<f32, _>(idx).map_err(decode_err)? as f64),
            Some("DOUBLE") => SqlValue::Float(row.try_get::<f64, _>(idx).map_err(decode_err)?),
            Some("TIMESTAMP" | "DATETIME") => {
                SqlValue::Timestamp(row.try_get::<DateTime<Utc>, _>(idx).map_err(decode_err)?)
            }
            Some(_) => match row.try_get::<String, _>(idx) {
                Ok(s) => SqlValue::Text(s),
                Err(_) => match row.try_get::<Vec<u8>, _>(idx) {
                    Ok(bytes) => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(_) => SqlValue::Text(
                        row.try_get_unchecked::<String, _>(idx)
                            .map_err(decode_err)?,
                    ),
                },
            },
        };

        columns.push(name);
        values.push(value);
    }

    Ok(Row::new(columns, values))
}

#[async_trait]
impl Driver for MysqlDriver {
    fn runtime(&self) -> Runtime {
        Runtime::Server
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
            i64::try_from(result.last_insert_id()).ok(),
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
