//! The database adapter every repository talks to.
//!
//! [`Database`] is built once at startup from configuration (or from a handle
//! injected by the edge host) and routes each call through the chosen
//! [`Driver`](super::Driver). It exposes one method per result shape so
//! callers always know what comes back.

use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use super::dialect::Dialect;
use super::driver::DynDriver;
use super::error::{DatabaseError, DbResult};
use super::mysql::MysqlDriver;
use super::sqlite::SqliteDriver;
use super::statement::Statement;
use super::value::{Row, SqlValue};
use crate::config::{DatabaseConfig, Runtime};

#[derive(Clone)]
pub struct Database {
    driver: DynDriver,
    dialect: Dialect,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("runtime", &self.driver.runtime())
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl Database {
    /// Connect the driver that belongs to `runtime`.
    ///
    /// A URL that does not fit the runtime is rejected up front instead of
    /// guessing which engine was meant.
    pub async fn connect(runtime: Runtime, config: &DatabaseConfig) -> DbResult<Self> {
        let url = config.url.trim();
        if url.is_empty() {
            return Err(DatabaseError::EnvironmentUnavailable(
                "no database url configured".to_string(),
            ));
        }

        let driver: DynDriver = match runtime {
            Runtime::Server => {
                if !url.starts_with("mysql://") {
                    return Err(DatabaseError::EnvironmentUnavailable(format!(
                        "server runtime needs a mysql:// url, got '{}'",
                        url
                    )));
                }
                Arc::new(MysqlDriver::connect(url, config.max_connections).await?)
            }
            Runtime::Edge => {
                if url.starts_with("mysql://") {
                    return Err(DatabaseError::EnvironmentUnavailable(
                        "edge runtime cannot use a mysql:// url".to_string(),
                    ));
                }
                Arc::new(SqliteDriver::open(url, config.max_connections).await?)
            }
        };

        tracing::info!("Connected {} database driver", runtime);
        Ok(Self::from_driver(driver))
    }

    pub fn from_driver(driver: DynDriver) -> Self {
        let dialect = Dialect::for_runtime(driver.runtime());
        Self { driver, dialect }
    }

    /// Wrap the SQLite handle the edge host provides.
    pub fn from_edge_handle(pool: SqlitePool) -> Self {
        Self::from_driver(Arc::new(SqliteDriver::from_handle(pool)))
    }

    /// Fresh private in-memory SQLite database, used by tests.
    pub async fn in_memory() -> DbResult<Self> {
        let driver = SqliteDriver::open(":memory:", 1).await?;
        Ok(Self::from_driver(Arc::new(driver)))
    }

    pub fn runtime(&self) -> Runtime {
        self.driver.runtime()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn prepare(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<Statement> {
        let stmt = Statement::new(self.dialect, sql, params)?;
        tracing::debug!(
            sql = %stmt.preview(),
            binds = stmt.params().len(),
            "executing statement"
        );
        Ok(stmt)
    }

    /// Run a read. No rows is an empty vector.
    pub async fn query(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<Vec<Row>> {
        let stmt = self.prepare(sql, params)?;
        self.driver.fetch_all(&stmt).await
    }

    /// First row of a read, or `None`.
    pub async fn query_one(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<Option<Row>> {
        let stmt = self.prepare(sql, params)?;
        self.driver.fetch_optional(&stmt).await
    }

    /// Run an insert and return the generated id.
    pub async fn insert(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<i64> {
        let stmt = self.prepare(sql, params)?;
        let outcome = self.driver.execute(&stmt).await?;
        match outcome.last_insert_id {
            Some(id) if outcome.success => Ok(id),
            _ => Err(DatabaseError::WriteFailed { operation: "insert" }),
        }
    }

    /// Run an update and return the affected row count.
    pub async fn update(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<u64> {
        let stmt = self.prepare(sql, params)?;
        Ok(self.driver.execute(&stmt).await?.rows_affected)
    }

    /// Run a delete and return the affected row count.
    pub async fn delete(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<u64> {
        let stmt = self.prepare(sql, params)?;
        Ok(self.driver.execute(&stmt).await?.rows_affected)
    }

    /// Any other parameterised write (upserts, insert-ignore).
    pub async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<u64> {
        let stmt = self.prepare(sql, params)?;
        Ok(self.driver.execute(&stmt).await?.rows_affected)
    }

    /// Unparameterised SQL, for schema changes.
    pub async fn execute_raw(&self, sql: &str) -> DbResult<u64> {
        self.driver.exec_raw(sql).await
    }

    pub async fn ping(&self) -> DbResult<()> {
        self.driver.ping().await
    }

    pub async fn close(&self) {
        self.driver.close().await;
    }
}
