//! Database layer
//!
//! Inkpost runs the same repositories against two engines:
//! - MySQL through a connection pool (the `server` runtime)
//! - SQLite through a handle injected by the host (the `edge` runtime)
//!
//! # Architecture
//!
//! Each engine implements the [`Driver`] trait. Repositories never see a
//! driver directly; they call [`Database`], which validates every
//! [`Statement`] and routes it to the driver chosen at startup. The engine is
//! picked from configuration, never sniffed from the environment.
//!
//! Booleans and timestamps always travel as bound parameters, so SQL text is
//! shared between engines. The remaining syntax differences (upserts,
//! insert-ignore, reserved identifiers) go through [`Dialect`].
//!
//! # Usage
//!
//! ```ignore
//! use inkpost::db::{migrations, Database};
//! use inkpost::params;
//!
//! let db = Database::connect(config.runtime, &config.database).await?;
//! migrations::run_migrations(&db).await?;
//!
//! let rows = db.query("SELECT * FROM posts WHERE is_featured = ?", params![true]).await?;
//! ```

pub mod adapter;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod migrations;
pub mod mysql;
pub mod repositories;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use adapter::Database;
pub use dialect::Dialect;
pub use driver::{Driver, DynDriver, WriteOutcome};
pub use error::{DatabaseError, DbResult};
pub use mysql::MysqlDriver;
pub use sqlite::SqliteDriver;
pub use statement::Statement;
pub use value::{parse_timestamp, Row, SqlValue};

/// Create an in-memory database with all migrations applied (for testing)
#[cfg(test)]
pub async fn create_test_db() -> anyhow::Result<Database> {
    let db = Database::in_memory().await?;
    migrations::run_migrations(&db).await?;
    Ok(db)
}
