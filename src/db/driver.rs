//! Primitive driver contract
//!
//! Each backend implements [`Driver`]. Expected "zero rows" conditions are
//! reported through return values (`Vec::new()`, `None`, `rows_affected == 0`);
//! only genuine execution failures are errors.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::DbResult;
use super::statement::Statement;
use super::value::Row;
use crate::config::Runtime;

/// Structured outcome of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Whether the statement changed at least one row
    pub success: bool,
    pub rows_affected: u64,
    /// Generated identifier, when the engine reports one
    pub last_insert_id: Option<i64>,
}

impl WriteOutcome {
    pub fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            success: rows_affected > 0,
            rows_affected,
            last_insert_id: last_insert_id.filter(|id| *id > 0),
        }
    }
}

#[async_trait]
pub trait Driver: Send + Sync {
    /// Runtime this driver belongs to
    fn runtime(&self) -> Runtime;

    async fn fetch_all(&self, stmt: &Statement) -> DbResult<Vec<Row>>;

    async fn fetch_optional(&self, stmt: &Statement) -> DbResult<Option<Row>>;

    async fn execute(&self, stmt: &Statement) -> DbResult<WriteOutcome>;

    /// Run unparameterised SQL such as schema DDL
    async fn exec_raw(&self, sql: &str) -> DbResult<u64>;

    /// Connection self-test
    async fn ping(&self) -> DbResult<()>;

    async fn close(&self);
}

pub type DynDriver = Arc<dyn Driver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outcome() {
        let outcome = WriteOutcome::new(1, Some(42));
        assert!(outcome.success);
        assert_eq!(outcome.last_insert_id, Some(42));

        let outcome = WriteOutcome::new(0, Some(0));
        assert!(!outcome.success);
        assert_eq!(outcome.last_insert_id, None);
    }
}
