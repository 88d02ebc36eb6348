//! Database error taxonomy

use thiserror::Error;

/// Errors surfaced by the database adapter and drivers.
///
/// "Not found" is never an error here: reads return `None` or an empty
/// vector and callers decide what absence means.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The driver rejected or failed to run a statement
    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// A unique constraint rejected the write
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The driver ran the statement but reported nothing written
    #[error("{operation} reported no rows written")]
    WriteFailed { operation: &'static str },

    /// Placeholder count and bind count disagree
    #[error("statement has {placeholders} placeholder(s) but {binds} bind value(s)")]
    ParameterMismatch { placeholders: usize, binds: usize },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column '{column}' cannot be read as {expected}")]
    Decode {
        column: String,
        expected: &'static str,
    },

    /// No usable driver for the configured runtime
    #[error("database environment unavailable: {0}")]
    EnvironmentUnavailable(String),
}

impl DatabaseError {
    /// Wrap a sqlx error, promoting unique-constraint failures to
    /// [`DatabaseError::UniqueViolation`].
    pub fn from_sqlx(context: impl Into<String>, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::UniqueViolation(db_err.message().to_string());
            }
        }
        DatabaseError::Driver {
            context: context.into(),
            source: err,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatabaseError::UniqueViolation(_))
    }
}

pub type DbResult<T> = Result<T, DatabaseError>;
