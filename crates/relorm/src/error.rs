//! Error types for relorm

use crate::value::Value;
use thiserror::Error;

/// Result type alias for relorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// SQLite reported a failure while preparing or stepping a statement.
    ///
    /// Carries the statement text and bound arguments for diagnostics.
    #[error("Engine error: {source} (sql: `{sql}`, arguments: {arguments:?})")]
    Engine {
        #[source]
        source: rusqlite::Error,
        sql: String,
        arguments: Vec<Value>,
    },

    /// SQLite error that is not tied to a particular statement.
    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// The caller violated a structural contract of the API.
    ///
    /// These are defects in calling code, not data-dependent failures: they are never
    /// retried and never swallowed.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Wrap an engine error with the statement that produced it.
    pub fn engine(source: rusqlite::Error, sql: impl Into<String>, arguments: &[Value]) -> Self {
        Self::Engine {
            source,
            sql: sql.into(),
            arguments: arguments.to_vec(),
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a usage error
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a decode error
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// The SQL statement attached to an engine error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Engine { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The underlying SQLite error, if any.
    pub fn sqlite_error(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::Engine { source, .. } => Some(source),
            Self::Query(source) => Some(source),
            _ => None,
        }
    }

    /// Check if this is a UNIQUE or PRIMARY KEY constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self.extended_code(),
            Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        )
    }

    /// Check if this is a FOREIGN KEY constraint violation
    pub fn is_foreign_key_violation(&self) -> bool {
        self.extended_code() == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
    }

    /// Check if this is a CHECK constraint violation
    pub fn is_check_violation(&self) -> bool {
        self.extended_code() == Some(rusqlite::ffi::SQLITE_CONSTRAINT_CHECK)
    }

    fn extended_code(&self) -> Option<i32> {
        match self.sqlite_error()? {
            rusqlite::Error::SqliteFailure(err, _) => Some(err.extended_code),
            _ => None,
        }
    }
}
