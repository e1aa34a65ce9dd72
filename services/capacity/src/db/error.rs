//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The requested record does not exist.
    ///
    /// Callers treat this as an empty result rather than a failure.
    #[error("{0} not found")]
    NotFound(String),

    /// Failed to connect to the database or acquire a connection.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A stored value could not be decoded into its domain type.
    #[error("invalid value in column {column}: {message}")]
    Decode {
        column: &'static str,
        message: String,
    },

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/capacity.")]
    MigrationDirNotFound { tried: String, last_error: String },
}

impl DbError {
    /// Maps a query error, folding sqlx's `RowNotFound` into [`DbError::NotFound`].
    pub fn query(what: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound(what.to_string()),
            other => DbError::Query(other),
        }
    }

    /// Returns true if this error only means "no such record".
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_not_found() {
        let err = DbError::query("task", sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "task not found");
    }

    #[test]
    fn test_other_errors_are_query_errors() {
        let err = DbError::query("task", sqlx::Error::PoolTimedOut);
        assert!(!err.is_not_found());
        assert!(matches!(err, DbError::Query(sqlx::Error::PoolTimedOut)));
    }
}
