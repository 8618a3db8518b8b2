//! Database-specific error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Row not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database query error: {0}")]
    Query(String),
}

impl DatabaseError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Connection(err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::Constraint(db_err.to_string())
            }
            other => DatabaseError::Query(other.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::NotFound));
    }

    #[test]
    fn only_connection_errors_are_retryable() {
        assert!(DatabaseError::Connection("pool timed out".to_string()).is_retryable());
        assert!(!DatabaseError::Constraint("duplicate key".to_string()).is_retryable());
        assert!(!DatabaseError::NotFound.is_retryable());
    }
}
