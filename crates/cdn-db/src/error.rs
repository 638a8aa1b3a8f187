//! Error types for the storage layer
//!
//! [`RepositoryError`] is what a backend reports; [`StoreError`] is the
//! backend-agnostic taxonomy handlers see after a [`crate::StoreController`]
//! has translated it.

use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum RepositoryError {
    NotFound,
    UniqueViolation,
    Unsupported(&'static str),
    Timeout(Duration),
    Postgres(Box<sqlx::Error>),
    Migrate(Box<sqlx::migrate::MigrateError>),
    Redis(Box<redis::RedisError>),
    Connection(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::NotFound => write!(f, "key does not exist"),
            RepositoryError::UniqueViolation => write!(f, "key already exists"),
            RepositoryError::Unsupported(op) => write!(f, "{} is not implemented", op),
            RepositoryError::Timeout(after) => write!(f, "operation timed out after {:?}", after),
            RepositoryError::Postgres(err) => write!(f, "Postgres error: {}", err),
            RepositoryError::Migrate(err) => write!(f, "Migration error: {}", err),
            RepositoryError::Redis(err) => write!(f, "Redis error: {}", err),
            RepositoryError::Connection(msg) => write!(f, "Connection error: {}", msg),
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepositoryError::Postgres(err) => Some(err.as_ref()),
            RepositoryError::Migrate(err) => Some(err.as_ref()),
            RepositoryError::Redis(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::UniqueViolation
            }
            _ => RepositoryError::Postgres(Box::new(err)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RepositoryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RepositoryError::Migrate(Box::new(err))
    }
}

impl From<redis::RedisError> for RepositoryError {
    fn from(err: redis::RedisError) -> Self {
        RepositoryError::Redis(Box::new(err))
    }
}

/// Shared error taxonomy for everything behind a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Expected miss; drives the cache-aside fallback
    KeyDoesNotExist(String),
    KeyAlreadyExists(String),
    NotImplemented(&'static str),
    /// Any durable-store failure other than a miss
    DatabaseOperation(String),
    /// Any cache failure other than a miss
    Cache(String),
}

impl StoreError {
    pub fn is_miss(&self) -> bool {
        matches!(self, StoreError::KeyDoesNotExist(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::KeyDoesNotExist(key) => write!(f, "key does not exist: {}", key),
            StoreError::KeyAlreadyExists(key) => write!(f, "key already exists: {}", key),
            StoreError::NotImplemented(op) => write!(f, "not implemented: {}", op),
            StoreError::DatabaseOperation(msg) => write!(f, "error on database operation: {}", msg),
            StoreError::Cache(msg) => write!(f, "cache error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_a_miss() {
        let err: RepositoryError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[test]
    fn test_other_sqlx_errors_are_wrapped() {
        let err: RepositoryError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, RepositoryError::Postgres(_)));
        assert!(format!("{}", err).starts_with("Postgres error"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::KeyDoesNotExist("0002".to_string());
        assert_eq!(format!("{}", err), "key does not exist: 0002");
        assert!(err.is_miss());

        let err = StoreError::DatabaseOperation("connection reset".to_string());
        assert_eq!(
            format!("{}", err),
            "error on database operation: connection reset"
        );
        assert!(!err.is_miss());
    }
}
