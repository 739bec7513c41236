use common::ParseStatusError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired in time, or the database aborted the
    /// transaction because of a concurrent update. Retrying is safe.
    #[error("Concurrency conflict: {reason}")]
    Conflict { reason: String },

    /// A unique constraint was violated.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A row held a value the domain types cannot represent.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true when the failure came from lock contention.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                Some(LOCK_NOT_AVAILABLE | DEADLOCK_DETECTED | SERIALIZATION_FAILURE) => {
                    return StoreError::Conflict {
                        reason: db_err.message().to_string(),
                    };
                }
                Some(UNIQUE_VIOLATION) => {
                    return StoreError::UniqueViolation(
                        db_err.constraint().unwrap_or("unique").to_string(),
                    );
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

impl From<ParseStatusError> for StoreError {
    fn from(err: ParseStatusError) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
