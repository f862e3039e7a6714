use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// Unique constraint, typically a second active row for a natural key.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// The store rejected a write on integrity grounds.
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            StorageError::Conflict(_) | StorageError::ForeignKeyViolation(_)
        )
    }
}
