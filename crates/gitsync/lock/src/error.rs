use thiserror::Error;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("invalid lease ttl: {0}")]
    InvalidTtl(String),

    #[error("lock backend error: {0}")]
    Backend(String),
}
