use thiserror::Error;

pub type SafebinResult<T> = Result<T, SafebinError>;

#[derive(Debug, Error)]
pub enum SafebinError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid key")]
    InvalidKey,

    #[error("not found")]
    NotFound,

    #[error("payload too large")]
    TooLarge,

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<redb::DatabaseError> for SafebinError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::TransactionError> for SafebinError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::TableError> for SafebinError {
    fn from(err: redb::TableError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::StorageError> for SafebinError {
    fn from(err: redb::StorageError) -> Self {
        Self::Database(err.into())
    }
}

impl From<redb::CommitError> for SafebinError {
    fn from(err: redb::CommitError) -> Self {
        Self::Database(err.into())
    }
}
