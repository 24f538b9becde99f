use thiserror::Error;

/// Main error type for the analysis crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("analysis not found: {0}")]
    NotFound(i64),

    #[error("invalid value in stored record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;
