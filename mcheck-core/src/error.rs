use thiserror::Error;

/// Failure of a single client call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache miss")]
    CacheMiss,

    #[error("item not stored")]
    NotStored,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::CacheMiss)
    }
}

#[derive(Error, Debug)]
pub enum McheckError {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, McheckError>;
