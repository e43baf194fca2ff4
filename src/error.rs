// for error definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimiterError {
    /// Errors related to the storage backend
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store could not be reached (connect failure, timeout, broken socket)
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected our credentials
    #[error("Store authentication error: {0}")]
    Auth(String),

    /// A command was rejected or returned an error entry
    #[error("Store command error: {0}")]
    Command(String),

    /// The HTTP endpoint answered with a non-success status
    #[error("Store returned unexpected status {0}")]
    UnexpectedStatus(u16),

    /// Data serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),
}

impl From<StorageError> for RateLimiterError {
    fn from(err: StorageError) -> Self {
        RateLimiterError::Storage(err)
    }
}

impl From<redis::RedisError> for RateLimiterError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                RateLimiterError::Storage(StorageError::Auth(err.to_string()))
            }
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                RateLimiterError::Storage(StorageError::Connection(err.to_string()))
            }
            _ => RateLimiterError::Storage(StorageError::Command(err.to_string())),
        }
    }
}

impl From<reqwest::Error> for RateLimiterError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return RateLimiterError::Storage(StorageError::UnexpectedStatus(status.as_u16()));
        }
        if err.is_decode() {
            RateLimiterError::Storage(StorageError::Serialization(err.to_string()))
        } else {
            // timeouts, refused connections, TLS failures
            RateLimiterError::Storage(StorageError::Connection(err.to_string()))
        }
    }
}

// implement conversions from serde_json::Error to RateLimiterError
impl From<serde_json::Error> for RateLimiterError {
    fn from(err: serde_json::Error) -> Self {
        RateLimiterError::Storage(StorageError::Serialization(err.to_string()))
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, RateLimiterError>;
