//! Queue error types.

use thiserror::Error;

/// Errors from the shared-state layer (stream queue, rate limiter,
/// deduplicator, TTL cache).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("payload json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid redis address {0:?}, expected host:port")]
    InvalidAddr(String),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
