//! Worker error types.

use thiserror::Error;

/// A job-processing failure. Subject to the queue retry policy unless the
/// worker already turned it into a user-visible reply.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("storage: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("decrypt credential: {0}")]
    Envelope(#[from] envelope::EnvelopeError),

    #[error("provider chat: {0}")]
    Provider(#[from] providers::ProviderError),

    #[error("send reply: {0}")]
    Telegram(#[from] telegram_api::TelegramError),

    #[error("stored provider row: {0}")]
    BadProviderRow(String),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
