//! Ingress error types.

use thiserror::Error;

/// Errors escaping a command handler. The dispatcher logs them; the process
/// never crashes on a handler error.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("telegram: {0}")]
    Telegram(#[from] telegram_api::TelegramError),

    #[error("storage: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("queue: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("envelope: {0}")]
    Envelope(#[from] envelope::EnvelopeError),
}

/// Result type for ingress operations.
pub type Result<T> = std::result::Result<T, IngressError>;
