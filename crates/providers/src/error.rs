//! Provider error types and retry classification.

use thiserror::Error;

/// Errors from a provider adapter.
///
/// Retryable: transport failures and temporary upstream statuses (5xx, 429).
/// Everything else is permanent for the current attempt and surfaces as a
/// job failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider configuration: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("provider temporary status {0}")]
    TemporaryStatus(u16),

    #[error("provider status {0}")]
    Status(u16),

    #[error("read response body: {0}")]
    Body(String),

    #[error("decode provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::TemporaryStatus(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::TemporaryStatus(503).is_retryable());
        assert!(ProviderError::TemporaryStatus(429).is_retryable());
        assert!(!ProviderError::Status(400).is_retryable());
        assert!(!ProviderError::Parse("bad json".into()).is_retryable());
        assert!(!ProviderError::Config("no url".into()).is_retryable());
        assert!(!ProviderError::Body("truncated".into()).is_retryable());
    }
}
