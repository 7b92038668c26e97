//! Shared HTTP helpers for adapters.

use crate::error::ProviderError;

/// Providers never get to stream more than this into memory.
pub(crate) const MAX_BODY_BYTES: usize = 4 << 20;

/// Map an HTTP status to a retry decision, or pass a 2xx through.
pub(crate) fn check_status(status: reqwest::StatusCode) -> Result<(), ProviderError> {
    let code = status.as_u16();
    if code >= 500 || code == 429 {
        return Err(ProviderError::TemporaryStatus(code));
    }
    if !status.is_success() {
        return Err(ProviderError::Status(code));
    }
    Ok(())
}

/// Read a response body under the size cap.
pub(crate) async fn read_body_capped(mut resp: reqwest::Response) -> Result<Vec<u8>, ProviderError> {
    let mut out = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ProviderError::Body(e.to_string()))?
    {
        let remaining = MAX_BODY_BYTES - out.len();
        if chunk.len() >= remaining {
            out.extend_from_slice(&chunk[..remaining]);
            break;
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_classification() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(check_status(StatusCode::CREATED).is_ok());
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS),
            Err(ProviderError::TemporaryStatus(429))
        ));
        assert!(matches!(
            check_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(ProviderError::TemporaryStatus(503))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_REQUEST),
            Err(ProviderError::Status(400))
        ));
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(ProviderError::Status(401))
        ));
    }
}
