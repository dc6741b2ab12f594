//! Retry policy for remote catalog and download requests.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of attempts for one network operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Failures that another attempt cannot fix.
#[derive(Debug, Error)]
pub enum NonRetryableError {
    #[error("Rate limit exceeded: {0}. The Nexus API allows a limited number of requests per hour.")]
    RateLimitExceeded(String),

    #[error("Authentication failed: {0}. Check nexus_api_key in user_config.yaml or NOMM_API_KEY.")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access forbidden: {0}. Direct downloads need a premium account or a fresh nxm:// link.")]
    Forbidden(String),

    #[error("Request error: {0}")]
    ClientError(String),
}

/// Classify a failed status. `Ok(())` means another attempt may succeed.
pub fn classify_status(status: StatusCode) -> Result<(), NonRetryableError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(
            "invalid or missing API key".to_string(),
        )),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(
            "the server refused the request".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(
            "too many requests".to_string(),
        )),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(
            "the requested resource was not found".to_string(),
        )),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        // 5xx and anything else may be transient
        _ => Ok(()),
    }
}

/// Convert an `error_for_status()` failure, marking client errors as final.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match error.status().map(classify_status) {
        Some(Err(non_retryable)) => anyhow::Error::from(non_retryable),
        _ => anyhow::Error::from(error),
    }
}

pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NonRetryableError>().is_none()
}
