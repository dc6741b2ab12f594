//! HTTP client module with retry logic and error handling.

mod client;
mod retry;

pub use client::{APPLICATION_NAME, APPLICATION_VERSION, HttpClient, build_client};
pub use retry::{
    MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable, classify_status, is_retryable,
};
