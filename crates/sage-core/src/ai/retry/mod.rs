//! Retry policy for completion requests

mod backoff;

pub use backoff::{
    is_retryable_status, parse_retry_after, with_retry, IsRetryable, RetryConfig,
    RETRYABLE_STATUS_CODES,
};
