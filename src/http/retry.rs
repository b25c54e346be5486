//! Retry defaults and classification of HTTP failures.

use reqwest::StatusCode;

use crate::errors::ApiError;

/// Default number of attempts for an API request.
pub const MAX_RETRIES: usize = 3;

/// Default delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Longest response body excerpt carried in an error message.
const MAX_MESSAGE_LEN: usize = 200;

/// Maps a response status to an error. Returns `None` for success statuses.
pub fn classify_status(status: StatusCode, body: &str) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }

    let message = error_message(status, body);

    let error = match status {
        StatusCode::UNAUTHORIZED => ApiError::AuthenticationFailed(message),
        StatusCode::FORBIDDEN => {
            if body.to_lowercase().contains("rate limit") {
                ApiError::RateLimitExceeded(message)
            } else {
                ApiError::Forbidden(message)
            }
        }
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimitExceeded(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        s if s.is_server_error() => ApiError::ServerError {
            status: s.as_u16(),
            message,
        },
        // Remaining 4xx, and 1xx/3xx that reqwest did not follow
        s => ApiError::ClientError {
            status: s.as_u16(),
            message,
        },
    };

    Some(error)
}

/// Whether an error returned by a request attempt is worth another attempt.
///
/// Typed API errors decide for themselves. Of the transport errors only
/// connect, timeout and send failures are retried; once a response has
/// arrived the server may already have acted on the request.
pub fn is_retryable_error(e: &anyhow::Error) -> bool {
    if let Some(api_error) = e.downcast_ref::<ApiError>() {
        return api_error.is_retryable();
    }
    match e.downcast_ref::<reqwest::Error>() {
        Some(err) => err.is_connect() || err.is_timeout() || err.is_request(),
        None => false,
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string();
    }

    let mut message: String = body.chars().take(MAX_MESSAGE_LEN).collect();
    if body.chars().count() > MAX_MESSAGE_LEN {
        message.push_str("...");
    }
    message
}
