//! Error types returned by the Senler API client.

use std::fmt;

/// Typed failure of a Senler API operation.
///
/// Operations return `anyhow::Result`; an `ApiError` travels inside the
/// `anyhow::Error` and is recovered with `downcast_ref::<ApiError>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Client configuration is unusable (empty token, malformed base URL, ...)
    InvalidConfig(String),
    /// A single request could not be built (empty url, non-object params, ...)
    InvalidRequest(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 403 that is not a rate limit
    Forbidden(String),
    /// HTTP 429, or 403 with a rate limit message
    RateLimitExceeded(String),
    /// HTTP 404
    NotFound(String),
    /// Other 4xx responses
    ClientError { status: u16, message: String },
    /// 5xx responses
    ServerError { status: u16, message: String },
    /// A success response whose body is not valid JSON
    InvalidResponse(String),
}

impl ApiError {
    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::InvalidConfig(_)
            | ApiError::InvalidRequest(_)
            | ApiError::InvalidResponse(_) => None,
            ApiError::AuthenticationFailed(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::RateLimitExceeded(_) => Some(429),
            ApiError::NotFound(_) => Some(404),
            ApiError::ClientError { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::ServerError { .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::AuthenticationFailed(msg) => {
                write!(
                    f,
                    "Authentication failed: {}. Check your SENLER_ACCESS_TOKEN.",
                    msg
                )
            }
            ApiError::Forbidden(msg) => write!(f, "Access forbidden: {}", msg),
            ApiError::RateLimitExceeded(msg) => {
                write!(f, "Rate limit exceeded: {}. Try again later.", msg)
            }
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ClientError { status, message } => {
                write!(f, "Request error (HTTP {}): {}", status, message)
            }
            ApiError::ServerError { status, message } => {
                write!(f, "Server error (HTTP {}): {}", status, message)
            }
            ApiError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
