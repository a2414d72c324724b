//! Claude API error classification, used by [`super::retry::RetryPolicy`]
//! to decide whether a failed call is worth retrying.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ClaudeApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("resource not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("server error ({0}): {1}")]
    ServerError(StatusCode, String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("unknown error ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl ClaudeApiError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest(body),
            401 => Self::InvalidApiKey,
            403 => Self::Forbidden(body),
            404 => Self::NotFound,
            429 => Self::RateLimitExceeded,
            500 | 502 | 503 | 504 | 529 => Self::ServerError(status, body),
            _ => Self::UnknownError(status, body),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError(_, _) | Self::NetworkError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_as_transient() {
        let err = ClaudeApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(err, ClaudeApiError::RateLimitExceeded));
        assert!(err.is_transient());
    }

    #[test]
    fn classifies_bad_request_as_permanent() {
        let err = ClaudeApiError::from_status(StatusCode::BAD_REQUEST, "bad".to_string());
        assert!(!err.is_transient());
    }

    #[test]
    fn classifies_overloaded_as_transient() {
        let err = ClaudeApiError::from_status(StatusCode::from_u16(529).unwrap(), "overloaded".to_string());
        assert!(err.is_transient());
    }
}
