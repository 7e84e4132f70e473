use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use super::transport::TransportError;

/// Failures surfaced by the request client once retries are exhausted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Request timed out after {0:?} - check the connection and try again")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Payload too large - use smaller images or remove some of them")]
    PayloadTooLarge,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("HTTP {status}: {reason}")]
    Client {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Server error {status}: {reason}")]
    Server {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid JSON response from server: {0}")]
    Decode(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        if status == StatusCode::PAYLOAD_TOO_LARGE
            || body.to_ascii_lowercase().contains("payload too large")
        {
            return ApiError::PayloadTooLarge;
        }
        match status.as_u16() {
            429 => ApiError::RateLimited,
            code @ 400..=499 => ApiError::Client {
                status: code,
                reason,
                body: truncated,
            },
            code @ 500..=599 => ApiError::Server {
                status: code,
                reason,
                body: truncated,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn from_transport(error: TransportError, deadline: Duration) -> Self {
        match error {
            TransportError::Timeout => ApiError::Timeout(deadline),
            TransportError::Connection(msg) => ApiError::Network(msg),
        }
    }

    /// Whether another attempt may succeed: timeouts, connection failures,
    /// rate limiting and server errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout(_)
                | ApiError::Network(_)
                | ApiError::RateLimited
                | ApiError::Server { .. }
        )
    }

    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::RateLimited => Some(429),
            ApiError::PayloadTooLarge => Some(413),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}
