//! Error types for the trade client library.

use thiserror::Error;

/// The main error type for all trade client operations.
#[derive(Error, Debug)]
pub enum TradeError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Rate limit headers were missing or malformed, so no limiter could be built.
    ///
    /// Operating without the server's quota data risks a ban, so this is never
    /// recovered from.
    #[error("Rate limit configuration error: {0}")]
    Configuration(String),

    /// The server rejected a request that was already retried, or rejected it
    /// for a reason other than a rate limit.
    #[error("Connection failure (HTTP {status}): {body}")]
    ConnectionFailure {
        /// HTTP status code of the rejected response
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Invalid response from the API
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A wait was aborted through the client's cancellation token
    #[error("Request cancelled")]
    Cancelled,
}

impl TradeError {
    /// Check if this is a terminal rejection from the server.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. })
    }

    /// Check if this is a rate limit configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// HTTP status of the rejected response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ConnectionFailure { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_display() {
        let error = TradeError::ConnectionFailure {
            status: 429,
            body: "{\"error\":{\"code\":3}}".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Connection failure (HTTP 429): {\"error\":{\"code\":3}}"
        );
        assert!(error.is_connection_failure());
        assert_eq!(error.status(), Some(429));
    }

    #[test]
    fn test_configuration_error() {
        let error = TradeError::Configuration("missing X-Rate-Limit-Account".into());
        assert!(error.is_configuration());
        assert!(!error.is_connection_failure());
        assert_eq!(error.status(), None);
    }
}
