// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Classified upstream API error carrying the platform's status code
    #[error("API error (code {code}): {message}")]
    Api { code: u16, message: String },

    /// Listing endpoint returned a malformed page or a non-ok status
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Document store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure class driving retry behavior in the fetch pool.
///
/// - `RateLimited`: shared-resource exhaustion; requeue and pause the whole
///   pool (upstream signals this with code 429 or an unclassified code 0).
/// - `NotFound`: the resource no longer exists (400/404), terminal for the
///   task and recorded as a deletion signal.
/// - `Transport`: timeouts, connection resets, malformed payloads; requeue
///   with a short worker-local pause.
/// - `Other`: any remaining client/protocol error; requeue, no pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    NotFound,
    Transport,
    Other,
}

impl AppError {
    /// Create an API error with the upstream status code.
    pub fn api(code: u16, message: impl fmt::Display) -> Self {
        Self::Api {
            code,
            message: message.to_string(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this error for retry handling.
    pub fn class(&self) -> FailureClass {
        match self {
            AppError::Api { code, .. } => match code {
                0 | 429 => FailureClass::RateLimited,
                400 | 404 => FailureClass::NotFound,
                _ => FailureClass::Other,
            },
            AppError::Http(_) | AppError::Json(_) | AppError::Io(_) | AppError::Protocol(_) => {
                FailureClass::Transport
            }
            _ => FailureClass::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_codes() {
        assert_eq!(
            AppError::api(429, "slow down").class(),
            FailureClass::RateLimited
        );
        assert_eq!(
            AppError::api(0, "unclassified").class(),
            FailureClass::RateLimited
        );
    }

    #[test]
    fn test_not_found_codes() {
        assert_eq!(AppError::api(404, "gone").class(), FailureClass::NotFound);
        assert_eq!(
            AppError::api(400, "bad request").class(),
            FailureClass::NotFound
        );
    }

    #[test]
    fn test_other_api_codes_are_retryable() {
        assert_eq!(AppError::api(500, "server").class(), FailureClass::Other);
        assert_eq!(AppError::api(403, "forbidden").class(), FailureClass::Other);
    }

    #[test]
    fn test_protocol_is_transport() {
        assert_eq!(
            AppError::protocol("status not ok").class(),
            FailureClass::Transport
        );
    }
}
