// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Nova
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for Nova operations
#[derive(Error, Debug)]
pub enum NovaError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session errors
    #[error("Session error: {0}")]
    Session(String),

    /// Agent backend errors
    #[error("Agent error: {0}")]
    Agent(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,
}

/// Result type alias for Nova operations
pub type Result<T> = std::result::Result<T, NovaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nova_error_config() {
        let err = NovaError::Config("bad config".to_string());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_nova_error_session() {
        let err = NovaError::Session("already running".to_string());
        assert!(err.to_string().contains("Session error"));
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_nova_error_agent() {
        let err = NovaError::Agent("backend died".to_string());
        assert!(err.to_string().contains("Agent error"));
    }

    #[test]
    fn test_nova_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let nova_err: NovaError = io_err.into();
        assert!(nova_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_nova_error_from_api_error() {
        let api_err = ApiError::AuthenticationFailed;
        let nova_err: NovaError = api_err.into();
        assert!(nova_err.to_string().contains("API error"));
    }

    #[test]
    fn test_api_error_server_error() {
        let err = ApiError::ServerError {
            status: 500,
            message: "internal server error".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("internal server error"));
    }

    #[test]
    fn test_api_error_network() {
        let err = ApiError::Network("connection refused".to_string());
        assert!(err.to_string().contains("Network error"));
    }

    #[test]
    fn test_api_error_stream_error() {
        let err = ApiError::StreamError("stream closed".to_string());
        assert!(err.to_string().contains("Streaming error"));
    }

    #[test]
    fn test_api_error_timeout() {
        let err = ApiError::Timeout;
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_result_type_alias() {
        fn test_fn() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(test_fn().unwrap(), 42);
    }
}
