//! Error types for ResearchForge
//!
//! Provides a single error enum shared by every crate with:
//! - Distinct variants for each collaborator (completion, search, retrieval, cache)
//! - Machine-readable error codes
//! - Retry classification for transient upstream failures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // External service errors (8xxx)
    UpstreamError,
    CompletionError,
    CompletionResponseError,
    SearchError,
    RetrievalError,
    Timeout,
    CacheError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::CompletionError => 8002,
            ErrorCode::CompletionResponseError => 8003,
            ErrorCode::SearchError => 8004,
            ErrorCode::RetrievalError => 8005,
            ErrorCode::Timeout => 8006,
            ErrorCode::CacheError => 8007,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Completion service errors
    #[error("Completion service error: {message}")]
    Llm { message: String },

    #[error("Completion service returned unusable output: {message}")]
    LlmResponse { message: String },

    // Web search / scrape errors
    #[error("Search service error: {message}")]
    Search { message: String },

    // Vector / knowledge-base errors
    #[error("Retrieval service error: {message}")]
    Retrieval { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Llm { .. } => ErrorCode::CompletionError,
            AppError::LlmResponse { .. } => ErrorCode::CompletionResponseError,
            AppError::Search { .. } => ErrorCode::SearchError,
            AppError::Retrieval { .. } => ErrorCode::RetrievalError,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a retry of the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout { .. } => true,
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    /// Check if this error originates from an upstream collaborator
    pub fn is_upstream(&self) -> bool {
        self.code().as_code() / 1000 == 8
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string()
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string()
        }
    }
}
