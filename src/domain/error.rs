//! Crate-wide error type.

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, PriceWatchError>;

#[derive(Error, Debug)]
pub enum PriceWatchError {
    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from an upstream API
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: retry after {retry_after:?}")]
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file errors
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parse errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Retry exhausted
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: usize,
        last_error: Box<PriceWatchError>,
    },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PriceWatchError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PriceWatchError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PriceWatchError::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        PriceWatchError::Internal(msg.into())
    }

    /// Create an API error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        PriceWatchError::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PriceWatchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PriceWatchError::RateLimited { .. } => true,
            PriceWatchError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
