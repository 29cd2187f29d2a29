//! Error types for completion provider operations
//!
//! The reply synthesizer absorbs every one of these into fallback text, so the
//! variants exist for logging and tests, not for control flow upstream.

use thiserror::Error;

/// Errors that can occur when calling a completion provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network-related errors (connection issues, DNS failures)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Authentication errors (invalid API key, unauthorized access)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Rate limit errors (too many requests, quota exceeded)
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// Invalid request errors (bad parameters, malformed input)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Request took too long
    #[error("Request timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Errors reported by the completion service itself
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        code: Option<String>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration errors (missing API key, invalid settings)
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ProviderError {
    /// Returns true if this error indicates an authentication problem
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ProviderError::Auth { .. })
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn provider(message: impl Into<String>, code: Option<impl Into<String>>) -> Self {
        Self::Provider {
            message: message.into(),
            code: code.map(|c| c.into()),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
