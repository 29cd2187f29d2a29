use crate::webhook::signature::SignatureError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Why a webhook request could not be processed
#[derive(Error, Debug)]
pub enum WebhookError {
    /// The request is not provably from Twilio
    #[error("Authentication failed: {0}")]
    Authentication(SignatureError),

    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    /// Anything that went wrong after the request was accepted
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing From parameter")]
    MissingSender,

    #[error("{0}")]
    Malformed(String),
}

impl WebhookError {
    pub fn missing_sender() -> Self {
        WebhookError::Validation(ValidationError::MissingSender)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        WebhookError::Validation(ValidationError::Malformed(message.into()))
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        WebhookError::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Authentication(_) => StatusCode::FORBIDDEN,
            WebhookError::Validation(_) => StatusCode::BAD_REQUEST,
            WebhookError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent back to the caller. Deliberately terse: details go to the log.
    pub fn public_message(&self) -> &'static str {
        match self {
            WebhookError::Authentication(_) => "Invalid signature",
            WebhookError::Validation(ValidationError::MissingSender) => "Missing From",
            WebhookError::Validation(ValidationError::Malformed(_)) => "Bad Request",
            WebhookError::Unexpected(_) => "Server error",
        }
    }
}

impl From<SignatureError> for WebhookError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Malformed(message) => WebhookError::malformed(message),
            auth => WebhookError::Authentication(auth),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}
