use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature does not match")]
    InvalidSignature,
    #[error("webhook signature header is missing")]
    MissingSignature,
    #[error("webhook event type header is missing")]
    MissingEventType,
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error("failed to process webhook: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSignature | Self::MissingSignature => StatusCode::UNAUTHORIZED,
            Self::MissingEventType => StatusCode::BAD_REQUEST,
            Self::Malformed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
