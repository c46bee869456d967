//! Webhook error taxonomy.
//!
//! Envelope-level and authorization-level failures abort the request with the
//! mapped status code before any state mutation. Per-record, upstream and
//! cleanup failures are logged where they happen and never surface here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::web::signature::SignatureError;

/// Request-aborting webhook errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("unauthorized topic: {0}")]
    UnauthorizedTopic(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(#[from] SignatureError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MalformedEnvelope(_) | WebhookError::UnknownMessageType(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::UnauthorizedTopic(_) | WebhookError::SignatureInvalid(_) => {
                StatusCode::FORBIDDEN
            }
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            WebhookError::MalformedEnvelope(_) => "malformed_envelope",
            WebhookError::UnknownMessageType(_) => "unknown_message_type",
            WebhookError::UnauthorizedTopic(_) => "unauthorized_topic",
            WebhookError::SignatureInvalid(_) => "signature_invalid",
            WebhookError::Internal(_) => "internal_error",
        }
    }
}

/// Error body returned to the caller (machine-to-machine, no human surface).
#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    error: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status_label(),
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            WebhookError::MalformedEnvelope("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::UnknownMessageType("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::UnauthorizedTopic("arn".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WebhookError::SignatureInvalid(SignatureError::Mismatch).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WebhookError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
