//! Error types for the notification subsystem.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use pesabridge_core::ClientId;

/// Notification subsystem error variants.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Database error: {0}")]
    Database(#[from] pesabridge_db::DbError),

    #[error("Notification not found")]
    NotificationNotFound,

    #[error("Operation not found")]
    OperationNotFound,

    /// Client {client_id} has no signing secret registered.
    ///
    /// Escalated by the delivery engine as a permanent failure: without a
    /// secret the receiving side cannot verify the webhook.
    #[error("No signing secret registered for client {client_id}")]
    NoSigningSecret { client_id: ClientId },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid destination URL: {0}")]
    InvalidUrl(String),

    #[error("SSRF protection: {0}")]
    SsrfDetected(String),

    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response returned by the notification API endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            NotifyError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            NotifyError::NotificationNotFound => {
                (StatusCode::NOT_FOUND, "notification_not_found")
            }
            NotifyError::OperationNotFound => (StatusCode::NOT_FOUND, "operation_not_found"),
            NotifyError::NoSigningSecret { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "no_signing_secret")
            }
            NotifyError::EncryptionFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "encryption_error")
            }
            NotifyError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            NotifyError::SsrfDetected(_) => (StatusCode::BAD_REQUEST, "ssrf_detected"),
            NotifyError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
            NotifyError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_signing_secret_names_the_client() {
        let client_id = ClientId::new();
        let err = NotifyError::NoSigningSecret { client_id };
        assert!(err.to_string().contains(&client_id.to_string()));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = NotifyError::NotificationNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_query_maps_to_400() {
        let response = NotifyError::InvalidQuery("unknown status".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
