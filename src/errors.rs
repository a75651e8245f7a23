use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "error": "Conflict",
    "kind": "conflict",
    "message": "Already enrolled in this course",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Stable machine-readable error kind
    #[schema(example = "conflict")]
    pub kind: String,
    /// Human-readable error description
    pub message: String,
    /// Request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error was produced
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment verification failed")]
    SignatureMismatch,

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::ValidationError(rejection.body_text())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::SignatureMismatch => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::GatewayError(_)
            | Self::PersistenceError(_)
            | Self::NotificationError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error kind reported to callers alongside the status code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::SignatureMismatch => "signature_mismatch",
            Self::GatewayError(_) => "gateway_error",
            Self::PersistenceError(_) => "persistence_error",
            Self::NotificationError(_) => "notification_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Store, gateway and internal failures return generic messages so that
    /// connection strings and upstream error payloads never reach the caller.
    pub fn response_message(&self) -> String {
        match self {
            Self::ValidationError(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg) => msg.clone(),
            Self::SignatureMismatch => "Payment verification failed.".to_string(),
            Self::GatewayError(_) => "Could not initiate order.".to_string(),
            Self::PersistenceError(_) => "Enrollment storage is unavailable.".to_string(),
            Self::NotificationError(_) => "Could not send email".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
        }
    }

    pub(crate) fn to_response_body(&self) -> ErrorResponse {
        let status = self.status_code();
        ErrorResponse {
            success: false,
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            kind: self.kind().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rstest::rstest;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("Course not found".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.kind, "not_found");
        assert!(!payload.success);
    }

    #[rstest]
    #[case(ServiceError::ValidationError("x".into()), StatusCode::BAD_REQUEST, "validation_error")]
    #[case(ServiceError::SignatureMismatch, StatusCode::BAD_REQUEST, "signature_mismatch")]
    #[case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found")]
    #[case(ServiceError::Conflict("x".into()), StatusCode::CONFLICT, "conflict")]
    #[case(ServiceError::GatewayError("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "gateway_error")]
    #[case(ServiceError::PersistenceError("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "persistence_error")]
    #[case(ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "unauthorized")]
    #[case(ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN, "forbidden")]
    fn status_and_kind_mapping(
        #[case] error: ServiceError,
        #[case] status: StatusCode,
        #[case] kind: &str,
    ) {
        assert_eq!(error.status_code(), status);
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn response_message_hides_upstream_details() {
        assert_eq!(
            ServiceError::PersistenceError("connection refused: postgres://admin@db".into())
                .response_message(),
            "Enrollment storage is unavailable."
        );
        assert_eq!(
            ServiceError::GatewayError("401 BAD_REQUEST_ERROR key_id".into()).response_message(),
            "Could not initiate order."
        );
        assert_eq!(
            ServiceError::Conflict("Already enrolled in this course".into()).response_message(),
            "Already enrolled in this course"
        );
    }
}
