use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Prediction with ID 550e8400-e29b-41d4-a716-446655440000 not found",
    "details": null,
    "timestamp": "2025-11-03T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Prediction with ID 550e8400-e29b-41d4-a716-446655440000 not found")]
    pub message: String,
    /// Additional error details (validation errors in dev mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    #[schema(example = "2025-11-03T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Sales data source error: {0}")]
    DataSourceError(String),

    #[error("Insufficient historical data: {0}")]
    InsufficientData(String),

    #[error("No trained model is loaded")]
    ModelNotLoaded,

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::NoData(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::DataSourceError(_) => StatusCode::BAD_GATEWAY,
            Self::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_)
            | Self::SchemaMismatch(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Storage error".to_string(),
            Self::SchemaMismatch(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => "Internal server error".to_string(),
            // User-facing errors carry the actual message
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::NoData("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::DataSourceError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::InsufficientData("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::ModelNotLoaded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::SchemaMismatch("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::SchemaMismatch("weights len 9, vector len 4".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::SerializationError("artifact json truncated".into()).response_message(),
            "Internal server error"
        );

        // User-facing errors include the actual message
        assert_eq!(
            ServiceError::NotFound("Prediction not found".into()).response_message(),
            "Not found: Prediction not found"
        );
        assert_eq!(
            ServiceError::InsufficientData("no historical sales data".into()).response_message(),
            "Insufficient historical data: no historical sales data"
        );
    }

    #[tokio::test]
    async fn error_body_matches_status() {
        let response = ServiceError::NotFound("missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.error, "Not Found");
        assert_eq!(payload.message, "Not found: missing");
    }
}
