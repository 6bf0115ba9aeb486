use axum::{extract::State, response::Json, routing::get, Router};

use crate::{
    errors::ServiceError,
    models::ModelInfoResponse,
    ApiResponse, AppState,
};

/// Build the model introspection Router scoped under `/api/v1/model`.
pub fn model_routes() -> Router<AppState> {
    Router::new().route("/info", get(model_info))
}

/// Introspect the active model artifact
#[utoipa::path(
    get,
    path = "/api/v1/model/info",
    responses(
        (status = 200, description = "Active model information", body = ApiResponse<ModelInfoResponse>),
        (status = 404, description = "No active model artifact", body = crate::errors::ErrorResponse)
    ),
    tag = "Model"
)]
pub async fn model_info(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ModelInfoResponse>>, ServiceError> {
    let artifact = state
        .model
        .snapshot()
        .ok_or_else(|| ServiceError::NotFound("no model information available".to_string()))?;

    let info = ModelInfoResponse {
        model_version: artifact.version.clone(),
        trained_at: artifact.trained_at,
        features_count: artifact.feature_schema.len(),
        training_samples: artifact.training_samples,
        metrics: artifact.metrics.clone(),
        feature_importance: artifact.feature_importance(),
    };
    Ok(Json(ApiResponse::success(info)))
}
