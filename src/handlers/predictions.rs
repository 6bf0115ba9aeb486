use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{
        AccuracyStats, ForecastRequest, PredictionResponse, ProductId, RecordActualRequest,
        StoreId,
    },
    ApiResponse, AppState,
};

const DEFAULT_LIST_LIMIT: u64 = 100;
const DEFAULT_RECENT_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 1000;

/// Build the forecasting Router scoped under `/api/v1`.
///
/// The literal `/predictions/recent` segment coexists with the
/// parameterized `/predictions/{id}` routes; the router resolves the
/// static segment first, so "recent" is never captured as an id.
pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/forecasts", post(generate_forecast))
        .route("/predictions/recent", get(recent_predictions))
        .route(
            "/predictions/{id}",
            get(get_prediction)
                .put(record_actual)
                .delete(delete_prediction),
        )
        .route("/predictions/store/{store_id}", get(predictions_by_store))
        .route(
            "/predictions/product/{product_id}",
            get(predictions_by_product),
        )
        .route(
            "/predictions/store/{store_id}/product/{product_id}",
            get(predictions_by_pair),
        )
        .route("/stats/accuracy", get(accuracy_stats))
}

/// Query parameters for listing endpoints
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListLimitQuery {
    /// Maximum number of predictions to return (1-1000)
    pub limit: Option<u64>,
}

/// Query parameters for accuracy statistics
#[derive(Debug, Deserialize, IntoParams)]
pub struct AccuracyStatsQuery {
    /// Optional store filter
    pub store_id: Option<String>,
}

fn resolve_limit(limit: Option<u64>, default: u64) -> Result<u64, ServiceError> {
    let limit = limit.unwrap_or(default);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(ServiceError::ValidationError(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    Ok(limit)
}

fn parse_prediction_id(raw: &str) -> Result<Uuid, ServiceError> {
    // A malformed id is simply an id that matches nothing
    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::NotFound(format!("prediction {} not found", raw)))
}

/// Generate a forecast for a (store, product) pair and persist it
#[utoipa::path(
    post,
    path = "/api/v1/forecasts",
    request_body = ForecastRequest,
    responses(
        (status = 200, description = "Forecast generated and persisted", body = ApiResponse<PredictionResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough historical data", body = crate::errors::ErrorResponse),
        (status = 502, description = "Sales data source failure", body = crate::errors::ErrorResponse),
        (status = 503, description = "No trained model loaded", body = crate::errors::ErrorResponse)
    ),
    tag = "Forecasts"
)]
pub async fn generate_forecast(
    State(state): State<AppState>,
    Json(request): Json<ForecastRequest>,
) -> Result<Json<ApiResponse<PredictionResponse>>, ServiceError> {
    let prediction = state.services.forecasting.forecast(request).await?;
    Ok(Json(ApiResponse::success(prediction.into())))
}

/// Get a prediction by ID
#[utoipa::path(
    get,
    path = "/api/v1/predictions/{id}",
    params(("id" = String, Path, description = "Prediction identifier")),
    responses(
        (status = 200, description = "Prediction retrieved", body = ApiResponse<PredictionResponse>),
        (status = 404, description = "Prediction not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Predictions"
)]
pub async fn get_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PredictionResponse>>, ServiceError> {
    let id = parse_prediction_id(&id)?;
    let prediction = state
        .services
        .predictions
        .find_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("prediction {} not found", id)))?;
    Ok(Json(ApiResponse::success(prediction.into())))
}

/// Record the realized demand for a prediction
#[utoipa::path(
    put,
    path = "/api/v1/predictions/{id}",
    params(("id" = String, Path, description = "Prediction identifier")),
    request_body = RecordActualRequest,
    responses(
        (status = 200, description = "Actual recorded and accuracy computed", body = ApiResponse<PredictionResponse>),
        (status = 404, description = "Prediction not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Predictions"
)]
pub async fn record_actual(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RecordActualRequest>,
) -> Result<Json<ApiResponse<PredictionResponse>>, ServiceError> {
    request.validate()?;
    let updated = state
        .services
        .accuracy
        .record_actual(&id, request.actual_quantity)
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

/// Delete a prediction by ID
#[utoipa::path(
    delete,
    path = "/api/v1/predictions/{id}",
    params(("id" = String, Path, description = "Prediction identifier")),
    responses(
        (status = 200, description = "Prediction deleted", body = ApiResponse<Value>),
        (status = 404, description = "Prediction not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Predictions"
)]
pub async fn delete_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    let id = parse_prediction_id(&id)?;
    let deleted = state.services.predictions.delete(id).await?;
    if !deleted {
        return Err(ServiceError::NotFound(format!(
            "prediction {} not found",
            id
        )));
    }
    Ok(Json(ApiResponse::success(
        json!({"message": "Prediction deleted successfully"}),
    )))
}

/// List the most recently created predictions
#[utoipa::path(
    get,
    path = "/api/v1/predictions/recent",
    params(ListLimitQuery),
    responses(
        (status = 200, description = "Recent predictions retrieved", body = ApiResponse<Vec<PredictionResponse>>)
    ),
    tag = "Predictions"
)]
pub async fn recent_predictions(
    State(state): State<AppState>,
    Query(params): Query<ListLimitQuery>,
) -> Result<Json<ApiResponse<Vec<PredictionResponse>>>, ServiceError> {
    let limit = resolve_limit(params.limit, DEFAULT_RECENT_LIMIT)?;
    let predictions = state.services.predictions.recent(limit).await?;
    Ok(Json(ApiResponse::success(
        predictions.into_iter().map(Into::into).collect(),
    )))
}

/// List predictions for a store
#[utoipa::path(
    get,
    path = "/api/v1/predictions/store/{store_id}",
    params(("store_id" = String, Path, description = "Store identifier"), ListLimitQuery),
    responses(
        (status = 200, description = "Predictions retrieved", body = ApiResponse<Vec<PredictionResponse>>)
    ),
    tag = "Predictions"
)]
pub async fn predictions_by_store(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(params): Query<ListLimitQuery>,
) -> Result<Json<ApiResponse<Vec<PredictionResponse>>>, ServiceError> {
    let store_id = StoreId::parse(&store_id)?;
    let limit = resolve_limit(params.limit, DEFAULT_LIST_LIMIT)?;
    let predictions = state
        .services
        .predictions
        .find_by_store(&store_id, limit)
        .await?;
    Ok(Json(ApiResponse::success(
        predictions.into_iter().map(Into::into).collect(),
    )))
}

/// List predictions for a product
#[utoipa::path(
    get,
    path = "/api/v1/predictions/product/{product_id}",
    params(("product_id" = String, Path, description = "Product identifier"), ListLimitQuery),
    responses(
        (status = 200, description = "Predictions retrieved", body = ApiResponse<Vec<PredictionResponse>>)
    ),
    tag = "Predictions"
)]
pub async fn predictions_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(params): Query<ListLimitQuery>,
) -> Result<Json<ApiResponse<Vec<PredictionResponse>>>, ServiceError> {
    let product_id = ProductId::parse(&product_id)?;
    let limit = resolve_limit(params.limit, DEFAULT_LIST_LIMIT)?;
    let predictions = state
        .services
        .predictions
        .find_by_product(&product_id, limit)
        .await?;
    Ok(Json(ApiResponse::success(
        predictions.into_iter().map(Into::into).collect(),
    )))
}

/// List predictions for a (store, product) pair
#[utoipa::path(
    get,
    path = "/api/v1/predictions/store/{store_id}/product/{product_id}",
    params(
        ("store_id" = String, Path, description = "Store identifier"),
        ("product_id" = String, Path, description = "Product identifier"),
        ListLimitQuery
    ),
    responses(
        (status = 200, description = "Predictions retrieved", body = ApiResponse<Vec<PredictionResponse>>)
    ),
    tag = "Predictions"
)]
pub async fn predictions_by_pair(
    State(state): State<AppState>,
    Path((store_id, product_id)): Path<(String, String)>,
    Query(params): Query<ListLimitQuery>,
) -> Result<Json<ApiResponse<Vec<PredictionResponse>>>, ServiceError> {
    let store_id = StoreId::parse(&store_id)?;
    let product_id = ProductId::parse(&product_id)?;
    let limit = resolve_limit(params.limit, DEFAULT_LIST_LIMIT)?;
    let predictions = state
        .services
        .predictions
        .find_by_pair(&store_id, &product_id, limit)
        .await?;
    Ok(Json(ApiResponse::success(
        predictions.into_iter().map(Into::into).collect(),
    )))
}

/// Accuracy statistics over reconciled predictions
#[utoipa::path(
    get,
    path = "/api/v1/stats/accuracy",
    params(AccuracyStatsQuery),
    responses(
        (status = 200, description = "Accuracy statistics computed", body = ApiResponse<AccuracyStats>),
        (status = 404, description = "No reconciled predictions match", body = crate::errors::ErrorResponse)
    ),
    tag = "Stats"
)]
pub async fn accuracy_stats(
    State(state): State<AppState>,
    Query(params): Query<AccuracyStatsQuery>,
) -> Result<Json<ApiResponse<AccuracyStats>>, ServiceError> {
    let store_id = params
        .store_id
        .as_deref()
        .map(StoreId::parse)
        .transpose()?;
    let stats = state.services.accuracy.stats(store_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_bounds() {
        assert_eq!(resolve_limit(None, DEFAULT_LIST_LIMIT).unwrap(), 100);
        assert_eq!(resolve_limit(Some(5), DEFAULT_LIST_LIMIT).unwrap(), 5);
        assert!(resolve_limit(Some(0), DEFAULT_LIST_LIMIT).is_err());
        assert!(resolve_limit(Some(1001), DEFAULT_LIST_LIMIT).is_err());
    }

    #[test]
    fn malformed_prediction_id_is_not_found() {
        let err = parse_prediction_id("not-a-uuid").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
