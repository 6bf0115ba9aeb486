use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Replenish API",
        version = "0.2.0",
        description = r#"
# Replenish Demand Forecasting API

Forecasts next-month unit demand for (store, product) pairs from historical
sales, persists each forecast, and reconciles forecasts against realized
demand to track accuracy over time.

## Error Handling

The API uses consistent error response formats with appropriate HTTP status
codes:

```json
{
  "error": "Not Found",
  "message": "Prediction not found",
  "timestamp": "2025-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Forecasts", description = "Forecast generation"),
        (name = "Predictions", description = "Persisted prediction management"),
        (name = "Stats", description = "Accuracy statistics"),
        (name = "Model", description = "Model artifact introspection"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::predictions::generate_forecast,
        crate::handlers::predictions::get_prediction,
        crate::handlers::predictions::record_actual,
        crate::handlers::predictions::delete_prediction,
        crate::handlers::predictions::recent_predictions,
        crate::handlers::predictions::predictions_by_store,
        crate::handlers::predictions::predictions_by_product,
        crate::handlers::predictions::predictions_by_pair,
        crate::handlers::predictions::accuracy_stats,
        crate::handlers::model::model_info,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::models::ForecastRequest,
            crate::models::RecordActualRequest,
            crate::models::PredictionResponse,
            crate::models::AccuracyStats,
            crate::models::ModelMetrics,
            crate::models::FeatureImportance,
            crate::models::ModelInfoResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Replenish API"));
        assert!(json.contains("/api/v1/forecasts"));
        assert!(json.contains("/api/v1/predictions/recent"));
    }
}
