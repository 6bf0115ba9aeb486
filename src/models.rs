use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::prediction;
use crate::errors::ServiceError;

const MAX_IDENTIFIER_LEN: usize = 64;

fn validate_identifier(kind: &str, raw: &str) -> Result<(), ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be empty",
            kind
        )));
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ServiceError::ValidationError(format!(
            "{} exceeds {} characters",
            kind, MAX_IDENTIFIER_LEN
        )));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ServiceError::ValidationError(format!(
            "{} must not contain whitespace or control characters",
            kind
        )));
    }
    Ok(())
}

/// Opaque, validated store identifier. Parsed once at the boundary instead of
/// threading free-form strings through every layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        validate_identifier("store_id", raw)?;
        Ok(Self(raw.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, validated product identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        validate_identifier("product_id", raw)?;
        Ok(Self(raw.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One historical sales observation, supplied by the upstream sales API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SalesRecord {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub date: DateTime<Utc>,
    pub quantity: i64,
    pub revenue: Decimal,
    pub discount: f64,
    pub is_festival: bool,
}

/// Inbound request to generate a forecast for one (store, product) pair.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ForecastRequest {
    /// Store identifier
    #[schema(example = "STORE001")]
    pub store_id: String,
    /// Product identifier
    #[schema(example = "PROD-42")]
    pub product_id: String,
    /// Month to forecast, as a first-of-month UTC timestamp
    pub forecast_month: DateTime<Utc>,
    /// Number of historical months to use (defaults to the configured window)
    #[validate(range(min = 1, max = 60))]
    pub historical_months: Option<u32>,
}

/// Inbound request recording the realized demand for a prediction.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RecordActualRequest {
    /// Realized unit demand for the forecast month
    #[validate(range(min = 0))]
    pub actual_quantity: i64,
}

/// A persisted forecast as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PredictionResponse {
    pub id: Uuid,
    pub store_id: String,
    pub product_id: String,
    pub forecast_month: DateTime<Utc>,
    pub predicted_quantity: i64,
    pub confidence_score: f64,
    pub model_version: String,
    pub features_used: Vec<String>,
    pub actual_quantity: Option<i64>,
    pub accuracy: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<prediction::Model> for PredictionResponse {
    fn from(model: prediction::Model) -> Self {
        let features_used = serde_json::from_value(model.features_used).unwrap_or_default();
        Self {
            id: model.id,
            store_id: model.store_id,
            product_id: model.product_id,
            forecast_month: model.forecast_month,
            predicted_quantity: model.predicted_quantity,
            confidence_score: model.confidence_score,
            model_version: model.model_version,
            features_used,
            actual_quantity: model.actual_quantity,
            accuracy: model.accuracy,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Aggregate accuracy statistics over reconciled predictions.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccuracyStats {
    /// All predictions matching the filter, reconciled or not
    pub total_predictions: u64,
    /// Reconciled predictions the remaining fields are computed over
    pub count: u64,
    pub mean_accuracy: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
    /// Mean absolute percentage error, percent, max(actual, 1) denominator
    pub mean_absolute_percentage_error: f64,
}

/// Model evaluation metrics captured at training time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelMetrics {
    pub mae: f64,
    pub mape: f64,
    pub rmse: f64,
    pub r2_score: f64,
}

/// One entry of the feature importance ranking.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeatureImportance {
    pub feature_name: String,
    pub importance_score: f64,
    pub rank: usize,
}

/// Introspection view of the active model artifact.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelInfoResponse {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub features_count: usize,
    pub training_samples: usize,
    pub metrics: ModelMetrics,
    pub feature_importance: Vec<FeatureImportance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_id_rejects_empty_and_whitespace() {
        assert!(StoreId::parse("").is_err());
        assert!(StoreId::parse("   ").is_err());
        assert!(StoreId::parse("STORE 1").is_err());
    }

    #[test]
    fn store_id_trims_and_keeps_value() {
        let id = StoreId::parse(" STORE001 ").unwrap();
        assert_eq!(id.as_str(), "STORE001");
    }

    #[test]
    fn product_id_rejects_overlong() {
        let long = "P".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(ProductId::parse(&long).is_err());
    }
}
