use std::sync::Arc;

use chrono::{DateTime, Datelike, Months, Timelike, Utc};
use sea_orm::DatabaseConnection;
use tracing::info;
use validator::Validate;

use crate::entities::prediction::Model as PredictionModel;
use crate::errors::ServiceError;
use crate::ml::artifact::ModelHandle;
use crate::ml::confidence::ConfidenceEstimator;
use crate::ml::features::FeatureBuilder;
use crate::models::{ForecastRequest, ProductId, StoreId};
use crate::repositories::prediction_repository::{NewPrediction, PredictionRepository};
use crate::services::history::HistoryProvider;

fn ensure_first_of_month(target: DateTime<Utc>) -> Result<(), ServiceError> {
    let midnight = target.hour() == 0 && target.minute() == 0 && target.second() == 0;
    if target.day() != 1 || !midnight || target.timestamp_subsec_nanos() != 0 {
        return Err(ServiceError::ValidationError(
            "forecast_month must be a first-of-month timestamp at midnight UTC".to_string(),
        ));
    }
    Ok(())
}

/// Orchestrates one forecast: history retrieval, feature engineering,
/// inference, confidence scoring, and the single persistence attempt.
pub struct ForecastService {
    repository: PredictionRepository,
    history: Arc<dyn HistoryProvider>,
    model: Arc<ModelHandle>,
    confidence: ConfidenceEstimator,
    default_historical_months: u32,
    rolling_accuracy_window: u64,
}

impl ForecastService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        history: Arc<dyn HistoryProvider>,
        model: Arc<ModelHandle>,
        confidence: ConfidenceEstimator,
        default_historical_months: u32,
        rolling_accuracy_window: u64,
    ) -> Self {
        Self {
            repository: PredictionRepository::new(db),
            history,
            model,
            confidence,
            default_historical_months,
            rolling_accuracy_window,
        }
    }

    /// Generates and persists a forecast for one (store, product) pair.
    ///
    /// Persistence is attempted exactly once, after every computation has
    /// succeeded; on any error nothing is stored. Component errors propagate
    /// unchanged and nothing here retries.
    pub async fn forecast(
        &self,
        request: ForecastRequest,
    ) -> Result<PredictionModel, ServiceError> {
        request.validate()?;
        let store_id = StoreId::parse(&request.store_id)?;
        let product_id = ProductId::parse(&request.product_id)?;
        let target_month = request.forecast_month;
        ensure_first_of_month(target_month)?;

        let months = request
            .historical_months
            .unwrap_or(self.default_historical_months);
        let start = target_month
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| {
                ServiceError::ValidationError("forecast_month is out of range".to_string())
            })?;

        info!(
            store_id = %store_id,
            product_id = %product_id,
            target = %target_month.format("%Y-%m"),
            months,
            "Generating forecast"
        );

        let records = self
            .history
            .fetch(&store_id, &product_id, start, target_month)
            .await?;
        if records.is_empty() {
            return Err(ServiceError::InsufficientData(format!(
                "no historical sales data for {}/{}",
                store_id, product_id
            )));
        }

        let features = FeatureBuilder::build(&records, target_month)?;

        let artifact = self.model.snapshot().ok_or(ServiceError::ModelNotLoaded)?;
        let (raw, margin) = artifact.predict(&features.vector)?;

        // Clamp and round at this boundary only; the model's raw output
        // stays a real number for evaluation purposes
        let predicted_quantity = raw.max(0.0).round() as i64;

        let rolling_accuracy = self
            .repository
            .rolling_accuracy(&store_id, &product_id, self.rolling_accuracy_window)
            .await?;
        let confidence_score =
            self.confidence
                .estimate(margin, features.low_confidence, rolling_accuracy);

        let stored = self
            .repository
            .create(NewPrediction {
                store_id: store_id.clone(),
                product_id: product_id.clone(),
                forecast_month: target_month,
                predicted_quantity,
                confidence_score,
                model_version: artifact.version.clone(),
                features_used: artifact.feature_schema.clone(),
            })
            .await?;

        info!(
            prediction_id = %stored.id,
            predicted_quantity,
            confidence_score,
            "Forecast persisted"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_of_month_midnight_is_accepted() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert!(ensure_first_of_month(ts).is_ok());
    }

    #[test]
    fn mid_month_or_intraday_timestamps_are_rejected() {
        let mid_month = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        assert!(ensure_first_of_month(mid_month).is_err());

        let intraday = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        assert!(ensure_first_of_month(intraday).is_err());
    }
}
