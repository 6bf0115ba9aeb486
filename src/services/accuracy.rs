use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::info;
use uuid::Uuid;

use crate::entities::prediction::Model as PredictionModel;
use crate::errors::ServiceError;
use crate::models::{AccuracyStats, StoreId};
use crate::repositories::prediction_repository::PredictionRepository;

/// Accuracy of one reconciled prediction. The `max(actual, 1)` denominator
/// keeps zero-demand periods defined, and the clamp floors arbitrarily bad
/// forecasts at 0 instead of letting them go negative.
pub fn accuracy_score(predicted: i64, actual: i64) -> f64 {
    let denominator = actual.max(1) as f64;
    let raw = 1.0 - (predicted - actual).abs() as f64 / denominator;
    raw.clamp(0.0, 1.0)
}

/// Reconciles forecasts with realized demand and aggregates accuracy.
pub struct AccuracyService {
    repository: PredictionRepository,
}

impl AccuracyService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repository: PredictionRepository::new(db),
        }
    }

    /// Records the realized demand for a prediction and computes its
    /// accuracy. This is the only mutation a stored prediction ever
    /// receives; repeated calls with the same quantity are idempotent.
    ///
    /// Malformed or unknown identifiers surface as `NotFound`.
    pub async fn record_actual(
        &self,
        prediction_id: &str,
        actual_quantity: i64,
    ) -> Result<PredictionModel, ServiceError> {
        let id = Uuid::parse_str(prediction_id).map_err(|_| {
            ServiceError::NotFound(format!("prediction {} not found", prediction_id))
        })?;

        let current = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("prediction {} not found", id)))?;

        let accuracy = accuracy_score(current.predicted_quantity, actual_quantity);

        let updated = self
            .repository
            .record_actual(id, actual_quantity, accuracy)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("prediction {} not found", id)))?;

        info!(
            prediction_id = %id,
            actual_quantity,
            accuracy,
            "Recorded actual demand"
        );
        Ok(updated)
    }

    /// Aggregate accuracy statistics over reconciled predictions, optionally
    /// filtered by store. Fails with `NoData` before any arithmetic when
    /// nothing matches.
    pub async fn stats(
        &self,
        store_id: Option<StoreId>,
    ) -> Result<AccuracyStats, ServiceError> {
        let reconciled = self.repository.reconciled(store_id.as_ref()).await?;
        if reconciled.is_empty() {
            return Err(ServiceError::NoData(
                "no reconciled predictions match the filter".to_string(),
            ));
        }

        let total_predictions = self.repository.count(store_id.as_ref()).await?;

        let mut accuracies = Vec::with_capacity(reconciled.len());
        let mut percentage_errors = Vec::with_capacity(reconciled.len());
        for prediction in &reconciled {
            let Some(actual) = prediction.actual_quantity else {
                continue;
            };
            let accuracy = prediction
                .accuracy
                .unwrap_or_else(|| accuracy_score(prediction.predicted_quantity, actual));
            accuracies.push(accuracy);

            let denominator = actual.max(1) as f64;
            percentage_errors
                .push((prediction.predicted_quantity - actual).abs() as f64 / denominator);
        }

        let count = accuracies.len() as u64;
        let mean_accuracy = accuracies.iter().sum::<f64>() / accuracies.len() as f64;
        let min_accuracy = accuracies.iter().copied().fold(f64::INFINITY, f64::min);
        let max_accuracy = accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_absolute_percentage_error =
            percentage_errors.iter().sum::<f64>() / percentage_errors.len() as f64 * 100.0;

        Ok(AccuracyStats {
            total_predictions,
            count,
            mean_accuracy,
            min_accuracy,
            max_accuracy,
            mean_absolute_percentage_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_forecast_scores_one() {
        assert_eq!(accuracy_score(10, 10), 1.0);
    }

    #[test]
    fn zero_actual_with_zero_prediction_scores_one() {
        // denominator is max(0, 1) = 1 and the error is 0
        assert_eq!(accuracy_score(0, 0), 1.0);
    }

    #[test]
    fn far_off_forecast_floors_at_zero() {
        // raw formula: 1 - 5/1 = -4, clamped to 0
        assert_eq!(accuracy_score(5, 0), 0.0);
    }

    #[test]
    fn moderate_error_lands_between() {
        let score = accuracy_score(8, 10);
        assert!((score - 0.8).abs() < 1e-12);
    }
}
