pub mod health;
pub mod model;
pub mod predictions;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::ml::artifact::ModelHandle;
use crate::ml::confidence::ConfidenceEstimator;
use crate::repositories::prediction_repository::PredictionRepository;
use crate::services::history::HistoryProvider;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub forecasting: Arc<crate::services::forecasting::ForecastService>,
    pub accuracy: Arc<crate::services::accuracy::AccuracyService>,
    pub predictions: Arc<PredictionRepository>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        history: Arc<dyn HistoryProvider>,
        model: Arc<ModelHandle>,
        config: &AppConfig,
    ) -> Self {
        let forecasting = Arc::new(crate::services::forecasting::ForecastService::new(
            db_pool.clone(),
            history,
            model,
            ConfidenceEstimator::with_config(config.confidence.clone()),
            config.default_historical_months,
            config.rolling_accuracy_window,
        ));
        let accuracy = Arc::new(crate::services::accuracy::AccuracyService::new(
            db_pool.clone(),
        ));
        let predictions = Arc::new(PredictionRepository::new(db_pool));

        Self {
            forecasting,
            accuracy,
            predictions,
        }
    }
}
