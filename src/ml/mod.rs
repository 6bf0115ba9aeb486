/*!
 * # Machine Learning Module
 *
 * This module provides the demand forecasting pipeline for the Replenish API:
 * deterministic feature engineering from raw sales history, a trained
 * regression estimator, the versioned artifact store that binds exactly one
 * model for inference at a time, and confidence scoring for predictions.
 */

/// Feature engineering from historical sales records
pub mod features;

/// Trained demand regression model (training and inference)
pub mod model;

/// Versioned, immutable model artifacts and the active-model binding
pub mod artifact;

/// Confidence scoring for predictions
pub mod confidence;
