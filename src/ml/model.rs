use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::ml::features::FeatureVector;
use crate::models::ModelMetrics;

/// Training configuration for the demand model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of rows held out for validation (0.0 to 1.0)
    pub validation_split: f64,
    /// RNG seed for the train/validation shuffle; training is fully
    /// deterministic for a fixed seed
    pub seed: u64,
    /// L2 regularization strength
    pub l2_penalty: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_split: 0.2,
            seed: 42,
            l2_penalty: 1.0,
        }
    }
}

/// Fitted regression estimator: standardized ridge regression.
///
/// The raw output stays a real number; clamping to zero and rounding to
/// whole units happen at the orchestrator boundary, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearEstimator {
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    /// Validation residual spread, the model-internal uncertainty signal
    pub residual_std: f64,
}

impl LinearEstimator {
    pub fn feature_count(&self) -> usize {
        self.weights.len()
    }

    fn standardize(&self, vector: &[f64]) -> Vec<f64> {
        vector
            .iter()
            .zip(self.feature_means.iter().zip(self.feature_stds.iter()))
            .map(|(x, (mean, std))| (x - mean) / std)
            .collect()
    }

    /// Predicts demand for one feature vector.
    ///
    /// Returns the raw real-valued prediction and a margin: the validation
    /// residual spread relative to the predicted magnitude. Narrower margin
    /// means a tighter estimate.
    pub fn predict(&self, vector: &[f64]) -> (f64, f64) {
        let z = self.standardize(vector);
        let raw: f64 = self
            .weights
            .iter()
            .zip(z.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;

        let margin = self.residual_std / (raw.abs() + 1.0);
        (raw, margin)
    }

    /// Normalized |weight| ranking; standardized inputs make the magnitudes
    /// comparable across features.
    pub fn importance_scores(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().map(|w| w.abs()).sum();
        if total == 0.0 {
            return vec![0.0; self.weights.len()];
        }
        self.weights.iter().map(|w| w.abs() / total).collect()
    }
}

/// Everything produced by one training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub estimator: LinearEstimator,
    pub metrics: ModelMetrics,
    pub training_samples: usize,
}

/// Demand regression model: training entry point and hyperparameters.
pub struct DemandModel {
    config: TrainingConfig,
}

impl DemandModel {
    pub fn new() -> Self {
        Self {
            config: TrainingConfig::default(),
        }
    }

    pub fn with_config(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Trains the estimator on a labeled feature matrix.
    ///
    /// The train/validation split is shuffled with the configured seed, so
    /// repeated runs over the same data produce identical estimators and
    /// metrics. Evaluation falls back to the training rows when the matrix
    /// is too small to hold anything out.
    pub fn train(
        &self,
        rows: &[FeatureVector],
        labels: &[f64],
    ) -> Result<TrainingOutcome, ServiceError> {
        if rows.is_empty() {
            return Err(ServiceError::InsufficientData(
                "training set is empty".to_string(),
            ));
        }
        if rows.len() != labels.len() {
            return Err(ServiceError::ValidationError(format!(
                "feature matrix has {} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let width = rows[0].len();
        if width == 0 || rows.iter().any(|r| r.len() != width) {
            return Err(ServiceError::ValidationError(
                "feature matrix rows have inconsistent width".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.config.validation_split) {
            return Err(ServiceError::ValidationError(
                "validation_split must be in [0, 1)".to_string(),
            ));
        }

        let mut indices: Vec<usize> = (0..rows.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);

        let mut holdout = (rows.len() as f64 * self.config.validation_split).floor() as usize;
        if rows.len() - holdout < width + 1 {
            // Not enough rows to both fit and hold out; evaluate on the fit set
            holdout = 0;
        }
        let (val_idx, train_idx) = indices.split_at(holdout);

        let train_rows: Vec<&FeatureVector> = train_idx.iter().map(|&i| &rows[i]).collect();
        let train_labels: Vec<f64> = train_idx.iter().map(|&i| labels[i]).collect();

        let (means, stds) = column_moments(&train_rows, width);
        let estimator = fit_ridge(
            &train_rows,
            &train_labels,
            &means,
            &stds,
            self.config.l2_penalty,
        )?;

        let (eval_rows, eval_labels): (Vec<&FeatureVector>, Vec<f64>) = if holdout > 0 {
            (
                val_idx.iter().map(|&i| &rows[i]).collect(),
                val_idx.iter().map(|&i| labels[i]).collect(),
            )
        } else {
            (train_rows.clone(), train_labels.clone())
        };

        let predictions: Vec<f64> = eval_rows.iter().map(|r| estimator.predict(r).0).collect();
        let metrics = evaluate(&predictions, &eval_labels);

        let residual_std = metrics.rmse;
        let estimator = LinearEstimator {
            residual_std,
            ..estimator
        };

        Ok(TrainingOutcome {
            estimator,
            metrics,
            training_samples: train_idx.len(),
        })
    }
}

impl Default for DemandModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-column mean and standard deviation; zero-variance columns fall back
/// to a unit scale so standardization never divides by zero.
fn column_moments(rows: &[&FeatureVector], width: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let mut means = vec![0.0; width];
    for row in rows {
        for (m, x) in means.iter_mut().zip(row.iter()) {
            *m += x;
        }
    }
    for m in &mut means {
        *m /= n;
    }

    let mut stds = vec![0.0; width];
    for row in rows {
        for ((s, x), m) in stds.iter_mut().zip(row.iter()).zip(means.iter()) {
            *s += (x - m).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt();
        if *s < 1e-12 {
            *s = 1.0;
        }
    }

    (means, stds)
}

/// Fits ridge regression on standardized features via the normal equations.
/// The intercept column is not penalized.
fn fit_ridge(
    rows: &[&FeatureVector],
    labels: &[f64],
    means: &[f64],
    stds: &[f64],
    l2_penalty: f64,
) -> Result<LinearEstimator, ServiceError> {
    let width = means.len();
    let dim = width + 1; // bias column appended last

    let standardized: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            let mut z: Vec<f64> = row
                .iter()
                .zip(means.iter().zip(stds.iter()))
                .map(|(x, (m, s))| (x - m) / s)
                .collect();
            z.push(1.0);
            z
        })
        .collect();

    let mut normal = vec![vec![0.0; dim]; dim];
    let mut rhs = vec![0.0; dim];
    for (z, &y) in standardized.iter().zip(labels.iter()) {
        for i in 0..dim {
            for j in 0..dim {
                normal[i][j] += z[i] * z[j];
            }
            rhs[i] += z[i] * y;
        }
    }
    for (i, row) in normal.iter_mut().enumerate().take(width) {
        row[i] += l2_penalty;
    }

    let solution = solve_linear_system(normal, rhs)?;
    let (weights, intercept) = solution.split_at(width);

    Ok(LinearEstimator {
        weights: weights.to_vec(),
        intercept: intercept[0],
        feature_means: means.to_vec(),
        feature_stds: stds.to_vec(),
        residual_std: 0.0,
    })
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(
    mut a: Vec<Vec<f64>>,
    mut b: Vec<f64>,
) -> Result<Vec<f64>, ServiceError> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .expect("non-empty range");
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(ServiceError::InternalError(
                "normal equations are singular".to_string(),
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for col in (row + 1)..n {
            acc -= a[row][col] * x[col];
        }
        x[row] = acc / a[row][row];
    }
    Ok(x)
}

/// Evaluation metrics over a prediction/actual pairing. The MAPE denominator
/// is `max(actual, 1)` so zero-demand periods never divide by zero.
fn evaluate(predictions: &[f64], actuals: &[f64]) -> ModelMetrics {
    let n = predictions.len() as f64;

    let mae = predictions
        .iter()
        .zip(actuals.iter())
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / n;

    let mse = predictions
        .iter()
        .zip(actuals.iter())
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    let mape = predictions
        .iter()
        .zip(actuals.iter())
        .map(|(p, a)| (a - p).abs() / a.max(1.0))
        .sum::<f64>()
        / n
        * 100.0;

    let mean_actual = actuals.iter().sum::<f64>() / n;
    let ss_tot: f64 = actuals.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(actuals.iter())
        .map(|(p, a)| (a - p).powi(2))
        .sum();
    let r2_score = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };

    ModelMetrics {
        mae,
        mape,
        rmse,
        r2_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 3*x + 2 with a second, constant feature
    fn linear_data(n: usize) -> (Vec<FeatureVector>, Vec<f64>) {
        let rows: Vec<FeatureVector> = (0..n).map(|i| vec![i as f64, 1.0]).collect();
        let labels: Vec<f64> = (0..n).map(|i| 3.0 * i as f64 + 2.0).collect();
        (rows, labels)
    }

    #[test]
    fn training_is_deterministic_for_a_fixed_seed() {
        let (rows, labels) = linear_data(40);
        let model = DemandModel::new();

        let first = model.train(&rows, &labels).unwrap();
        let second = model.train(&rows, &labels).unwrap();

        assert_eq!(first.estimator.weights, second.estimator.weights);
        assert_eq!(first.estimator.intercept, second.estimator.intercept);
        assert_eq!(first.metrics.mae, second.metrics.mae);
    }

    #[test]
    fn recovers_a_linear_relationship() {
        let (rows, labels) = linear_data(50);
        let model = DemandModel::with_config(TrainingConfig {
            l2_penalty: 1e-6,
            ..TrainingConfig::default()
        });

        let outcome = model.train(&rows, &labels).unwrap();
        let (raw, margin) = outcome.estimator.predict(&[10.0, 1.0]);
        assert!((raw - 32.0).abs() < 0.5, "raw = {}", raw);
        assert!(raw.is_finite());
        assert!(margin >= 0.0);
        assert!(outcome.metrics.mae < 1.0);
    }

    #[test]
    fn empty_matrix_is_insufficient_data() {
        let model = DemandModel::new();
        let err = model.train(&[], &[]).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientData(_)));
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let model = DemandModel::new();
        let err = model.train(&[vec![1.0]], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn tiny_matrix_still_trains() {
        // Too small to hold anything out; evaluation happens on the fit set
        let rows = vec![vec![1.0, 0.0], vec![2.0, 1.0], vec![3.0, 0.0]];
        let labels = vec![2.0, 4.0, 6.0];
        let outcome = DemandModel::new().train(&rows, &labels).unwrap();
        assert_eq!(outcome.training_samples, 3);
        assert!(outcome.metrics.rmse.is_finite());
    }

    #[test]
    fn mape_guards_zero_actuals() {
        let metrics = evaluate(&[5.0, 0.0], &[0.0, 0.0]);
        assert!(metrics.mape.is_finite());
        // |0 - 5| / max(0, 1) = 5, |0 - 0| / 1 = 0 -> mean 2.5 -> 250%
        assert!((metrics.mape - 250.0).abs() < 1e-9);
    }

    #[test]
    fn margin_widens_with_residual_spread() {
        let tight = LinearEstimator {
            weights: vec![1.0],
            intercept: 0.0,
            feature_means: vec![0.0],
            feature_stds: vec![1.0],
            residual_std: 0.5,
        };
        let loose = LinearEstimator {
            residual_std: 5.0,
            ..tight.clone()
        };
        let (_, tight_margin) = tight.predict(&[4.0]);
        let (_, loose_margin) = loose.predict(&[4.0]);
        assert!(loose_margin > tight_margin);
    }
}
