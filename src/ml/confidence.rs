use serde::{Deserialize, Serialize};

/// Weights for confidence scoring (all tunable via configuration)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfidenceConfig {
    /// Scale applied to the model margin before it shrinks the base score
    pub margin_scale: f64,
    /// Multiplicative discount applied when the history window is sparse
    pub low_confidence_discount: f64,
    /// Blend weight given to the pair's rolling accuracy (0.0 to 1.0)
    pub accuracy_blend_weight: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            margin_scale: 1.0,
            low_confidence_discount: 0.6,
            accuracy_blend_weight: 0.3,
        }
    }
}

/// Derives a bounded confidence score from the model's uncertainty signal
/// and the pair's track record.
pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
}

impl ConfidenceEstimator {
    pub fn new() -> Self {
        Self {
            config: ConfidenceConfig::default(),
        }
    }

    pub fn with_config(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Scores a prediction in [0, 1]. Never fails.
    ///
    /// The base score decreases monotonically as the margin widens. A sparse
    /// history window discounts the score multiplicatively, and when the pair
    /// has at least one reconciled prediction its rolling accuracy is blended
    /// in so historically poor performers score lower even on tight margins.
    pub fn estimate(
        &self,
        raw_margin: f64,
        low_confidence: bool,
        recent_accuracy: Option<f64>,
    ) -> f64 {
        let base = 1.0 / (1.0 + self.config.margin_scale * raw_margin.max(0.0));

        let mut score = if low_confidence {
            base * self.config.low_confidence_discount
        } else {
            base
        };

        if let Some(accuracy) = recent_accuracy {
            let w = self.config.accuracy_blend_weight.clamp(0.0, 1.0);
            score = (1.0 - w) * score + w * accuracy.clamp(0.0, 1.0);
        }

        score.clamp(0.0, 1.0)
    }
}

impl Default for ConfidenceEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrower_margin_scores_higher() {
        let estimator = ConfidenceEstimator::new();
        let tight = estimator.estimate(0.1, false, None);
        let loose = estimator.estimate(2.0, false, None);
        assert!(tight > loose);
    }

    #[test]
    fn zero_margin_with_full_history_is_full_confidence() {
        let estimator = ConfidenceEstimator::new();
        assert_eq!(estimator.estimate(0.0, false, None), 1.0);
    }

    #[test]
    fn sparse_window_discounts_multiplicatively() {
        let estimator = ConfidenceEstimator::new();
        let full = estimator.estimate(0.5, false, None);
        let sparse = estimator.estimate(0.5, true, None);
        assert!((sparse - full * 0.6).abs() < 1e-12);
    }

    #[test]
    fn poor_track_record_drags_a_tight_margin_down() {
        let estimator = ConfidenceEstimator::new();
        let without_history = estimator.estimate(0.0, false, None);
        let with_poor_history = estimator.estimate(0.0, false, Some(0.1));
        assert!(with_poor_history < without_history);
    }

    #[test]
    fn output_is_always_clamped() {
        let estimator = ConfidenceEstimator::with_config(ConfidenceConfig {
            margin_scale: -5.0,
            low_confidence_discount: 4.0,
            accuracy_blend_weight: 2.0,
        });
        let score = estimator.estimate(-3.0, true, Some(7.0));
        assert!((0.0..=1.0).contains(&score));
    }
}
