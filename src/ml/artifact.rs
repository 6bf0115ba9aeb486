use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ServiceError;
use crate::ml::model::LinearEstimator;
use crate::models::{FeatureImportance, ModelMetrics};

/// File holding the version identifier of the active artifact.
const ACTIVE_POINTER: &str = "ACTIVE";

/// A trained, versioned model. Artifacts are immutable: retraining publishes
/// a new version, it never rewrites an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_schema: Vec<String>,
    pub training_samples: usize,
    pub metrics: ModelMetrics,
    pub estimator: LinearEstimator,
}

impl ModelArtifact {
    /// Runs inference, verifying the vector against the artifact's feature
    /// schema first. A length mismatch means the service is wired to an
    /// incompatible model version.
    pub fn predict(&self, vector: &[f64]) -> Result<(f64, f64), ServiceError> {
        if vector.len() != self.feature_schema.len()
            || self.estimator.feature_count() != self.feature_schema.len()
        {
            return Err(ServiceError::SchemaMismatch(format!(
                "artifact {} expects {} features, vector has {}",
                self.version,
                self.feature_schema.len(),
                vector.len()
            )));
        }
        Ok(self.estimator.predict(vector))
    }

    /// Feature importance ranking, most important first.
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mut entries: Vec<FeatureImportance> = self
            .feature_schema
            .iter()
            .zip(self.estimator.importance_scores())
            .map(|(name, score)| FeatureImportance {
                feature_name: name.clone(),
                importance_score: score,
                rank: 0,
            })
            .collect();
        entries.sort_by(|a, b| b.importance_score.total_cmp(&a.importance_score));
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        entries
    }
}

/// Derives the artifact version identifier from its training timestamp.
pub fn version_for(trained_at: DateTime<Utc>) -> String {
    format!("v{}", trained_at.format("%Y%m%d%H%M%S"))
}

/// File-backed artifact storage. One JSON file per version plus a pointer
/// file naming the active version; publishing writes the artifact fully
/// before swapping the pointer.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn artifact_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("model-{}.json", version))
    }

    fn io_err(context: &str, err: std::io::Error) -> ServiceError {
        ServiceError::InternalError(format!("artifact store: {}: {}", context, err))
    }

    /// Publishes a new artifact and makes it active.
    pub fn publish(&self, artifact: &ModelArtifact) -> Result<(), ServiceError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_err("create dir", e))?;

        let payload = serde_json::to_vec_pretty(artifact)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        fs::write(self.artifact_path(&artifact.version), payload)
            .map_err(|e| Self::io_err("write artifact", e))?;

        // Swap the pointer only once the artifact is fully on disk
        let pointer_tmp = self.dir.join(format!("{}.tmp", ACTIVE_POINTER));
        fs::write(&pointer_tmp, artifact.version.as_bytes())
            .map_err(|e| Self::io_err("write pointer", e))?;
        fs::rename(&pointer_tmp, self.dir.join(ACTIVE_POINTER))
            .map_err(|e| Self::io_err("swap pointer", e))?;

        info!(version = %artifact.version, "Published model artifact");
        Ok(())
    }

    /// Loads the active artifact, if any has been published.
    pub fn load_active(&self) -> Result<Option<ModelArtifact>, ServiceError> {
        let pointer = self.dir.join(ACTIVE_POINTER);
        let version = match fs::read_to_string(&pointer) {
            Ok(v) => v.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err("read pointer", e)),
        };

        let payload = fs::read(self.artifact_path(&version))
            .map_err(|e| Self::io_err("read artifact", e))?;
        let artifact: ModelArtifact = serde_json::from_slice(&payload)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        info!(version = %artifact.version, "Loaded active model artifact");
        Ok(Some(artifact))
    }
}

/// In-process binding of the active artifact.
///
/// Readers take an `Arc` snapshot and keep observing a complete, consistent
/// artifact even while a retrain replaces the binding wholesale.
pub struct ModelHandle {
    active: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ModelHandle {
    pub fn new(artifact: Option<ModelArtifact>) -> Self {
        Self {
            active: RwLock::new(artifact.map(Arc::new)),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn snapshot(&self) -> Option<Arc<ModelArtifact>> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Replaces the binding wholesale; in-flight readers keep their snapshot.
    pub fn replace(&self, artifact: ModelArtifact) {
        let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::new(artifact));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::FEATURE_SCHEMA;

    fn artifact(version: &str) -> ModelArtifact {
        ModelArtifact {
            version: version.to_string(),
            trained_at: Utc::now(),
            feature_schema: FEATURE_SCHEMA.iter().map(|s| s.to_string()).collect(),
            training_samples: 24,
            metrics: ModelMetrics {
                mae: 1.2,
                mape: 14.0,
                rmse: 1.8,
                r2_score: 0.9,
            },
            estimator: LinearEstimator {
                weights: vec![0.1; FEATURE_SCHEMA.len()],
                intercept: 10.0,
                feature_means: vec![0.0; FEATURE_SCHEMA.len()],
                feature_stds: vec![1.0; FEATURE_SCHEMA.len()],
                residual_std: 1.8,
            },
        }
    }

    #[test]
    fn publish_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        assert!(store.load_active().unwrap().is_none());

        let published = artifact("v20250101000000");
        store.publish(&published).unwrap();

        let loaded = store.load_active().unwrap().unwrap();
        assert_eq!(loaded.version, published.version);
        assert_eq!(loaded.estimator.weights, published.estimator.weights);
    }

    #[test]
    fn publishing_a_new_version_swaps_the_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.publish(&artifact("v1")).unwrap();
        store.publish(&artifact("v2")).unwrap();

        let loaded = store.load_active().unwrap().unwrap();
        assert_eq!(loaded.version, "v2");
        // The superseded artifact stays on disk untouched
        assert!(dir.path().join("model-v1.json").exists());
    }

    #[test]
    fn schema_mismatch_is_a_fatal_error() {
        let artifact = artifact("v1");
        let err = artifact.predict(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ServiceError::SchemaMismatch(_)));
    }

    #[test]
    fn handle_replace_swaps_snapshots() {
        let handle = ModelHandle::empty();
        assert!(!handle.is_loaded());

        handle.replace(artifact("v1"));
        let before = handle.snapshot().unwrap();

        handle.replace(artifact("v2"));
        let after = handle.snapshot().unwrap();

        // The older snapshot stays complete and untouched
        assert_eq!(before.version, "v1");
        assert_eq!(after.version, "v2");
    }

    #[test]
    fn importance_ranking_sums_to_one_and_is_sorted() {
        let mut artifact = artifact("v1");
        artifact.estimator.weights = vec![
            0.5, -2.0, 1.0, 0.0, 0.25, 0.1, 0.05, 0.3, 0.4, 0.2,
        ];
        let ranking = artifact.feature_importance();
        assert_eq!(ranking.len(), FEATURE_SCHEMA.len());
        assert_eq!(ranking[0].feature_name, "year"); // |-2.0| dominates
        assert_eq!(ranking[0].rank, 1);
        let total: f64 = ranking.iter().map(|f| f.importance_score).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
