use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::prediction::{
    ActiveModel as PredictionActiveModel, Column, Entity as Prediction, Model as PredictionModel,
};
use crate::errors::ServiceError;
use crate::models::{ProductId, StoreId};
use crate::repositories::Repository;

use super::BaseRepository;

/// Fields assembled by the orchestrator for a new forecast. Identity and
/// creation time are assigned here, at persistence time.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub forecast_month: DateTime<Utc>,
    pub predicted_quantity: i64,
    pub confidence_score: f64,
    pub model_version: String,
    pub features_used: Vec<String>,
}

/// Repository for prediction storage operations
#[derive(Debug)]
pub struct PredictionRepository {
    base: BaseRepository,
}

impl PredictionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Persist a new prediction, assigning its id and creation timestamp.
    pub async fn create(&self, new: NewPrediction) -> Result<PredictionModel, ServiceError> {
        let features_used = serde_json::to_value(&new.features_used)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        let active = PredictionActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(new.store_id.as_str().to_string()),
            product_id: Set(new.product_id.as_str().to_string()),
            forecast_month: Set(new.forecast_month),
            predicted_quantity: Set(new.predicted_quantity),
            confidence_score: Set(new.confidence_score),
            model_version: Set(new.model_version),
            features_used: Set(features_used),
            actual_quantity: Set(None),
            accuracy: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let model = active.insert(self.base.get_db()).await?;
        Ok(model)
    }

    /// Find a prediction by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PredictionModel>, ServiceError> {
        let model = Prediction::find_by_id(id).one(self.base.get_db()).await?;
        Ok(model)
    }

    /// Predictions for a store, newest first
    pub async fn find_by_store(
        &self,
        store_id: &StoreId,
        limit: u64,
    ) -> Result<Vec<PredictionModel>, ServiceError> {
        let models = Prediction::find()
            .filter(Column::StoreId.eq(store_id.as_str()))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(self.base.get_db())
            .await?;
        Ok(models)
    }

    /// Predictions for a product, newest first
    pub async fn find_by_product(
        &self,
        product_id: &ProductId,
        limit: u64,
    ) -> Result<Vec<PredictionModel>, ServiceError> {
        let models = Prediction::find()
            .filter(Column::ProductId.eq(product_id.as_str()))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(self.base.get_db())
            .await?;
        Ok(models)
    }

    /// Predictions for a (store, product) pair, newest first
    pub async fn find_by_pair(
        &self,
        store_id: &StoreId,
        product_id: &ProductId,
        limit: u64,
    ) -> Result<Vec<PredictionModel>, ServiceError> {
        let models = Prediction::find()
            .filter(Column::StoreId.eq(store_id.as_str()))
            .filter(Column::ProductId.eq(product_id.as_str()))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(self.base.get_db())
            .await?;
        Ok(models)
    }

    /// Most recently created predictions across all pairs
    pub async fn recent(&self, limit: u64) -> Result<Vec<PredictionModel>, ServiceError> {
        let models = Prediction::find()
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(self.base.get_db())
            .await?;
        Ok(models)
    }

    /// Delete a prediction; returns false when it does not exist
    pub async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let Some(model) = self.find_by_id(id).await? else {
            return Ok(false);
        };
        model.delete(self.base.get_db()).await?;
        Ok(true)
    }

    /// Record realized demand for a prediction. Overwrites any previously
    /// recorded actual, which makes repeated calls idempotent.
    pub async fn record_actual(
        &self,
        id: Uuid,
        actual_quantity: i64,
        accuracy: f64,
    ) -> Result<Option<PredictionModel>, ServiceError> {
        let Some(model) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: PredictionActiveModel = model.into();
        active.actual_quantity = Set(Some(actual_quantity));
        active.accuracy = Set(Some(accuracy));
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(self.base.get_db()).await?;
        Ok(Some(updated))
    }

    /// All predictions matching the optional store filter
    pub async fn count(&self, store_id: Option<&StoreId>) -> Result<u64, ServiceError> {
        let mut query = Prediction::find();
        if let Some(store_id) = store_id {
            query = query.filter(Column::StoreId.eq(store_id.as_str()));
        }
        let count = query.count(self.base.get_db()).await?;
        Ok(count)
    }

    /// Reconciled predictions (actual recorded), newest first
    pub async fn reconciled(
        &self,
        store_id: Option<&StoreId>,
    ) -> Result<Vec<PredictionModel>, ServiceError> {
        let mut query = Prediction::find().filter(Column::ActualQuantity.is_not_null());
        if let Some(store_id) = store_id {
            query = query.filter(Column::StoreId.eq(store_id.as_str()));
        }
        let models = query
            .order_by_desc(Column::CreatedAt)
            .all(self.base.get_db())
            .await?;
        Ok(models)
    }

    /// Mean accuracy over the pair's most recent reconciled predictions;
    /// None when the pair has no reconciled history yet.
    pub async fn rolling_accuracy(
        &self,
        store_id: &StoreId,
        product_id: &ProductId,
        window: u64,
    ) -> Result<Option<f64>, ServiceError> {
        let models = Prediction::find()
            .filter(Column::StoreId.eq(store_id.as_str()))
            .filter(Column::ProductId.eq(product_id.as_str()))
            .filter(Column::ActualQuantity.is_not_null())
            .order_by_desc(Column::CreatedAt)
            .limit(window)
            .all(self.base.get_db())
            .await?;

        let accuracies: Vec<f64> = models.iter().filter_map(|m| m.accuracy).collect();
        if accuracies.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            accuracies.iter().sum::<f64>() / accuracies.len() as f64,
        ))
    }
}

impl Repository for PredictionRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
