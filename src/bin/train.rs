//! Offline training job for the demand model.
//!
//! Fetches historical sales for the given (store, product) pairs through the
//! sales history API, assembles the labeled feature matrix, trains a new
//! estimator, and publishes it as a fresh artifact version. Existing
//! artifacts are never modified; the server picks up the new version on its
//! next artifact load.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::{Months, Utc};
use clap::Parser;
use tracing::{info, warn};

use replenish_api::{
    config,
    ml::{
        artifact::{version_for, ArtifactStore, ModelArtifact},
        features::{FeatureBuilder, FEATURE_SCHEMA},
        model::{DemandModel, TrainingConfig},
    },
    models::{ProductId, SalesRecord, StoreId},
    services::history::{HistoryProvider, HttpHistoryProvider},
};

#[derive(Debug, Parser)]
#[command(name = "train", about = "Train and publish a new demand model artifact")]
struct TrainArgs {
    /// (store, product) pairs to train on, formatted STORE:PRODUCT
    #[arg(long = "pair", required = true)]
    pairs: Vec<String>,

    /// Months of history to fetch per pair
    #[arg(long, default_value_t = 12)]
    months: u32,

    /// Fraction of rows held out for validation
    #[arg(long, default_value_t = 0.2)]
    validation_split: f64,

    /// RNG seed for the train/validation shuffle
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// L2 regularization strength
    #[arg(long, default_value_t = 1.0)]
    l2_penalty: f64,

    /// Override the configured artifact directory
    #[arg(long)]
    artifact_dir: Option<String>,
}

fn parse_pair(raw: &str) -> Result<(StoreId, ProductId)> {
    let (store, product) = raw
        .split_once(':')
        .with_context(|| format!("pair {:?} is not STORE:PRODUCT", raw))?;
    let store = StoreId::parse(store).with_context(|| format!("pair {:?}", raw))?;
    let product = ProductId::parse(product).with_context(|| format!("pair {:?}", raw))?;
    Ok((store, product))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = TrainArgs::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pairs: Vec<(StoreId, ProductId)> = args
        .pairs
        .iter()
        .map(|raw| parse_pair(raw))
        .collect::<Result<_>>()?;

    let provider = Arc::new(HttpHistoryProvider::new(
        &cfg.history_api_base_url,
        cfg.history_api_key.as_deref(),
        Duration::from_secs(cfg.history_request_timeout_secs),
    )?);

    info!("Starting model training over {} pairs", pairs.len());

    let end = Utc::now();
    let start = end
        .checked_sub_months(Months::new(args.months))
        .context("month span is out of range")?;

    let mut all_records: Vec<SalesRecord> = Vec::new();
    for (store_id, product_id) in &pairs {
        let records = provider.fetch(store_id, product_id, start, end).await?;
        if records.is_empty() {
            warn!(store_id = %store_id, product_id = %product_id, "No sales history for pair");
            continue;
        }
        info!(
            store_id = %store_id,
            product_id = %product_id,
            count = records.len(),
            "Collected sales history"
        );
        all_records.extend(records);
    }

    if all_records.is_empty() {
        bail!("no sales history available for any requested pair");
    }

    let (rows, labels) = FeatureBuilder::build_training_set(&all_records);
    if rows.is_empty() {
        bail!("sales history produced no trainable rows (every pair has under two months of data)");
    }
    info!(rows = rows.len(), features = FEATURE_SCHEMA.len(), "Training set assembled");

    let model = DemandModel::with_config(TrainingConfig {
        validation_split: args.validation_split,
        seed: args.seed,
        l2_penalty: args.l2_penalty,
    });
    let outcome = model.train(&rows, &labels)?;

    let trained_at = Utc::now();
    let artifact = ModelArtifact {
        version: version_for(trained_at),
        trained_at,
        feature_schema: FEATURE_SCHEMA.iter().map(|s| s.to_string()).collect(),
        training_samples: outcome.training_samples,
        metrics: outcome.metrics.clone(),
        estimator: outcome.estimator,
    };

    info!(
        version = %artifact.version,
        mae = outcome.metrics.mae,
        mape = outcome.metrics.mape,
        rmse = outcome.metrics.rmse,
        r2 = outcome.metrics.r2_score,
        "Model trained"
    );
    for feature in artifact.feature_importance().into_iter().take(10) {
        info!(
            feature = %feature.feature_name,
            score = feature.importance_score,
            rank = feature.rank,
            "Feature importance"
        );
    }

    let artifact_dir = args.artifact_dir.unwrap_or_else(|| cfg.artifact_dir.clone());
    let store = ArtifactStore::new(artifact_dir);
    store.publish(&artifact)?;

    info!(version = %artifact.version, "Training complete, artifact published");
    Ok(())
}
