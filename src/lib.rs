//! Replenish API Library
//!
//! This crate provides the core functionality for the Replenish demand
//! forecasting API: historical sales retrieval, feature engineering, trained
//! regression inference with confidence scoring, forecast persistence, and
//! accuracy reconciliation against realized demand.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod ml;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod services;

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::ml::artifact::ModelHandle;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub model: Arc<ModelHandle>,
    pub services: handlers::AppServices,
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, errors::ServiceError>;

// API routes under /api/v1
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .merge(handlers::predictions::prediction_routes())
        .nest("/model", handlers::model::model_routes())
}

async fn api_status() -> Result<axum::Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "replenish-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(axum::Json(ApiResponse::success(status_data)))
}
