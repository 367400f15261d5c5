//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::models::deployment::DeploymentView;
use crate::server::state::ServerState;
use crate::store::{DeploymentQuery, DeploymentStore};
use crate::utils::version_info;

/// Upper bound on `limit` for history listings
const MAX_HISTORY_LIMIT: usize = 500;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub deploying: bool,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "shipd".to_string(),
        version: version.version,
        deploying: state.pipeline.is_deploying(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// History listing parameters
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Deployments response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<DeploymentView>,
    pub total: usize,
}

/// Deployment history, newest first
pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<DeploymentsResponse>, AgentError> {
    let limit = params
        .limit
        .unwrap_or(state.history_limit)
        .min(MAX_HISTORY_LIMIT);

    let records = state.store.query(&DeploymentQuery::history(limit)).await?;
    let now = Utc::now();
    let deployments: Vec<DeploymentView> = records
        .iter()
        .map(|record| record.view(now, state.stale_after))
        .collect();
    let total = deployments.len();

    Ok(Json(DeploymentsResponse { deployments, total }))
}

/// Single deployment
pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentView>, AgentError> {
    let record = state
        .store
        .find(&id)
        .await?
        .ok_or_else(|| AgentError::NotFound(format!("deployment {}", id)))?;

    Ok(Json(record.view(Utc::now(), state.stale_after)))
}
