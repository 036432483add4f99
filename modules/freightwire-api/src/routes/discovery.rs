use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use freightwire_common::CandidateStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.discovery.status()))
}

pub async fn start(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.discovery.set_enabled(true);
    Json(json!(state.discovery.status()))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.discovery.set_enabled(false);
    Json(json!(state.discovery.status()))
}

/// Kick off a scan in the background; the guard makes double-starts no-ops.
pub async fn scan(State(state): State<Arc<AppState>>) -> Json<Value> {
    let discovery = state.discovery.clone();
    tokio::spawn(async move {
        if let Err(e) = discovery.scan().await {
            tracing::warn!(error = %e, "manual scan failed");
        }
    });
    Json(json!({ "started": true }))
}

pub async fn validate(State(state): State<Arc<AppState>>) -> Json<Value> {
    let discovery = state.discovery.clone();
    tokio::spawn(async move {
        if let Err(e) = discovery.validate_batch().await {
            tracing::warn!(error = %e, "manual validation failed");
        }
    });
    Json(json!({ "started": true }))
}

#[derive(Debug, Deserialize)]
pub struct CandidatesParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn candidates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CandidatesParams>,
) -> ApiResult<Json<Value>> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            s.parse::<CandidateStatus>()
                .map_err(|e| ApiError::BadRequest(format!("status: {e}")))
        })
        .transpose()?;
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let candidates = state.store.list_candidates(status, limit).await?;
    Ok(Json(json!({ "candidates": candidates })))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let source = state.discovery.approve(id).await?;
    Ok(Json(json!({ "source": source })))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !state.discovery.reject(id).await? {
        return Err(ApiError::NotFound(format!("candidate {id}")));
    }
    Ok(Json(json!({ "rejected": true })))
}

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    pub url: String,
}

/// Synchronous validation of one URL, nothing persisted.
pub async fn probe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProbeRequest>,
) -> ApiResult<Json<Value>> {
    if body.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must be non-empty".to_string()));
    }
    let outcome = state.discovery.probe(&body.url).await?;
    Ok(Json(json!({ "result": outcome })))
}
