use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use freightwire_common::{FetchLog, Source};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let sources = state.store.list_sources().await?;
    Ok(Json(json!({ "sources": sources })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> ApiResult<Json<Source>> {
    let source = state
        .store
        .get_source(&source_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("source {source_id}")))?;
    Ok(Json(source))
}

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub source_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn fetch_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> ApiResult<Json<Value>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let logs: Vec<FetchLog> = state
        .store
        .list_fetch_logs(params.source_id.as_deref(), limit)
        .await?;
    Ok(Json(json!({ "fetch_logs": logs })))
}

pub async fn source_logs(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
    Query(params): Query<LogsParams>,
) -> ApiResult<Json<Value>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let logs = state
        .store
        .list_fetch_logs(Some(&source_id), limit)
        .await?;
    Ok(Json(json!({ "fetch_logs": logs })))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let overview = state.store.overview_stats().await?;
    Ok(Json(json!({ "overview": overview })))
}
