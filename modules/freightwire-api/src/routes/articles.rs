use std::sync::Arc;

use ai_client::TextEmbedder;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use freightwire_common::Article;
use freightwire_store::ArticleQuery;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ArticlesParams {
    pub source_id: Option<String>,
    pub transport_mode: Option<String>,
    pub topic: Option<String>,
    pub language: Option<String>,
    pub sentiment: Option<String>,
    pub urgency: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

fn parse_enum<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("{field}: {e}")))
}

fn parse_date(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(ApiError::BadRequest(format!(
        "{field}: expected RFC 3339 or YYYY-MM-DD, got {raw:?}"
    )))
}

impl ArticlesParams {
    fn into_query(self) -> Result<ArticleQuery, ApiError> {
        Ok(ArticleQuery {
            source_id: self.source_id,
            transport_mode: self
                .transport_mode
                .as_deref()
                .map(|m| parse_enum("transport_mode", m))
                .transpose()?,
            topic: self.topic,
            language: self
                .language
                .as_deref()
                .map(|l| parse_enum("language", l))
                .transpose()?,
            sentiment: self
                .sentiment
                .as_deref()
                .map(|s| parse_enum("sentiment", s))
                .transpose()?,
            urgency: self
                .urgency
                .as_deref()
                .map(|u| parse_enum("urgency", u))
                .transpose()?,
            from_date: self
                .from_date
                .as_deref()
                .map(|d| parse_date("from_date", d))
                .transpose()?,
            to_date: self
                .to_date
                .as_deref()
                .map(|d| parse_date("to_date", d))
                .transpose()?,
            search: self.search,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(20),
        })
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticlesParams>,
) -> ApiResult<Json<Value>> {
    let query = params.into_query()?;
    let page = query.page.max(1);
    let page_size = query.limit();
    let articles = state.store.list_articles(&query).await?;
    Ok(Json(json!({
        "articles": articles,
        "page": page,
        "page_size": page_size,
    })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Article>> {
    let article = state
        .store
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("article {id}")))?;
    Ok(Json(article))
}

#[derive(Debug, Deserialize)]
pub struct SemanticParams {
    pub q: String,
    pub limit: Option<i64>,
}

pub async fn semantic_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SemanticParams>,
) -> ApiResult<Json<Value>> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("q must be non-empty".to_string()));
    }
    let embedding = state
        .embedder
        .embed(&params.q)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let results = state.store.semantic_search(embedding, limit).await?;
    Ok(Json(json!({ "results": results })))
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    pub limit: Option<i64>,
    pub exclude_same_source: Option<bool>,
}

pub async fn related(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<RelatedParams>,
) -> ApiResult<Json<Value>> {
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let results = state
        .store
        .related_articles(id, limit, params.exclude_same_source.unwrap_or(false))
        .await?;
    Ok(Json(json!({ "results": results })))
}

/// Operator retry of a failed enrichment.
pub async fn reprocess(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let article = state
        .store
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("article {id}")))?;

    if !state.store.reset_failed_to_pending(id).await? {
        return Err(ApiError::Conflict(format!(
            "article {id} is {}, only failed articles can be reprocessed",
            article.processing_status
        )));
    }
    state
        .enrich_tx
        .send(id)
        .await
        .map_err(|_| ApiError::Capacity("enrichment queue closed".to_string()))?;
    Ok(Json(json!({ "enqueued": true })))
}

/// Manual trigger: everything still pending goes back onto the queue.
pub async fn process_pending(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let ids = state.store.pending_article_ids(500).await?;
    let mut enqueued = 0usize;
    for id in ids {
        if state.enrich_tx.send(id).await.is_err() {
            break;
        }
        enqueued += 1;
    }
    Ok(Json(json!({ "enqueued": enqueued })))
}
