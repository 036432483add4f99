use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use freightwire_common::{Channel, Frequency, Subscription, SubscriptionFilter};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub name: String,
    #[serde(default)]
    pub filter: SubscriptionFilter,
    pub channel: Channel,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_frequency() -> Frequency {
    Frequency::Realtime
}

fn default_enabled() -> bool {
    true
}

impl SubscriptionRequest {
    fn into_subscription(self, id: Uuid) -> Subscription {
        Subscription {
            id,
            name: self.name,
            filter: self.filter,
            channel: self.channel,
            webhook_url: self.webhook_url,
            webhook_secret: self.webhook_secret,
            frequency: self.frequency,
            enabled: self.enabled,
            created_at: Utc::now(),
        }
    }
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let subscriptions = state.store.list_subscriptions().await?;
    Ok(Json(json!({ "subscriptions": subscriptions })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriptionRequest>,
) -> ApiResult<Json<Value>> {
    let subscription = body.into_subscription(Uuid::new_v4());
    let id = state.store.create_subscription(&subscription).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .store
        .get_subscription(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("subscription {id}")))?;
    Ok(Json(subscription))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubscriptionRequest>,
) -> ApiResult<Json<Value>> {
    let subscription = body.into_subscription(id);
    if !state.store.update_subscription(&subscription).await? {
        return Err(ApiError::NotFound(format!("subscription {id}")));
    }
    Ok(Json(json!({ "updated": true })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_subscription(id).await? {
        return Err(ApiError::NotFound(format!("subscription {id}")));
    }
    Ok(Json(json!({ "deleted": true })))
}
