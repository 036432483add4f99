use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use freightwire_common::ApiRole;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{generate_api_key, require_admin, sha256_hex, Caller};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: ApiRole,
}

fn default_role() -> ApiRole {
    ApiRole::Reader
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Value>> {
    require_admin(&caller)?;
    let keys: Vec<Value> = state
        .store
        .list_api_keys()
        .await?
        .into_iter()
        .map(|k| {
            json!({
                "id": k.id,
                "name": k.name,
                "role": k.role,
                "enabled": k.enabled,
                "created_at": k.created_at,
                "last_used_at": k.last_used_at,
            })
        })
        .collect();
    Ok(Json(json!({ "keys": keys })))
}

/// Create a key. The cleartext is returned exactly once; only its SHA-256
/// is persisted.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateKeyRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&caller)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must be non-empty".to_string()));
    }
    let cleartext = generate_api_key();
    let key = state
        .store
        .insert_api_key(body.name.trim(), &sha256_hex(&cleartext), body.role)
        .await?;
    Ok(Json(json!({
        "id": key.id,
        "name": key.name,
        "role": key.role,
        "key": cleartext,
    })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    require_admin(&caller)?;
    if !state.store.delete_api_key(id).await? {
        return Err(ApiError::NotFound(format!("api key {id}")));
    }
    Ok(Json(json!({ "deleted": true })))
}
