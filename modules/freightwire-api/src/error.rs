use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use freightwire_common::FreightError;
use serde_json::json;

/// API-surface error: serialized as `{detail, code}` with an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    RateLimited,
    Capacity(String),
    Upstream(String),
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(d) => (StatusCode::BAD_REQUEST, "bad_request", d.clone()),
            ApiError::Unauthorized(d) => (StatusCode::UNAUTHORIZED, "auth_error", d.clone()),
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, "not_found", d.clone()),
            ApiError::Conflict(d) => (StatusCode::CONFLICT, "conflict", d.clone()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "rate limit exceeded".to_string(),
            ),
            ApiError::Capacity(d) => (StatusCode::SERVICE_UNAVAILABLE, "capacity", d.clone()),
            ApiError::Upstream(d) => (StatusCode::BAD_GATEWAY, "network_error", d.clone()),
            ApiError::Internal(d) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", d.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();
        (status, Json(json!({ "detail": detail, "code": code }))).into_response()
    }
}

impl From<FreightError> for ApiError {
    fn from(e: FreightError) -> Self {
        match e {
            FreightError::Validation(d) | FreightError::Parse(d) => ApiError::BadRequest(d),
            FreightError::Network(d) => ApiError::Upstream(d),
            FreightError::Capacity(d) => ApiError::Capacity(d),
            FreightError::Store(d) | FreightError::Config(d) => ApiError::Internal(d),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
