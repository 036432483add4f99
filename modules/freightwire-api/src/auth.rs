//! API-key authentication and in-memory rate limiting.
//!
//! While no key exists in the store the API runs open; once any key is
//! created every non-health endpoint requires a valid `X-API-Key`. The rate
//! limit is a sliding 60-second window per key (per client IP when
//! unauthenticated), skipping `/health` and `/ws`.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use freightwire_common::{ApiKey, ApiRole};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
const WINDOW: Duration = Duration::from_secs(60);

pub fn sha256_hex(cleartext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cleartext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sliding-window counter keyed by API key id or client IP.
pub struct RateLimiter {
    limit: u32,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit: limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter lock");
        let window = windows.entry(identity.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.limit as usize {
            return false;
        }
        window.push_back(now);
        true
    }
}

/// The authenticated caller, stored in request extensions. `Open` means the
/// instance has no keys yet.
#[derive(Debug, Clone)]
pub enum Caller {
    Open,
    Key(ApiKey),
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        match self {
            Caller::Open => true,
            Caller::Key(key) => key.role == ApiRole::Admin,
        }
    }
}

fn client_ip(req: &Request<Body>) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Combined rate-limit + auth gate, applied to the whole router.
pub async fn gate(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path();
    if path == "/health" || path.starts_with("/ws") {
        return Ok(next.run(req).await);
    }

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let caller = match state.store.any_api_keys().await.map_err(ApiError::from)? {
        false => Caller::Open,
        true => {
            let cleartext = presented
                .as_deref()
                .ok_or_else(|| ApiError::Unauthorized("missing X-API-Key".to_string()))?;
            let key = state
                .store
                .find_api_key_by_hash(&sha256_hex(cleartext))
                .await
                .map_err(ApiError::from)?
                .ok_or_else(|| ApiError::Unauthorized("invalid API key".to_string()))?;
            let _ = state.store.touch_api_key(key.id).await;
            Caller::Key(key)
        }
    };

    let identity = match &caller {
        Caller::Key(key) => format!("key:{}", key.id),
        Caller::Open => format!("ip:{}", client_ip(&req)),
    };
    if !state.rate_limiter.allow(&identity) {
        return Err(ApiError::RateLimited);
    }

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Guard for admin-only handlers.
pub fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("admin key required".to_string()))
    }
}

/// Generate a fresh cleartext API key. Only the SHA-256 lands in the store.
pub fn generate_api_key() -> String {
    use rand::Rng;
    let bytes: [u8; 24] = rand::thread_rng().gen();
    format!("fw_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn rate_limiter_slides() {
        let limiter = RateLimiter::new(2);
        let t0 = Instant::now();
        assert!(limiter.allow_at("k", t0));
        assert!(limiter.allow_at("k", t0 + Duration::from_secs(1)));
        assert!(!limiter.allow_at("k", t0 + Duration::from_secs(2)));
        // First request ages out of the window.
        assert!(limiter.allow_at("k", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn rate_limiter_is_per_identity() {
        let limiter = RateLimiter::new(1);
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        assert!(limiter.allow_at("b", t0));
        assert!(!limiter.allow_at("a", t0));
    }

    #[test]
    fn generated_keys_are_unique_and_prefixed() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("fw_"));
        assert_eq!(a.len(), 3 + 48);
        assert_ne!(a, b);
    }
}
