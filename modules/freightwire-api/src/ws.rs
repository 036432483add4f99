//! Push protocol: `GET /ws/articles` upgrades to a frame stream of
//! `{type: "new_article", data}` plus heartbeat pings. Close codes: 1008 on
//! auth failure, 1013 at capacity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use freightwire_common::SubscriptionFilter;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{sha256_hex, API_KEY_HEADER};
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_DEADLINE: Duration = Duration::from_secs(90);

const CLOSE_AUTH: u16 = 1008;
const CLOSE_CAPACITY: u16 = 1013;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub transport_mode: Option<String>,
    pub topic: Option<String>,
    pub region: Option<String>,
    pub language: Option<String>,
    pub api_key: Option<String>,
}

impl WsParams {
    /// One value per field, OR-semantics preserved by the filter shape.
    /// Unparseable values are ignored rather than fatal.
    fn into_filter(self) -> SubscriptionFilter {
        SubscriptionFilter {
            transport_modes: self
                .transport_mode
                .as_deref()
                .and_then(|m| m.parse().ok())
                .into_iter()
                .collect(),
            topics: self.topic.into_iter().collect(),
            regions: self.region.into_iter().collect(),
            languages: self
                .language
                .as_deref()
                .and_then(|l| l.parse().ok())
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }
}

async fn authorize(state: &AppState, params: &WsParams, headers: &HeaderMap) -> bool {
    match state.store.any_api_keys().await {
        Ok(false) => true,
        Ok(true) => {
            let presented = headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .or_else(|| params.api_key.clone());
            match presented {
                Some(cleartext) => matches!(
                    state.store.find_api_key_by_hash(&sha256_hex(&cleartext)).await,
                    Ok(Some(_))
                ),
                None => false,
            }
        }
        Err(_) => false,
    }
}

pub async fn articles_ws(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let authorized = authorize(&state, &params, &headers).await;
    let filter = params.into_filter();
    ws.on_upgrade(move |socket| handle_socket(state, socket, filter, authorized))
}

async fn close(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })))
        .await;
}

async fn handle_socket(
    state: Arc<AppState>,
    mut socket: WebSocket,
    filter: SubscriptionFilter,
    authorized: bool,
) {
    if !authorized {
        close(socket, CLOSE_AUTH, "auth").await;
        return;
    }

    let handle = match state.dispatcher.register(filter) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "push connection refused");
            close(socket, CLOSE_CAPACITY, "capacity").await;
            return;
        }
    };

    let mut ping_tick = tokio::time::interval(PING_INTERVAL);
    ping_tick.tick().await; // the first tick fires immediately
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            frame = handle.next() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let is_pong = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|v| v["type"].as_str().map(|t| t == "pong"))
                            .unwrap_or(false);
                        if is_pong {
                            last_pong = Instant::now();
                        }
                    }
                    Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = ping_tick.tick() => {
                if last_pong.elapsed() > PONG_DEADLINE {
                    info!(connection_id = %handle.id(), "push connection timed out");
                    break;
                }
                if socket
                    .send(Message::Text(Utf8Bytes::from_static(r#"{"type":"ping"}"#)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    state.dispatcher.unregister(handle.id());
    let _ = socket.send(Message::Close(None)).await;
}
