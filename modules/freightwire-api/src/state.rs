use std::sync::Arc;

use ai_client::TextEmbedder;
use freightwire_discovery::DiscoveryLoop;
use freightwire_dispatch::Dispatcher;
use freightwire_store::Store;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::RateLimiter;

/// Process-wide state owned by the composition root and shared by handlers.
pub struct AppState {
    pub store: Store,
    pub dispatcher: Arc<Dispatcher>,
    pub discovery: Arc<DiscoveryLoop>,
    pub enrich_tx: mpsc::Sender<Uuid>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub rate_limiter: RateLimiter,
}
