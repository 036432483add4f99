//! In-process broadcaster. Completed articles fan out to live push
//! connections (server-side filtered, non-blocking, bounded buffers) and to
//! the webhook queue for matching realtime subscriptions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use freightwire_common::{
    Article, FreightError, Result, SubscriptionFilter, WebhookDelivery,
};
use freightwire_store::Store;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
pub const SEND_BUFFER: usize = 32;

/// One live push subscriber. The filter is immutable for the connection's
/// lifetime; the send buffer drops the oldest undelivered frame on overflow.
#[derive(Debug)]
struct PushConnection {
    filter: SubscriptionFilter,
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl PushConnection {
    fn enqueue(&self, frame: &str) {
        {
            let mut queue = self.queue.lock().expect("push queue lock");
            if queue.len() >= SEND_BUFFER {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(frame.to_string());
        }
        self.notify.notify_one();
    }
}

/// Consumer side of one connection, held by its WebSocket task.
#[derive(Debug)]
pub struct PushHandle {
    id: Uuid,
    conn: Arc<PushConnection>,
}

impl PushHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dropped(&self) -> u64 {
        self.conn.dropped.load(Ordering::Relaxed)
    }

    /// Next frame to deliver, in dispatch order. `None` once the dispatcher
    /// has closed the connection and the buffer is drained.
    pub async fn next(&self) -> Option<String> {
        loop {
            {
                let mut queue = self.conn.queue.lock().expect("push queue lock");
                if let Some(frame) = queue.pop_front() {
                    return Some(frame);
                }
            }
            if self.conn.closed.load(Ordering::Acquire) {
                return None;
            }
            self.conn.notify.notified().await;
        }
    }
}

pub struct Dispatcher {
    connections: RwLock<HashMap<Uuid, Arc<PushConnection>>>,
    max_connections: usize,
    store: Store,
    webhook_tx: mpsc::Sender<WebhookDelivery>,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        webhook_tx: mpsc::Sender<WebhookDelivery>,
        max_connections: usize,
    ) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
            store,
            webhook_tx,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().expect("registry lock").len()
    }

    /// Admit a new push connection, or refuse at capacity.
    pub fn register(&self, filter: SubscriptionFilter) -> Result<PushHandle> {
        let mut connections = self.connections.write().expect("registry lock");
        if connections.len() >= self.max_connections {
            return Err(FreightError::Capacity(format!(
                "push connection limit {} reached",
                self.max_connections
            )));
        }
        let id = Uuid::new_v4();
        let conn = Arc::new(PushConnection {
            filter,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        connections.insert(id, conn.clone());
        info!(connection_id = %id, live = connections.len(), "push connection registered");
        Ok(PushHandle { id, conn })
    }

    pub fn unregister(&self, id: Uuid) {
        let mut connections = self.connections.write().expect("registry lock");
        if let Some(conn) = connections.remove(&id) {
            conn.closed.store(true, Ordering::Release);
            conn.notify.notify_one();
        }
    }

    /// Close every live connection (process shutdown).
    pub fn close_all(&self) {
        let mut connections = self.connections.write().expect("registry lock");
        for (_, conn) in connections.drain() {
            conn.closed.store(true, Ordering::Release);
            conn.notify.notify_one();
        }
    }

    /// Fan a completed article out. Push writes never block; webhook
    /// deliveries enqueue one job per matching realtime subscription.
    pub async fn publish(&self, article: &Article) {
        let frame = serde_json::json!({
            "type": "new_article",
            "data": article,
        })
        .to_string();

        let matching: Vec<Arc<PushConnection>> = {
            let connections = self.connections.read().expect("registry lock");
            connections
                .values()
                .filter(|c| c.filter.matches(article))
                .cloned()
                .collect()
        };
        for conn in &matching {
            conn.enqueue(&frame);
        }

        let subscriptions = match self.store.list_realtime_webhook_subscriptions().await {
            Ok(subs) => subs,
            Err(e) => {
                warn!(error = %e, "failed to load webhook subscriptions");
                return;
            }
        };

        let body = serde_json::to_string(article).unwrap_or_default();
        let mut enqueued = 0usize;
        for sub in subscriptions {
            if !sub.filter.matches(article) {
                continue;
            }
            let (Some(url), Some(secret)) = (sub.webhook_url.clone(), sub.webhook_secret.clone())
            else {
                continue;
            };
            let delivery = WebhookDelivery {
                subscription_id: sub.id,
                article_id: article.id,
                url,
                secret,
                body: body.clone(),
            };
            if self.webhook_tx.try_send(delivery).is_err() {
                warn!(subscription_id = %sub.id, "webhook queue full, delivery dropped");
                continue;
            }
            enqueued += 1;
        }

        info!(
            article_id = %article.id,
            push = matching.len(),
            webhooks = enqueued,
            "article dispatched"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use freightwire_common::{
        Enrichment, Language, MarketImpact, ProcessingStatus, Sentiment, TransportMode, Urgency,
    };
    use std::collections::BTreeMap;

    fn store_stub() -> Store {
        // Lazy pool: never connects unless a query runs. Push-only tests
        // exercise the registry without touching Postgres.
        let pool = sqlx_stub();
        Store::new(pool)
    }

    fn sqlx_stub() -> sqlx::PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://stub@localhost/stub")
            .expect("lazy pool")
    }

    fn dispatcher(max: usize) -> (Dispatcher, mpsc::Receiver<WebhookDelivery>) {
        let (tx, rx) = mpsc::channel(16);
        (Dispatcher::new(store_stub(), tx, max), rx)
    }

    fn article(mode: TransportMode) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "loadstar".to_string(),
            url: "https://theloadstar.com/a".to_string(),
            title: "Rates".to_string(),
            body_text: "body".to_string(),
            body_markdown: None,
            language: Some(Language::En),
            author: None,
            published_at: None,
            fetched_at: Utc::now(),
            title_simhash: 0,
            content_minhash: vec![],
            enrichment: Some(Enrichment {
                summary_en: "s".to_string(),
                summary_zh: "s".to_string(),
                transport_modes: vec![mode],
                primary_topic: "rates".to_string(),
                secondary_topics: vec![],
                content_type: "news".to_string(),
                regions: vec![],
                entities: BTreeMap::new(),
                sentiment: Sentiment::Neutral,
                market_impact: MarketImpact::Medium,
                urgency: Urgency::Medium,
                key_metrics: vec![],
            }),
            processing_status: ProcessingStatus::Completed,
            llm_processed: true,
        }
    }

    #[tokio::test]
    async fn capacity_cap_refuses_new_connections() {
        let (dispatcher, _rx) = dispatcher(2);
        let _a = dispatcher.register(SubscriptionFilter::default()).unwrap();
        let _b = dispatcher.register(SubscriptionFilter::default()).unwrap();
        let err = dispatcher
            .register(SubscriptionFilter::default())
            .unwrap_err();
        assert!(matches!(err, FreightError::Capacity(_)));

        dispatcher.unregister(_a.id());
        assert!(dispatcher.register(SubscriptionFilter::default()).is_ok());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let (dispatcher, _rx) = dispatcher(10);
        let handle = dispatcher.register(SubscriptionFilter::default()).unwrap();

        let conn = {
            let connections = dispatcher.connections.read().unwrap();
            connections.get(&handle.id()).unwrap().clone()
        };
        for i in 0..(SEND_BUFFER + 3) {
            conn.enqueue(&format!("frame-{i}"));
        }

        assert_eq!(handle.dropped(), 3);
        // Oldest three were dropped; delivery continues from frame-3.
        assert_eq!(handle.next().await.as_deref(), Some("frame-3"));
    }

    #[tokio::test]
    async fn filtered_connection_only_gets_matches() {
        let (dispatcher, _rx) = dispatcher(10);
        let ocean = dispatcher
            .register(SubscriptionFilter {
                transport_modes: vec![TransportMode::Ocean],
                ..Default::default()
            })
            .unwrap();

        let matching: Vec<Arc<PushConnection>> = {
            let connections = dispatcher.connections.read().unwrap();
            connections
                .values()
                .filter(|c| c.filter.matches(&article(TransportMode::Air)))
                .cloned()
                .collect()
        };
        assert!(matching.is_empty());

        let frame_article = article(TransportMode::Ocean);
        {
            let connections = dispatcher.connections.read().unwrap();
            for conn in connections.values() {
                if conn.filter.matches(&frame_article) {
                    conn.enqueue("ocean-frame");
                }
            }
        }
        assert_eq!(ocean.next().await.as_deref(), Some("ocean-frame"));
    }

    #[tokio::test]
    async fn closed_connection_drains_then_ends() {
        let (dispatcher, _rx) = dispatcher(10);
        let handle = dispatcher.register(SubscriptionFilter::default()).unwrap();
        {
            let connections = dispatcher.connections.read().unwrap();
            connections.get(&handle.id()).unwrap().enqueue("last");
        }
        dispatcher.unregister(handle.id());
        assert_eq!(handle.next().await.as_deref(), Some("last"));
        assert_eq!(handle.next().await, None);
    }
}
