//! Signed webhook delivery with bounded retry. At-least-once: receivers get
//! an HMAC header to verify and should treat the article id as an
//! idempotency hint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use freightwire_common::{Result, WebhookDelivery};
use freightwire_store::Store;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_ATTEMPTS: u32 = 3;

pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const EVENT_ARTICLE_NEW: &str = "article.new";

/// `hex(HMAC-SHA256(body, secret))` — what goes into the signature header.
pub fn sign(body: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Backoff before the next attempt: 2 s after the first failure, 4 s after
/// the second, 8 s after the third.
fn backoff_secs(attempt: u32) -> u64 {
    2u64 << (attempt - 1).min(2)
}

/// Where attempt outcomes land. The store writes WebhookDeliveryLog rows;
/// tests substitute a memory sink.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        subscription_id: Uuid,
        article_id: Uuid,
        attempt: i32,
        http_status: Option<i32>,
        latency_ms: i64,
        error: Option<&str>,
        success: bool,
    ) -> Result<()>;
}

#[async_trait]
impl DeliverySink for Store {
    async fn record(
        &self,
        subscription_id: Uuid,
        article_id: Uuid,
        attempt: i32,
        http_status: Option<i32>,
        latency_ms: i64,
        error: Option<&str>,
        success: bool,
    ) -> Result<()> {
        self.insert_webhook_log(
            subscription_id,
            article_id,
            attempt,
            http_status,
            latency_ms,
            error,
            success,
        )
        .await
    }
}

pub struct WebhookSender<L> {
    http: reqwest::Client,
    log: L,
}

impl<L: DeliverySink> WebhookSender<L> {
    pub fn new(log: L) -> Self {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("failed to build webhook HTTP client");
        Self { http, log }
    }

    /// Deliver one job: up to three attempts, every attempt logged. 4xx is
    /// terminal (a receiver that rejects won't change its mind); transport
    /// errors and 5xx retry with backoff.
    pub async fn deliver(&self, delivery: &WebhookDelivery) {
        let signature = sign(&delivery.body, &delivery.secret);

        for attempt in 1..=MAX_ATTEMPTS {
            let started = Instant::now();
            let response = self
                .http
                .post(&delivery.url)
                .header("Content-Type", "application/json")
                .header(EVENT_HEADER, EVENT_ARTICLE_NEW)
                .header(SIGNATURE_HEADER, &signature)
                .body(delivery.body.clone())
                .send()
                .await;
            let latency_ms = started.elapsed().as_millis() as i64;

            let (status, error, success, retryable) = match response {
                Ok(resp) => {
                    let code = resp.status().as_u16() as i32;
                    if resp.status().is_success() {
                        (Some(code), None, true, false)
                    } else {
                        let retryable = !resp.status().is_client_error();
                        (Some(code), Some(format!("HTTP {code}")), false, retryable)
                    }
                }
                Err(e) => (None, Some(e.to_string()), false, true),
            };

            if let Err(e) = self
                .log
                .record(
                    delivery.subscription_id,
                    delivery.article_id,
                    attempt as i32,
                    status,
                    latency_ms,
                    error.as_deref(),
                    success,
                )
                .await
            {
                warn!(error = %e, "failed to record webhook attempt");
            }

            if success {
                info!(
                    subscription_id = %delivery.subscription_id,
                    article_id = %delivery.article_id,
                    attempt,
                    "webhook delivered"
                );
                return;
            }
            if !retryable || attempt == MAX_ATTEMPTS {
                warn!(
                    subscription_id = %delivery.subscription_id,
                    article_id = %delivery.article_id,
                    attempt,
                    error = error.as_deref().unwrap_or("unknown"),
                    "webhook delivery gave up"
                );
                return;
            }

            tokio::time::sleep(Duration::from_secs(backoff_secs(attempt))).await;
        }
    }
}

/// Queue-driven worker pool. Drains until the channel closes or shutdown
/// flips; each worker takes jobs off the shared receiver.
pub async fn run_workers<L: DeliverySink + 'static>(
    sender: Arc<WebhookSender<L>>,
    rx: mpsc::Receiver<WebhookDelivery>,
    workers: usize,
    shutdown: watch::Receiver<bool>,
) {
    let rx = Arc::new(Mutex::new(rx));
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers.max(1) {
        let rx = rx.clone();
        let sender = sender.clone();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let delivery = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        delivery = rx.recv() => delivery,
                        _ = shutdown.changed() => None,
                    }
                };
                match delivery {
                    Some(delivery) => sender.deliver(&delivery).await,
                    None => return,
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    #[derive(Default)]
    struct MemorySink(StdMutex<Vec<(i32, Option<i32>, bool)>>);

    #[async_trait]
    impl DeliverySink for MemorySink {
        async fn record(
            &self,
            _subscription_id: Uuid,
            _article_id: Uuid,
            attempt: i32,
            http_status: Option<i32>,
            _latency_ms: i64,
            _error: Option<&str>,
            success: bool,
        ) -> Result<()> {
            self.0.lock().unwrap().push((attempt, http_status, success));
            Ok(())
        }
    }

    fn delivery(url: String) -> WebhookDelivery {
        WebhookDelivery {
            subscription_id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            url,
            secret: "shared-secret".to_string(),
            body: r#"{"id":"abc","title":"Rates surge"}"#.to_string(),
        }
    }

    #[test]
    fn signature_is_hex_hmac_sha256() {
        // Independently computable: the receiver recomputes bit-exact.
        let sig = sign("payload", "secret");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, sign("payload", "secret"));
        assert_ne!(sig, sign("payload", "other-secret"));
        assert_ne!(sig, sign("payload2", "secret"));

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn backoff_sequence_is_2_4_8() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(3), 8);
    }

    #[tokio::test]
    async fn success_logs_single_attempt_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("Content-Type", "application/json"))
            .and(header(EVENT_HEADER, EVENT_ARTICLE_NEW))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(MemorySink::default());
        sender.deliver(&delivery(format!("{}/hook", server.uri()))).await;

        let log = sender.log.0.lock().unwrap().clone();
        assert_eq!(log, vec![(1, Some(200), true)]);
    }

    #[tokio::test]
    async fn four_xx_is_terminal_after_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(MemorySink::default());
        sender.deliver(&delivery(format!("{}/hook", server.uri()))).await;

        let log = sender.log.0.lock().unwrap().clone();
        assert_eq!(log, vec![(1, Some(410), false)]);
    }

    /// 500, 500, then 200: three rows, final success.
    struct Flapping(StdMutex<u32>);

    impl Respond for Flapping {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            let mut calls = self.0.lock().unwrap();
            *calls += 1;
            if *calls < 3 {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200)
            }
        }
    }

    // Real backoffs: this test sleeps ~6 s.
    #[tokio::test]
    async fn flapping_target_succeeds_on_third_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(Flapping(StdMutex::new(0)))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(MemorySink::default());
        sender.deliver(&delivery(format!("{}/hook", server.uri()))).await;

        let log = sender.log.0.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![(1, Some(500), false), (2, Some(500), false), (3, Some(200), true)]
        );
    }
}
