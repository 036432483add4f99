//! Enrichment worker pool. Each article flows through exactly once: the
//! status CAS is the gate, failure is terminal until an operator retries.

use std::sync::Arc;
use std::time::Duration;

use ai_client::{AiError, ChatModel, TextEmbedder};
use freightwire_common::{Article, Enrichment, FreightError, Result};
use freightwire_dispatch::Dispatcher;
use freightwire_store::Store;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::parse;
use crate::prompt;

pub const EMBEDDING_DIM: usize = 1024;

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub workers: usize,
    pub llm_timeout: Duration,
    pub embed_timeout: Duration,
    pub retry_backoff: Duration,
    pub body_limit: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            llm_timeout: Duration::from_secs(90),
            embed_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(2),
            body_limit: prompt::DEFAULT_BODY_LIMIT,
        }
    }
}

pub struct EnrichmentPipeline {
    store: Store,
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn TextEmbedder>,
    dispatcher: Arc<Dispatcher>,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Store,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn TextEmbedder>,
        dispatcher: Arc<Dispatcher>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            store,
            chat,
            embedder,
            dispatcher,
            config,
        }
    }

    /// Run the bounded worker pool until the channel closes or shutdown.
    pub async fn run(
        self: Arc<Self>,
        rx: mpsc::Receiver<Uuid>,
        shutdown: watch::Receiver<bool>,
    ) {
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.config.workers);
        for worker in 0..self.config.workers.max(1) {
            let pipeline = self.clone();
            let rx = rx.clone();
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let id = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            id = rx.recv() => id,
                            _ = shutdown.changed() => None,
                        }
                    };
                    let Some(id) = id else { return };
                    if let Err(e) = pipeline.process(id).await {
                        // Non-fatal to the pipeline: log and move on.
                        warn!(worker, article_id = %id, error = %e, "enrichment failed");
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Enrich one article end to end. Any error after the CAS marks the
    /// article `failed` before propagating.
    pub async fn process(&self, id: Uuid) -> Result<()> {
        if !self.store.begin_processing(id).await? {
            // Someone else holds it, or it already finished.
            return Ok(());
        }

        let article = match self.store.get_article(id).await? {
            Some(article) => article,
            None => {
                warn!(article_id = %id, "article vanished before enrichment");
                return Ok(());
            }
        };

        match self.enrich(&article).await {
            Ok((enrichment, embedding)) => {
                self.store.apply_enrichment(id, &enrichment, embedding).await?;
                info!(article_id = %id, sentiment = %enrichment.sentiment, "article enriched");

                if let Some(completed) = self.store.get_article(id).await? {
                    self.dispatcher.publish(&completed).await;
                }
                Ok(())
            }
            Err(e) => {
                self.store.mark_enrichment_failed(id).await?;
                Err(e)
            }
        }
    }

    async fn enrich(&self, article: &Article) -> Result<(Enrichment, Vec<f32>)> {
        let user = prompt::build_user_prompt(
            &article.title,
            &article.body_text,
            self.config.body_limit,
        );

        let raw = self.call_llm(&user).await?;
        let enrichment = parse::validate(parse::parse_response(&raw)?)?;

        let embed_input = format!("{}\n{}", article.title, enrichment.summary_en);
        let embedding = tokio::time::timeout(
            self.config.embed_timeout,
            self.embedder.embed(&embed_input),
        )
        .await
        .map_err(|_| FreightError::Network("embedding call timed out".to_string()))?
        .map_err(map_ai_error)?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(FreightError::Validation(format!(
                "embedding dimension {} != {EMBEDDING_DIM}",
                embedding.len()
            )));
        }

        Ok((enrichment, embedding))
    }

    /// One call plus one retry on transient failure (network, 5xx, 429),
    /// with a short fixed backoff.
    async fn call_llm(&self, user: &str) -> Result<String> {
        let first = self.call_llm_once(user).await;
        match first {
            Ok(raw) => Ok(raw),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "LLM call failed, retrying once");
                tokio::time::sleep(self.config.retry_backoff).await;
                self.call_llm_once(user).await
            }
            Err(e) => Err(e),
        }
    }

    async fn call_llm_once(&self, user: &str) -> Result<String> {
        tokio::time::timeout(
            self.config.llm_timeout,
            self.chat.complete(prompt::SYSTEM_PROMPT, user),
        )
        .await
        .map_err(|_| FreightError::Network("LLM call timed out".to_string()))?
        .map_err(map_ai_error)
    }
}

fn map_ai_error(e: AiError) -> FreightError {
    if e.is_transient() {
        FreightError::Network(e.to_string())
    } else {
        match e {
            AiError::Provider { .. } | AiError::Empty => FreightError::Validation(e.to_string()),
            AiError::Transport(msg) => FreightError::Network(msg),
        }
    }
}
