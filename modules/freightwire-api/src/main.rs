use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use freightwire_common::Config;
use freightwire_discovery::{
    CustomSearcher, DiscoveryConfig, DiscoveryLoop, DuckDuckGoSearcher, SearchProvider,
};
use freightwire_dispatch::{Dispatcher, WebhookSender};
use freightwire_enrich::{EnrichmentConfig, EnrichmentPipeline};
use freightwire_ingest::{
    AdapterSet, CollectionScheduler, DedupConfig, Deduplicator, FingerprintIndex, SchedulerConfig,
};
use freightwire_store::Store;

mod auth;
mod error;
mod routes;
mod state;
mod ws;

use auth::RateLimiter;
use state::AppState;

const ENRICH_QUEUE: usize = 1024;
const WEBHOOK_QUEUE: usize = 1024;
const FETCH_DRAIN: Duration = Duration::from_secs(30);
const WEBHOOK_DRAIN: Duration = Duration::from_secs(15);

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,freightwire=info"));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn seed_from_files(config: &Config, store: &Store) -> Result<()> {
    if let Some(path) = &config.sources_file {
        let parsed = freightwire_common::seed::load_sources(path)?;
        for seed in &parsed.sources {
            store
                .upsert_seed_source(seed)
                .await
                .with_context(|| format!("seeding source {}", seed.source_id))?;
        }
        info!(count = parsed.sources.len(), "sources seeded from file");
    }
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_tracing(&config);
    config.log_redacted();

    let store = Store::connect(&config.database_url, config.db_pool_size)
        .await
        .context("connecting to Postgres")?;
    store.migrate().await.context("running migrations")?;
    seed_from_files(&config, &store).await?;

    // Transient fingerprint index, rebuilt from persisted MinHashes.
    let fingerprints = store.all_fingerprints().await?;
    info!(fingerprints = fingerprints.len(), "warming LSH index");
    let index = Arc::new(RwLock::new(FingerprintIndex::warm(fingerprints)));

    let (enrich_tx, enrich_rx) = mpsc::channel(ENRICH_QUEUE);
    let (webhook_tx, webhook_rx) = mpsc::channel(WEBHOOK_QUEUE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        webhook_tx,
        config.max_push_connections,
    ));

    let llm = OpenAi::new(&config.llm_api_key, &config.llm_model)
        .with_base_url(&config.llm_base_url)
        .with_embedding_model(&config.embedding_model);
    let chat = Arc::new(llm.clone());
    let embedder: Arc<dyn ai_client::TextEmbedder> = Arc::new(llm);

    let pipeline = Arc::new(EnrichmentPipeline::new(
        store.clone(),
        chat,
        embedder.clone(),
        dispatcher.clone(),
        EnrichmentConfig {
            workers: config.enrich_workers,
            ..Default::default()
        },
    ));

    let dedup = Arc::new(Deduplicator::new(
        store.clone(),
        index,
        DedupConfig::default(),
    ));
    let scheduler = Arc::new(CollectionScheduler::new(
        store.clone(),
        Arc::new(AdapterSet::new()),
        dedup,
        enrich_tx.clone(),
        SchedulerConfig {
            fetch_concurrency: config.fetch_concurrency,
        },
    ));

    let mut searchers: Vec<Box<dyn SearchProvider>> = vec![Box::new(DuckDuckGoSearcher::new())];
    if !config.search_api_key.is_empty() && !config.search_engine_id.is_empty() {
        searchers.push(Box::new(CustomSearcher::new(
            &config.search_api_key,
            &config.search_engine_id,
        )));
    }
    let seeds = match &config.seeds_file {
        Some(path) => freightwire_common::seed::load_seeds(path)?,
        None => Default::default(),
    };
    let discovery = Arc::new(DiscoveryLoop::new(
        store.clone(),
        searchers,
        DiscoveryConfig::from_seeds(seeds),
    ));

    let webhook_sender = Arc::new(WebhookSender::new(store.clone()));

    // Background loops.
    let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown_rx.clone()));
    let backstop_task = tokio::spawn(freightwire_ingest::scheduler::run_backstop(
        store.clone(),
        enrich_tx.clone(),
        shutdown_rx.clone(),
    ));
    let enrich_task = tokio::spawn(pipeline.clone().run(enrich_rx, shutdown_rx.clone()));
    let webhook_task = tokio::spawn(freightwire_dispatch::run_workers(
        webhook_sender,
        webhook_rx,
        config.webhook_workers,
        shutdown_rx.clone(),
    ));
    let discovery_task = tokio::spawn(discovery.clone().run(shutdown_rx));

    let state = Arc::new(AppState {
        store,
        dispatcher: dispatcher.clone(),
        discovery,
        enrich_tx,
        embedder,
        rate_limiter: RateLimiter::new(config.rate_limit_rpm),
    });

    let api = Router::new()
        .route("/articles", get(routes::articles::list))
        .route("/articles/search/semantic", get(routes::articles::semantic_search))
        .route("/articles/{id}", get(routes::articles::get))
        .route("/articles/{id}/related", get(routes::articles::related))
        .route("/articles/{id}/process", post(routes::articles::reprocess))
        .route("/process", post(routes::articles::process_pending))
        .route("/sources", get(routes::sources::list))
        .route("/sources/{id}", get(routes::sources::get))
        .route("/sources/{id}/logs", get(routes::sources::source_logs))
        .route("/fetch-logs", get(routes::sources::fetch_logs))
        .route("/stats/overview", get(routes::sources::stats))
        .route("/discovery/status", get(routes::discovery::status))
        .route("/discovery/start", post(routes::discovery::start))
        .route("/discovery/stop", post(routes::discovery::stop))
        .route("/discovery/scan", post(routes::discovery::scan))
        .route("/discovery/validate", post(routes::discovery::validate))
        .route("/discovery/candidates", get(routes::discovery::candidates))
        .route(
            "/discovery/candidates/{id}/approve",
            post(routes::discovery::approve),
        )
        .route(
            "/discovery/candidates/{id}/reject",
            post(routes::discovery::reject),
        )
        .route("/discovery/probe", post(routes::discovery::probe))
        .route(
            "/subscriptions",
            get(routes::subscriptions::list).post(routes::subscriptions::create),
        )
        .route(
            "/subscriptions/{id}",
            get(routes::subscriptions::get)
                .put(routes::subscriptions::update)
                .delete(routes::subscriptions::delete),
        )
        .route("/keys", get(routes::keys::list).post(routes::keys::create))
        .route("/keys/{id}", delete(routes::keys::delete));

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws/articles", get(ws::articles_ws))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(state.clone(), auth::gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "freightwire listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    })
    .await
    .context("server error")?;

    // Drain order: fetches, push connections, webhook queue, then exit.
    if tokio::time::timeout(FETCH_DRAIN, scheduler_task).await.is_err() {
        warn!("scheduler did not drain in time");
    }
    dispatcher.close_all();
    let _ = tokio::time::timeout(Duration::from_secs(5), backstop_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), enrich_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), discovery_task).await;
    if tokio::time::timeout(WEBHOOK_DRAIN, webhook_task).await.is_err() {
        warn!("webhook queue did not drain in time");
    }
    info!("shutdown complete");
    Ok(())
}
