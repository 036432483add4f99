//! Collection scheduler: per-source recurring fetches with jitter, isolation,
//! fetch logging, health tracking, and immediate enrichment hand-off.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use freightwire_common::{
    DedupOutcome, FetchOutcome, FetchStatus, FreightError, HealthState, Language, RawArticle,
    Result, Source,
};
use freightwire_store::{FetchWindowStats, NewArticle, Store};
use rand::Rng;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::AdapterSet;
use crate::dedup::Deduplicator;
use crate::extract::build_body;
use crate::fingerprint::{canonicalize_url, minhash128, simhash64};
use crate::normalize;

const SCHEDULER_TICK: Duration = Duration::from_secs(30);
const ADAPTER_DEADLINE: Duration = Duration::from_secs(60);
const BACKSTOP_INTERVAL: Duration = Duration::from_secs(600);
const BACKSTOP_BATCH: i64 = 500;
const JITTER_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub fetch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 8,
        }
    }
}

/// Health from the 24 h fetch-log window. A visibility signal, never a gate.
pub fn evaluate_health(
    stats: &FetchWindowStats,
    interval_minutes: u32,
    now: DateTime<Utc>,
) -> HealthState {
    if stats.total == 0 {
        return HealthState::Healthy;
    }
    let rate = stats.successes as f64 / stats.total as f64;
    let stale = match stats.last_success_at {
        Some(t) => (now - t).num_minutes() > 3 * interval_minutes as i64,
        None => true,
    };
    if stale || rate < 0.5 {
        HealthState::Failing
    } else if rate < 0.8 {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Whether a source is due, with +/-10% jitter on its interval so sources
/// configured alike do not align.
fn is_due(source: &Source, now: DateTime<Utc>, jitter: f64) -> bool {
    let last = match source.last_fetched_at {
        Some(t) => t,
        None => return true,
    };
    let interval_secs = source.fetch_interval_minutes as f64 * 60.0;
    let jittered = interval_secs * (1.0 + jitter);
    (now - last).num_seconds() as f64 >= jittered
}

struct Counts {
    found: i32,
    new: i32,
    dedup: i32,
    new_ids: Vec<Uuid>,
}

pub struct CollectionScheduler {
    store: Store,
    adapters: Arc<AdapterSet>,
    dedup: Arc<Deduplicator<Store>>,
    enrich_tx: mpsc::Sender<Uuid>,
    in_progress: Arc<Mutex<HashSet<String>>>,
    permits: Arc<Semaphore>,
}

impl CollectionScheduler {
    pub fn new(
        store: Store,
        adapters: Arc<AdapterSet>,
        dedup: Arc<Deduplicator<Store>>,
        enrich_tx: mpsc::Sender<Uuid>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            dedup,
            enrich_tx,
            in_progress: Arc::new(Mutex::new(HashSet::new())),
            permits: Arc::new(Semaphore::new(config.fetch_concurrency)),
        }
    }

    /// Main loop. Ticks until shutdown flips, then stops spawning and lets
    /// in-flight fetches drain under the caller's budget.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(SCHEDULER_TICK);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("scheduler: shutdown requested, no further ticks");
                    return;
                }
            }

            let sources = match self.store.list_enabled_sources().await {
                Ok(sources) => sources,
                Err(e) => {
                    error!(error = %e, "scheduler: failed to list sources");
                    continue;
                }
            };

            let now = Utc::now();
            for source in sources {
                let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
                if !is_due(&source, now, jitter) {
                    continue;
                }
                let scheduler = self.clone();
                tokio::spawn(async move {
                    let _permit = match scheduler.permits.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    scheduler.fetch_source(source).await;
                });
            }
        }
    }

    /// One scheduled fetch, fully isolated: a panic-free error path that
    /// always completes the FetchLog row and re-evaluates health.
    async fn fetch_source(&self, source: Source) {
        // Non-reentrant per-source lock: a tick that lands while the previous
        // fetch is still running is skipped and logged.
        {
            let mut guard = self.in_progress.lock().expect("in-progress lock");
            if !guard.insert(source.source_id.clone()) {
                info!(source_id = %source.source_id, "fetch already in progress, skipping tick");
                return;
            }
        }

        let started = Utc::now();
        let log_id = match self.store.fetch_log_started(&source.source_id).await {
            Ok(id) => Some(id),
            Err(e) => {
                // Store errors are fatal for this tick only.
                error!(source_id = %source.source_id, error = %e, "failed to open fetch log");
                None
            }
        };

        let adapter = self.adapters.adapter_for(source.kind);
        let fetched =
            tokio::time::timeout(ADAPTER_DEADLINE, adapter.fetch(&source)).await;

        let (status, counts, error_message) = match fetched {
            Err(_elapsed) => {
                warn!(source_id = %source.source_id, "adapter deadline exceeded");
                (
                    FetchStatus::Failed,
                    Counts { found: 0, new: 0, dedup: 0, new_ids: vec![] },
                    Some("adapter deadline exceeded".to_string()),
                )
            }
            Ok(Err(e)) => {
                warn!(source_id = %source.source_id, error = %e, "fetch failed");
                (
                    FetchStatus::Failed,
                    Counts { found: 0, new: 0, dedup: 0, new_ids: vec![] },
                    Some(e.to_string()),
                )
            }
            Ok(Ok(outcome)) => {
                let had_partials = !outcome.partial_errors.is_empty();
                let error_message = had_partials
                    .then(|| outcome.partial_errors.join("; "))
                    .map(|m| truncate(&m, 1000));
                let counts = self.ingest_outcome(&source, outcome).await;
                let status = if had_partials {
                    FetchStatus::Partial
                } else {
                    FetchStatus::Success
                };
                (status, counts, error_message)
            }
        };

        let duration_ms = (Utc::now() - started).num_milliseconds();
        if let Some(log_id) = log_id {
            if let Err(e) = self
                .store
                .fetch_log_complete(
                    log_id,
                    status,
                    counts.found,
                    counts.new,
                    counts.dedup,
                    error_message.as_deref(),
                    duration_ms,
                )
                .await
            {
                error!(source_id = %source.source_id, error = %e, "failed to complete fetch log");
            }
        }

        let window_start = Utc::now() - chrono::Duration::hours(24);
        let health = match self
            .store
            .fetch_window_stats(&source.source_id, window_start)
            .await
        {
            Ok(stats) => evaluate_health(&stats, source.fetch_interval_minutes, Utc::now()),
            Err(_) => source.health,
        };
        if let Err(e) = self
            .store
            .update_source_after_fetch(&source.source_id, started, health)
            .await
        {
            error!(source_id = %source.source_id, error = %e, "failed to update source");
        }

        info!(
            source_id = %source.source_id,
            status = %status,
            found = counts.found,
            new = counts.new,
            dedup = counts.dedup,
            duration_ms,
            "fetch complete"
        );

        // Hand freshly ingested ids to enrichment immediately.
        for id in counts.new_ids {
            if self.enrich_tx.send(id).await.is_err() {
                warn!("enrichment channel closed");
                break;
            }
        }

        self.in_progress
            .lock()
            .expect("in-progress lock")
            .remove(&source.source_id);
    }

    /// Normalize, fingerprint, dedup, and insert in feed order.
    async fn ingest_outcome(&self, source: &Source, outcome: FetchOutcome) -> Counts {
        let mut counts = Counts {
            found: outcome.articles.len() as i32,
            new: 0,
            dedup: 0,
            new_ids: Vec::new(),
        };

        for raw in outcome.articles {
            match self.ingest_one(source, raw).await {
                Ok(Some(id)) => {
                    counts.new += 1;
                    counts.new_ids.push(id);
                }
                Ok(None) => counts.dedup += 1,
                Err(e) => {
                    warn!(source_id = %source.source_id, error = %e, "article ingest failed");
                }
            }
        }
        counts
    }

    async fn ingest_one(&self, source: &Source, raw: RawArticle) -> Result<Option<Uuid>> {
        let url = canonicalize_url(&raw.url)?;

        let title = normalize::desuffix_title(&normalize::clean_title(&raw.title), &source.name);
        if title.is_empty() {
            return Err(FreightError::Validation(format!("{url}: empty title")));
        }

        let (body_text, body_markdown) = build_body(&raw);
        if body_text.is_empty() {
            return Err(FreightError::Validation(format!("{url}: empty body")));
        }

        let title_simhash = simhash64(&title);
        let content_minhash = minhash128(&body_text);

        if let DedupOutcome::DuplicateOf { article_id, reason } = self
            .dedup
            .check(&url, title_simhash, &content_minhash)
            .await?
        {
            info!(url, duplicate_of = %article_id, reason = %reason, "duplicate dropped");
            return Ok(None);
        }

        let language = source.language.or_else(|| detect_language(&body_text));
        let inserted = self
            .store
            .insert_article_if_absent(&NewArticle {
                source_id: source.source_id.clone(),
                url,
                title,
                body_text,
                body_markdown,
                language,
                author: raw.author,
                published_at: raw.published_at,
                title_simhash,
                content_minhash: content_minhash.clone(),
            })
            .await?;

        match inserted {
            Some(id) => {
                self.dedup.record(id, title_simhash, content_minhash);
                Ok(Some(id))
            }
            // Lost the URL race to a concurrent fetch: a duplicate.
            None => Ok(None),
        }
    }
}

/// Periodic safety net: anything still `pending` gets re-enqueued.
pub async fn run_backstop(
    store: Store,
    enrich_tx: mpsc::Sender<Uuid>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(BACKSTOP_INTERVAL);
    ticker.tick().await; // skip the immediate first tick
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        match store.pending_article_ids(BACKSTOP_BATCH).await {
            Ok(ids) => {
                if !ids.is_empty() {
                    info!(count = ids.len(), "backstop: re-enqueueing pending articles");
                }
                for id in ids {
                    if enrich_tx.send(id).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => error!(error = %e, "backstop scan failed"),
        }
    }
}

/// Crude script-based language detection: a run of CJK characters marks the
/// article as Chinese, otherwise English.
fn detect_language(text: &str) -> Option<Language> {
    let sample: Vec<char> = text.chars().take(400).collect();
    if sample.is_empty() {
        return None;
    }
    let cjk = sample
        .iter()
        .filter(|c| matches!(**c, '\u{4E00}'..='\u{9FFF}'))
        .count();
    if cjk * 5 >= sample.len() {
        Some(Language::Zh)
    } else {
        Some(Language::En)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: i64, successes: i64, last_success_mins_ago: Option<i64>) -> FetchWindowStats {
        FetchWindowStats {
            total,
            successes,
            last_success_at: last_success_mins_ago.map(|m| Utc::now() - chrono::Duration::minutes(m)),
        }
    }

    #[test]
    fn health_thresholds() {
        let now = Utc::now();
        assert_eq!(
            evaluate_health(&stats(10, 9, Some(10)), 60, now),
            HealthState::Healthy
        );
        assert_eq!(
            evaluate_health(&stats(10, 8, Some(10)), 60, now),
            HealthState::Healthy
        );
        assert_eq!(
            evaluate_health(&stats(10, 6, Some(10)), 60, now),
            HealthState::Degraded
        );
        assert_eq!(
            evaluate_health(&stats(10, 4, Some(10)), 60, now),
            HealthState::Failing
        );
    }

    #[test]
    fn health_fails_when_no_recent_success() {
        let now = Utc::now();
        // Perfect success rate but nothing recent: 3x the 60-minute interval.
        assert_eq!(
            evaluate_health(&stats(10, 10, Some(200)), 60, now),
            HealthState::Failing
        );
        assert_eq!(
            evaluate_health(&stats(10, 10, None), 60, now),
            HealthState::Failing
        );
    }

    #[test]
    fn health_with_no_data_is_healthy() {
        assert_eq!(
            evaluate_health(&stats(0, 0, None), 60, Utc::now()),
            HealthState::Healthy
        );
    }

    #[test]
    fn due_when_never_fetched() {
        let source = Source {
            source_id: "s".to_string(),
            name: "S".to_string(),
            kind: freightwire_common::SourceKind::Feed,
            url: "https://example.com/feed".to_string(),
            language: None,
            fetch_interval_minutes: 60,
            priority: 0,
            enabled: true,
            parser: freightwire_common::ParserConfig::Feed(Default::default()),
            last_fetched_at: None,
            health: HealthState::Healthy,
            created_at: Utc::now(),
        };
        assert!(is_due(&source, Utc::now(), 0.0));

        let recent = Source {
            last_fetched_at: Some(Utc::now() - chrono::Duration::minutes(10)),
            ..source
        };
        assert!(!is_due(&recent, Utc::now(), 0.0));

        let stale = Source {
            last_fetched_at: Some(Utc::now() - chrono::Duration::minutes(70)),
            ..recent
        };
        assert!(is_due(&stale, Utc::now(), 0.1));
    }

    #[test]
    fn language_detection_by_script() {
        assert_eq!(
            detect_language("集装箱运价在本周继续上涨，市场供需紧张。"),
            Some(Language::Zh)
        );
        assert_eq!(
            detect_language("Container rates kept climbing this week."),
            Some(Language::En)
        );
        assert_eq!(detect_language(""), None);
    }
}
