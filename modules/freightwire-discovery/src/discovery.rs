//! The discovery loop: periodic scan and validate tasks with re-entrance
//! guards, auto-promotion of high-scoring candidates, and the synchronous
//! probe used by the API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use freightwire_common::seed::SeedsFile;
use freightwire_common::{
    CandidateStatus, DiscoveryMethod, FeedConfig, FreightError, HealthState, ParserConfig, Result,
    Source, SourceCandidate, UniversalConfig,
};
use freightwire_ingest::adapters::universal::extract_links;
use freightwire_ingest::extract::PageFetcher;
use freightwire_store::Store;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::search::SearchProvider;
use crate::validate::{generate_source_id, ValidationOutcome, Validator, AUTO_APPROVE_THRESHOLD};

const SCAN_INTERVAL: Duration = Duration::from_secs(24 * 3600);
const VALIDATE_INTERVAL: Duration = Duration::from_secs(2 * 3600);
const VALIDATE_BATCH: i64 = 10;
const RESULTS_PER_QUERY: usize = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const PROMOTED_INTERVAL_MINUTES: u32 = 60;

/// Domains that can never become sources: social networks, search engines,
/// marketplaces, reference sites.
const BLOCKED_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "reddit.com",
    "tiktok.com",
    "google.com",
    "bing.com",
    "baidu.com",
    "duckduckgo.com",
    "yahoo.com",
    "amazon.com",
    "ebay.com",
    "alibaba.com",
    "taobao.com",
    "wikipedia.org",
    "pinterest.com",
    "medium.com",
];

pub fn is_blocked_domain(domain: &str) -> bool {
    let domain = domain.trim_start_matches("www.");
    BLOCKED_DOMAINS
        .iter()
        .any(|blocked| domain == *blocked || domain.ends_with(&format!(".{blocked}")))
}

/// Search queries used when the seeds file provides none.
fn default_queries() -> Vec<String> {
    [
        "container shipping news",
        "ocean freight rates news",
        "air cargo industry news",
        "rail freight news site",
        "trucking industry news",
        "logistics industry news site",
        "supply chain news publication",
        "freight forwarding news",
        "port congestion news",
        "maritime shipping newspaper",
        "customs trade compliance news",
        "cold chain logistics news",
        "last mile delivery news",
        "warehouse automation news",
        "freight rates index weekly",
        "shipping line schedules news",
        "cargo airline news",
        "intermodal transport news",
        "bulk shipping dry cargo news",
        "container leasing news",
        "物流 新闻 网站",
        "货运 行业 资讯",
        "航运 新闻",
        "跨境 物流 新闻",
        "供应链 资讯 网站",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Seed industry pages crawled for outbound links when the seeds file
/// provides none.
fn default_seed_urls() -> Vec<String> {
    [
        "https://theloadstar.com/",
        "https://www.freightwaves.com/",
        "https://www.joc.com/",
        "https://splash247.com/",
        "https://www.maritime-executive.com/",
        "https://www.supplychaindive.com/",
        "https://aircargonews.net/",
        "https://www.railfreight.com/",
        "https://www.ttnews.com/",
        "https://gcaptain.com/",
        "https://www.lloydslist.com/",
        "https://www.sofreight.com/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub queries: Vec<String>,
    pub seed_urls: Vec<String>,
    pub auto_approve_threshold: f64,
}

impl DiscoveryConfig {
    pub fn from_seeds(seeds: SeedsFile) -> Self {
        Self {
            queries: if seeds.queries.is_empty() {
                default_queries()
            } else {
                seeds.queries
            },
            seed_urls: if seeds.seed_urls.is_empty() {
                default_seed_urls()
            } else {
                seeds.seed_urls
            },
            auto_approve_threshold: AUTO_APPROVE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ScanSummary {
    pub urls_seen: usize,
    pub candidates_new: usize,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct DiscoveryStatus {
    pub enabled: bool,
    pub scan_running: bool,
    pub validate_running: bool,
}

pub struct DiscoveryLoop {
    store: Store,
    searchers: Vec<Box<dyn SearchProvider>>,
    validator: Validator,
    pages: PageFetcher,
    config: DiscoveryConfig,
    enabled: AtomicBool,
    scan_running: AtomicBool,
    validate_running: AtomicBool,
}

/// Clears a guard flag on drop so a panicking task can't wedge the loop.
struct GuardReset<'a>(&'a AtomicBool);

impl Drop for GuardReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DiscoveryLoop {
    pub fn new(
        store: Store,
        searchers: Vec<Box<dyn SearchProvider>>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            searchers,
            validator: Validator::new(),
            pages: PageFetcher::new(),
            config,
            enabled: AtomicBool::new(true),
            scan_running: AtomicBool::new(false),
            validate_running: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> DiscoveryStatus {
        DiscoveryStatus {
            enabled: self.enabled.load(Ordering::Acquire),
            scan_running: self.scan_running.load(Ordering::Acquire),
            validate_running: self.validate_running.load(Ordering::Acquire),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Both periodic tasks, never overlapping with themselves.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut scan_tick = tokio::time::interval(SCAN_INTERVAL);
        let mut validate_tick = tokio::time::interval(VALIDATE_INTERVAL);
        loop {
            tokio::select! {
                _ = scan_tick.tick() => {
                    if self.enabled.load(Ordering::Acquire) {
                        if let Err(e) = self.scan().await {
                            warn!(error = %e, "discovery scan failed");
                        }
                    }
                }
                _ = validate_tick.tick() => {
                    if self.enabled.load(Ordering::Acquire) {
                        if let Err(e) = self.validate_batch().await {
                            warn!(error = %e, "discovery validation failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("discovery loop stopping");
                    return;
                }
            }
        }
    }

    /// One scan pass: search + seed crawl, merge, blocklist, persist.
    pub async fn scan(&self) -> Result<ScanSummary> {
        if self.scan_running.swap(true, Ordering::AcqRel) {
            info!("scan already running, skipping");
            return Ok(ScanSummary::default());
        }
        let _guard = GuardReset(&self.scan_running);

        let mut summary = ScanSummary::default();
        let mut seen_domains = std::collections::HashSet::new();
        let mut candidates: Vec<(String, DiscoveryMethod, Option<String>)> = Vec::new();

        for query in &self.config.queries {
            for searcher in &self.searchers {
                let hits = match searcher.search(query, RESULTS_PER_QUERY).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(query, searcher = searcher.name(), error = %e, "search failed");
                        continue;
                    }
                };
                let method = match searcher.name() {
                    "custom_search" => DiscoveryMethod::CustomSearch,
                    _ => DiscoveryMethod::WebSearch,
                };
                for hit in hits {
                    candidates.push((hit.url, method, Some(query.clone())));
                }
            }
        }

        for seed in &self.config.seed_urls {
            let html = match self.pages.fetch_html(seed).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(seed, error = %e, "seed crawl fetch failed");
                    continue;
                }
            };
            let Ok(base) = Url::parse(seed) else { continue };
            for link in extract_links(&html, &base) {
                if link.host_str() == base.host_str() {
                    continue;
                }
                candidates.push((link.to_string(), DiscoveryMethod::SeedCrawl, None));
            }
        }

        summary.urls_seen = candidates.len();

        for (url, method, query) in candidates {
            let domain = freightwire_common::extract_domain(&url);
            if domain.is_empty() || is_blocked_domain(&domain) {
                continue;
            }
            if !seen_domains.insert(domain.clone()) {
                continue;
            }
            if self.store.domain_known(&domain).await? {
                continue;
            }
            // Candidates point at the site root, not the specific hit.
            let root = Url::parse(&url)
                .ok()
                .and_then(|u| u.join("/").ok())
                .map(|u| u.to_string())
                .unwrap_or(url);
            if self
                .store
                .insert_candidate(&root, &domain, method, query.as_deref())
                .await?
            {
                summary.candidates_new += 1;
            }
        }

        info!(
            urls_seen = summary.urls_seen,
            candidates_new = summary.candidates_new,
            "discovery scan complete"
        );
        Ok(summary)
    }

    /// One validation pass over up to VALIDATE_BATCH discovered candidates.
    pub async fn validate_batch(&self) -> Result<usize> {
        if self.validate_running.swap(true, Ordering::AcqRel) {
            info!("validation already running, skipping");
            return Ok(0);
        }
        let _guard = GuardReset(&self.validate_running);

        let claimed = self.store.claim_candidates_for_validation(VALIDATE_BATCH).await?;
        let count = claimed.len();

        for mut candidate in claimed {
            let outcome = self.validator.validate_url(&candidate.url).await;
            candidate.quality_score = outcome.quality_score;
            candidate.relevance_score = outcome.relevance_score;
            candidate.combined_score = outcome.combined_score;
            candidate.kind = outcome.kind;
            candidate.feed_url = outcome.feed_url.clone();
            candidate.sample_articles = outcome.samples.clone();
            candidate.validation = Some(outcome.details.clone());
            candidate.status = CandidateStatus::Validated;

            if outcome.combined_score >= self.config.auto_approve_threshold {
                match self.promote(&candidate).await {
                    Ok(source) => {
                        candidate.status = CandidateStatus::Approved;
                        candidate.auto_approved = true;
                        info!(
                            url = %candidate.url,
                            source_id = %source.source_id,
                            combined = outcome.combined_score,
                            "candidate auto-approved"
                        );
                    }
                    Err(e) => {
                        warn!(url = %candidate.url, error = %e, "auto-promotion failed");
                    }
                }
            }

            self.store.record_validation(&candidate).await?;
        }

        Ok(count)
    }

    /// Create a live Source from a validated candidate. The next scheduler
    /// tick picks it up.
    pub async fn promote(&self, candidate: &SourceCandidate) -> Result<Source> {
        let (kind, url, parser) = match &candidate.feed_url {
            Some(feed) => (
                freightwire_common::SourceKind::Feed,
                feed.clone(),
                ParserConfig::Feed(FeedConfig::default()),
            ),
            None => (
                freightwire_common::SourceKind::Universal,
                candidate.url.clone(),
                ParserConfig::Universal(UniversalConfig::default()),
            ),
        };

        // Retry on the unlikely slug-suffix collision.
        for _ in 0..3 {
            let source_id = generate_source_id(&candidate.url);
            if self.store.source_exists(&source_id).await? {
                continue;
            }
            let source = Source {
                source_id,
                name: freightwire_common::extract_domain(&candidate.url)
                    .trim_start_matches("www.")
                    .to_string(),
                kind,
                url: url.clone(),
                language: None,
                fetch_interval_minutes: PROMOTED_INTERVAL_MINUTES,
                priority: 0,
                enabled: true,
                parser: parser.clone(),
                last_fetched_at: None,
                health: HealthState::Healthy,
                created_at: chrono::Utc::now(),
            };
            self.store.insert_source(&source).await?;
            return Ok(source);
        }
        Err(FreightError::Store(
            "could not allocate a unique source id".to_string(),
        ))
    }

    /// Operator approval of a validated candidate.
    pub async fn approve(&self, candidate_id: Uuid) -> Result<Source> {
        let candidate = self
            .store
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| FreightError::Validation("unknown candidate".to_string()))?;
        let source = self.promote(&candidate).await?;
        self.store
            .set_candidate_status(candidate_id, CandidateStatus::Approved, false)
            .await?;
        Ok(source)
    }

    pub async fn reject(&self, candidate_id: Uuid) -> Result<bool> {
        self.store
            .set_candidate_status(candidate_id, CandidateStatus::Rejected, false)
            .await
    }

    /// Synchronous single-URL validation, bounded and unpersisted.
    pub async fn probe(&self, url: &str) -> Result<ValidationOutcome> {
        tokio::time::timeout(PROBE_TIMEOUT, self.validator.validate_url(url))
            .await
            .map_err(|_| FreightError::Network("probe timed out".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklist_matches_domain_and_subdomains() {
        assert!(is_blocked_domain("facebook.com"));
        assert!(is_blocked_domain("www.facebook.com"));
        assert!(is_blocked_domain("m.facebook.com"));
        assert!(!is_blocked_domain("freightbook.com"));
        assert!(!is_blocked_domain("theloadstar.com"));
    }

    #[test]
    fn default_config_has_queries_and_seeds() {
        let config = DiscoveryConfig::from_seeds(SeedsFile::default());
        assert!(config.queries.len() >= 20);
        assert!(config.seed_urls.len() >= 10);
        assert_eq!(config.auto_approve_threshold, 75.0);
    }

    #[test]
    fn seeds_file_overrides_defaults() {
        let config = DiscoveryConfig::from_seeds(SeedsFile {
            queries: vec!["drayage news".to_string()],
            seed_urls: vec!["https://example.com/".to_string()],
        });
        assert_eq!(config.queries, vec!["drayage news"]);
        assert_eq!(config.seed_urls, vec!["https://example.com/"]);
    }
}
