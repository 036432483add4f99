//! Candidate validation: reachability, feed detection, trial fetch, and the
//! quality/relevance/combined scoring that drives auto-promotion.

use freightwire_common::{
    FeedConfig, FetchOutcome, SamplePreview, SourceKind, UniversalConfig, ValidationDetails,
};
use freightwire_ingest::adapters::{FeedAdapter, UniversalAdapter};
use freightwire_ingest::extract::{build_body, PageFetcher};
use freightwire_ingest::fingerprint::canonicalize_url;
use freightwire_ingest::normalize;
use rand::Rng;
use tracing::info;

use crate::keywords::relevance_score;

pub const AUTO_APPROVE_THRESHOLD: f64 = 75.0;
const TRIAL_SAMPLES: usize = 5;
const MIN_BODY_CHARS: usize = 200;

/// The validator's full verdict for one URL.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationOutcome {
    pub details: ValidationDetails,
    pub quality_score: f64,
    pub relevance_score: f64,
    pub combined_score: f64,
    pub kind: SourceKind,
    pub feed_url: Option<String>,
    pub samples: Vec<SamplePreview>,
}

struct TrialArticle {
    url: String,
    title: String,
    body: String,
    published: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct Validator {
    pages: PageFetcher,
    feed: FeedAdapter,
    universal: UniversalAdapter,
}

impl Validator {
    pub fn new() -> Self {
        let feed = FeedAdapter::new();
        Self {
            pages: PageFetcher::new(),
            universal: UniversalAdapter::new(feed.clone()),
            feed,
        }
    }

    /// Run the whole validator against one URL. Never persists anything.
    pub async fn validate_url(&self, url: &str) -> ValidationOutcome {
        let mut details = ValidationDetails::default();

        // Reachability gate: everything else depends on a live page.
        if let Err(e) = self.pages.fetch_html(url).await {
            details.error = Some(e.to_string());
            return ValidationOutcome {
                details,
                quality_score: 0.0,
                relevance_score: 0.0,
                combined_score: 0.0,
                kind: SourceKind::Universal,
                feed_url: None,
                samples: Vec::new(),
            };
        }
        details.reachable = true;

        let feed_url = self.universal.find_feed_url(url).await.unwrap_or(None);
        details.feed_url = feed_url.clone();
        let kind = if feed_url.is_some() {
            SourceKind::Feed
        } else {
            SourceKind::Universal
        };

        let outcome = match &feed_url {
            Some(feed) => self.feed.fetch_feed(feed, &FeedConfig::default()).await,
            None => {
                self.universal
                    .fetch_url(
                        url,
                        &UniversalConfig {
                            max_page_fetches: TRIAL_SAMPLES,
                        },
                    )
                    .await
            }
        };

        let articles = match outcome {
            Ok(FetchOutcome { articles, .. }) => articles
                .into_iter()
                .take(TRIAL_SAMPLES)
                .map(|raw| {
                    let (body, _) = build_body(&raw);
                    TrialArticle {
                        url: raw.url,
                        title: normalize::clean_title(&raw.title),
                        body,
                        published: raw.published_at,
                    }
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                details.error = Some(e.to_string());
                Vec::new()
            }
        };

        details.articles_fetched = articles.len();

        let quality_score = score_quality(&articles, &mut details);
        let texts: Vec<&str> = articles
            .iter()
            .flat_map(|a| [a.title.as_str(), a.body.as_str()])
            .collect();
        let (relevance, hits) = relevance_score(&texts);
        details.keyword_hits = hits;

        let combined = combined_score(quality_score, relevance);

        let samples = articles
            .iter()
            .map(|a| SamplePreview {
                url: a.url.clone(),
                title: a.title.clone(),
                body_chars: a.body.chars().count(),
                published_at: a.published,
            })
            .collect();

        info!(
            url,
            quality = quality_score,
            relevance,
            combined,
            articles = details.articles_fetched,
            "validation complete"
        );

        ValidationOutcome {
            details,
            quality_score,
            relevance_score: relevance,
            combined_score: combined,
            kind,
            feed_url,
            samples,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn combined_score(quality: f64, relevance: f64) -> f64 {
    0.4 * quality + 0.6 * relevance
}

/// Weighted quality sum (0–100): non-empty titles 25, substantial bodies 25,
/// at least 3 articles 20, publication dates 15, canonical URLs 15.
fn score_quality(articles: &[TrialArticle], details: &mut ValidationDetails) -> f64 {
    if articles.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    details.titles_nonempty = articles.iter().all(|a| !a.title.is_empty());
    if details.titles_nonempty {
        score += 25.0;
    }

    details.bodies_substantial = articles
        .iter()
        .all(|a| a.body.chars().count() >= MIN_BODY_CHARS);
    if details.bodies_substantial {
        score += 25.0;
    }

    if articles.len() >= 3 {
        score += 20.0;
    }

    details.dates_populated = articles.iter().all(|a| a.published.is_some());
    if details.dates_populated {
        score += 15.0;
    }

    details.urls_canonical = articles
        .iter()
        .all(|a| canonicalize_url(&a.url).map(|c| c == a.url).unwrap_or(false));
    if details.urls_canonical {
        score += 15.0;
    }

    score
}

/// Stable source id for a promoted candidate: domain slug + random suffix.
pub fn generate_source_id(url: &str) -> String {
    let domain = freightwire_common::extract_domain(url);
    let domain = domain.trim_start_matches("www.");
    let slug = freightwire_common::slugify(&domain.replace('.', " "));
    let suffix: String = rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{slug}-{suffix}")
}
