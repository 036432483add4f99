use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Source ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Feed,
    Api,
    Scraper,
    Universal,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Api => "api",
            SourceKind::Scraper => "scraper",
            SourceKind::Universal => "universal",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "feed" => Ok(Self::Feed),
            "api" => Ok(Self::Api),
            "scraper" => Ok(Self::Scraper),
            "universal" => Ok(Self::Universal),
            other => Err(format!("unknown SourceKind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Failing,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Failing => "failing",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "failing" => Ok(Self::Failing),
            other => Err(format!("unknown HealthState: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "zh" => Ok(Self::Zh),
            other => Err(format!("unknown Language: {other}")),
        }
    }
}

/// Per-kind parser configuration. Stored as JSONB on the source row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParserConfig {
    Feed(FeedConfig),
    Api(ApiConfig),
    Scraper(ScraperConfig),
    Universal(UniversalConfig),
}

impl ParserConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            ParserConfig::Feed(_) => SourceKind::Feed,
            ParserConfig::Api(_) => SourceKind::Api,
            ParserConfig::Scraper(_) => SourceKind::Scraper,
            ParserConfig::Universal(_) => SourceKind::Universal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Fetch each entry's page and run full-text extraction. When false the
    /// feed's own summary becomes the body.
    #[serde(default = "default_true")]
    pub fetch_full_text: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            fetch_full_text: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ApiAuth {
    None,
    ApiKeyHeader { header: String, key: String },
    Bearer { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    None,
    /// `?{param}=1,2,3...`
    PageNumber { param: String, start: u32 },
    /// `?{param}=0,{page_size},2*{page_size}...`
    Offset { param: String, page_size: u32 },
    /// Next-page cursor read from the response at `cursor_path`.
    Cursor { param: String, cursor_path: String },
}

/// JSON-pointer-like paths into the API response ("data/items", "title").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    pub list: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub published_at: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub auth: ApiAuth,
    pub pagination: Pagination,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    pub fields: FieldMap,
}

fn default_max_pages() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Selects entry containers on the listing page.
    pub list_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    /// Detail-page selectors. When absent (or not resolving), the detail page
    /// goes through full-text extraction instead.
    pub detail_body_selector: Option<String>,
    pub detail_date_selector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalConfig {
    /// Hard cap on strategy-3 page fetches per cycle.
    #[serde(default = "default_max_page_fetches")]
    pub max_page_fetches: usize,
}

impl Default for UniversalConfig {
    fn default() -> Self {
        Self {
            max_page_fetches: default_max_page_fetches(),
        }
    }
}

fn default_max_page_fetches() -> usize {
    20
}

/// A configured or discovered content origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub language: Option<Language>,
    pub fetch_interval_minutes: u32,
    pub priority: i32,
    pub enabled: bool,
    pub parser: ParserConfig,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub health: HealthState,
    pub created_at: DateTime<Utc>,
}

// --- Adapter output ---

/// One item as produced by an adapter, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_html: Option<String>,
    pub raw_text: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub extra_metadata: serde_json::Value,
}

/// Best-effort adapter result: whatever was fetched plus per-entry errors.
/// A fatal source-level failure is a `FreightError` instead.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub articles: Vec<RawArticle>,
    pub partial_errors: Vec<String>,
}

// --- Article ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ProcessingStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Ocean,
    Air,
    Rail,
    Road,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Ocean => "ocean",
            TransportMode::Air => "air",
            TransportMode::Rail => "rail",
            TransportMode::Road => "road",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ocean" => Ok(Self::Ocean),
            "air" => Ok(Self::Air),
            "rail" => Ok(Self::Rail),
            "road" => Ok(Self::Road),
            other => Err(format!("unknown TransportMode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sentiment {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(format!("unknown Sentiment: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketImpact {
    Low,
    Medium,
    High,
}

impl MarketImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketImpact::Low => "low",
            MarketImpact::Medium => "medium",
            MarketImpact::High => "high",
        }
    }
}

impl std::fmt::Display for MarketImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MarketImpact {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown MarketImpact: {other}")),
        }
    }
}

/// Variant order carries the filter semantics: `low < medium < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown Urgency: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub value: String,
}

/// Structured analysis attached to an article once the LLM pass completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary_en: String,
    pub summary_zh: String,
    pub transport_modes: Vec<TransportMode>,
    pub primary_topic: String,
    pub secondary_topics: Vec<String>,
    pub content_type: String,
    pub regions: Vec<String>,
    pub entities: BTreeMap<String, Vec<String>>,
    pub sentiment: Sentiment,
    pub market_impact: MarketImpact,
    pub urgency: Urgency,
    pub key_metrics: Vec<KeyMetric>,
}

/// One logical news item. The embedding vector lives only in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub source_id: String,
    /// Canonicalized; globally unique.
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub body_markdown: Option<String>,
    pub language: Option<Language>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub title_simhash: u64,
    #[serde(skip)]
    pub content_minhash: Vec<u64>,
    pub enrichment: Option<Enrichment>,
    pub processing_status: ProcessingStatus,
    pub llm_processed: bool,
}

// --- Dedup ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    UrlExact,
    TitleSimhash,
    ContentMinhash,
}

impl std::fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateReason::UrlExact => write!(f, "url_exact"),
            DuplicateReason::TitleSimhash => write!(f, "title_simhash"),
            DuplicateReason::ContentMinhash => write!(f, "content_minhash"),
        }
    }
}

/// Normal return value of the dedup cascade — never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    Unique,
    DuplicateOf {
        article_id: Uuid,
        reason: DuplicateReason,
    },
}

// --- FetchLog ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Partial,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Success => "success",
            FetchStatus::Partial => "partial",
            FetchStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FetchStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown FetchStatus: {other}")),
        }
    }
}

/// One row per scheduled fetch attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchLog {
    pub id: Uuid,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: FetchStatus,
    pub articles_found: i32,
    pub articles_new: i32,
    pub articles_dedup: i32,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

// --- Discovery ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Discovered,
    Validating,
    Validated,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Discovered => "discovered",
            CandidateStatus::Validating => "validating",
            CandidateStatus::Validated => "validated",
            CandidateStatus::Approved => "approved",
            CandidateStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CandidateStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "validating" => Ok(Self::Validating),
            "validated" => Ok(Self::Validated),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown CandidateStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    WebSearch,
    CustomSearch,
    SeedCrawl,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::WebSearch => "web_search",
            DiscoveryMethod::CustomSearch => "custom_search",
            DiscoveryMethod::SeedCrawl => "seed_crawl",
        }
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiscoveryMethod {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "web_search" => Ok(Self::WebSearch),
            "custom_search" => Ok(Self::CustomSearch),
            "seed_crawl" => Ok(Self::SeedCrawl),
            other => Err(format!("unknown DiscoveryMethod: {other}")),
        }
    }
}

/// A short preview of a trial-fetched article, kept on the candidate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePreview {
    pub url: String,
    pub title: String,
    pub body_chars: usize,
    pub published_at: Option<DateTime<Utc>>,
}

/// What the validator observed, persisted alongside the scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub reachable: bool,
    pub feed_url: Option<String>,
    pub articles_fetched: usize,
    pub titles_nonempty: bool,
    pub bodies_substantial: bool,
    pub dates_populated: bool,
    pub urls_canonical: bool,
    pub keyword_hits: u32,
    pub error: Option<String>,
}

/// Discovery output awaiting validation or operator decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub candidate_id: Uuid,
    pub url: String,
    pub feed_url: Option<String>,
    pub kind: SourceKind,
    pub discovery_method: DiscoveryMethod,
    pub discovery_query: Option<String>,
    pub status: CandidateStatus,
    pub quality_score: f64,
    pub relevance_score: f64,
    pub combined_score: f64,
    pub sample_articles: Vec<SamplePreview>,
    pub validation: Option<ValidationDetails>,
    pub auto_approved: bool,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

// --- Subscriptions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Webhook,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "webhook" => Ok(Self::Webhook),
            other => Err(format!("unknown Channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Realtime,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Realtime => "realtime",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "realtime" => Ok(Self::Realtime),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown Frequency: {other}")),
        }
    }
}

/// A persistent filter plus delivery target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub name: String,
    pub filter: SubscriptionFilter,
    pub channel: Channel,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub frequency: Frequency,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Channel config must be schema-complete for its channel.
    pub fn validate_channel(&self) -> std::result::Result<(), String> {
        match self.channel {
            Channel::Push => Ok(()),
            Channel::Webhook => {
                if self.webhook_url.as_deref().unwrap_or("").is_empty() {
                    return Err("webhook subscription requires a target url".into());
                }
                if self.webhook_secret.as_deref().unwrap_or("").is_empty() {
                    return Err("webhook subscription requires a shared secret".into());
                }
                Ok(())
            }
        }
    }
}

/// Filter predicate: each non-empty field is an OR over its values, AND-ed
/// with the other fields. `urgency_min` matches that level or above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub transport_modes: Vec<TransportMode>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub languages: Vec<Language>,
    #[serde(default)]
    pub urgency_min: Option<Urgency>,
}

impl SubscriptionFilter {
    pub fn matches(&self, article: &Article) -> bool {
        if !self.source_ids.is_empty() && !self.source_ids.contains(&article.source_id) {
            return false;
        }
        if !self.languages.is_empty() {
            match article.language {
                Some(lang) if self.languages.contains(&lang) => {}
                _ => return false,
            }
        }

        let enrichment = article.enrichment.as_ref();

        if !self.transport_modes.is_empty() {
            let modes = enrichment.map(|e| e.transport_modes.as_slice()).unwrap_or(&[]);
            if !self.transport_modes.iter().any(|m| modes.contains(m)) {
                return false;
            }
        }
        if !self.topics.is_empty() {
            let hit = enrichment.is_some_and(|e| {
                self.topics
                    .iter()
                    .any(|t| e.primary_topic == *t || e.secondary_topics.contains(t))
            });
            if !hit {
                return false;
            }
        }
        if !self.regions.is_empty() {
            let hit = enrichment
                .is_some_and(|e| self.regions.iter().any(|r| e.regions.contains(r)));
            if !hit {
                return false;
            }
        }
        if let Some(min) = self.urgency_min {
            match enrichment.map(|e| e.urgency) {
                Some(u) if u >= min => {}
                _ => return false,
            }
        }
        true
    }
}

// --- Webhooks ---

/// One queued delivery: subscription × article.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub subscription_id: Uuid,
    pub article_id: Uuid,
    pub url: String,
    pub secret: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryLog {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub article_id: Uuid,
    pub attempt: i32,
    pub http_status: Option<i32>,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub delivered_at: DateTime<Utc>,
    pub success: bool,
}

// --- API keys ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiRole {
    Admin,
    Reader,
    Subscriber,
}

impl ApiRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiRole::Admin => "admin",
            ApiRole::Reader => "reader",
            ApiRole::Subscriber => "subscriber",
        }
    }
}

impl std::fmt::Display for ApiRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiRole {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "reader" => Ok(Self::Reader),
            "subscriber" => Ok(Self::Subscriber),
            other => Err(format!("unknown ApiRole: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    /// SHA-256 of the cleartext, hex-encoded. Cleartext is never stored.
    pub key_hash: String,
    pub role: ApiRole,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_with(enrichment: Option<Enrichment>) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "loadstar".to_string(),
            url: "https://theloadstar.com/a".to_string(),
            title: "Rates surge".to_string(),
            body_text: "body".to_string(),
            body_markdown: None,
            language: Some(Language::En),
            author: None,
            published_at: None,
            fetched_at: Utc::now(),
            title_simhash: 0,
            content_minhash: vec![],
            enrichment,
            processing_status: ProcessingStatus::Completed,
            llm_processed: true,
        }
    }

    fn enrichment() -> Enrichment {
        Enrichment {
            summary_en: "Rates up".to_string(),
            summary_zh: "运价上涨".to_string(),
            transport_modes: vec![TransportMode::Ocean],
            primary_topic: "freight-rates".to_string(),
            secondary_topics: vec!["port-congestion".to_string()],
            content_type: "news".to_string(),
            regions: vec!["asia".to_string()],
            entities: BTreeMap::new(),
            sentiment: Sentiment::Negative,
            market_impact: MarketImpact::High,
            urgency: Urgency::Medium,
            key_metrics: vec![],
        }
    }

    #[test]
    fn filter_empty_matches_everything() {
        let f = SubscriptionFilter::default();
        assert!(f.matches(&article_with(None)));
        assert!(f.matches(&article_with(Some(enrichment()))));
    }

    #[test]
    fn filter_fields_and_together() {
        let f = SubscriptionFilter {
            source_ids: vec!["loadstar".to_string()],
            transport_modes: vec![TransportMode::Ocean, TransportMode::Air],
            ..Default::default()
        };
        assert!(f.matches(&article_with(Some(enrichment()))));

        let f = SubscriptionFilter {
            source_ids: vec!["other".to_string()],
            transport_modes: vec![TransportMode::Ocean],
            ..Default::default()
        };
        assert!(!f.matches(&article_with(Some(enrichment()))));
    }

    #[test]
    fn filter_topic_matches_primary_or_secondary() {
        let f = SubscriptionFilter {
            topics: vec!["port-congestion".to_string()],
            ..Default::default()
        };
        assert!(f.matches(&article_with(Some(enrichment()))));

        let f = SubscriptionFilter {
            topics: vec!["customs".to_string()],
            ..Default::default()
        };
        assert!(!f.matches(&article_with(Some(enrichment()))));
    }

    #[test]
    fn urgency_min_matches_level_or_above() {
        let f = SubscriptionFilter {
            urgency_min: Some(Urgency::Medium),
            ..Default::default()
        };
        assert!(f.matches(&article_with(Some(enrichment()))));

        let mut high = enrichment();
        high.urgency = Urgency::High;
        assert!(f.matches(&article_with(Some(high))));

        let mut low = enrichment();
        low.urgency = Urgency::Low;
        assert!(!f.matches(&article_with(Some(low))));
    }

    #[test]
    fn urgency_min_requires_enrichment() {
        let f = SubscriptionFilter {
            urgency_min: Some(Urgency::Low),
            ..Default::default()
        };
        assert!(!f.matches(&article_with(None)));
    }

    #[test]
    fn webhook_subscription_requires_url_and_secret() {
        let sub = Subscription {
            id: Uuid::new_v4(),
            name: "ocean watch".to_string(),
            filter: SubscriptionFilter::default(),
            channel: Channel::Webhook,
            webhook_url: Some("https://example.com/hook".to_string()),
            webhook_secret: None,
            frequency: Frequency::Realtime,
            enabled: true,
            created_at: Utc::now(),
        };
        assert!(sub.validate_channel().is_err());
    }

    #[test]
    fn enum_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&SourceKind::Universal).unwrap(),
            "\"universal\""
        );
        assert_eq!(serde_json::to_string(&Urgency::High).unwrap(), "\"high\"");
        let s: Sentiment = serde_json::from_str("\"negative\"").unwrap();
        assert_eq!(s, Sentiment::Negative);
    }

    #[test]
    fn parser_config_roundtrips_tagged() {
        let cfg = ParserConfig::Scraper(ScraperConfig {
            list_selector: "div.article".to_string(),
            title_selector: "h2".to_string(),
            link_selector: "a".to_string(),
            detail_body_selector: None,
            detail_date_selector: None,
        });
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"kind\":\"scraper\""));
        let back: ParserConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), SourceKind::Scraper);
    }
}
