//! RSS 2.0 / Atom adapter. Parses the feed, resolves entry links, fetches
//! each target page for full-text extraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use freightwire_common::{
    FeedConfig, FetchOutcome, FreightError, ParserConfig, RawArticle, Result, Source,
};
use tracing::{info, warn};
use url::Url;

use super::SourceAdapter;
use crate::extract::PageFetcher;

const FEED_MAX_ITEMS: usize = 50;

#[derive(Debug, Clone)]
pub(crate) struct FeedEntry {
    pub url: String,
    pub title: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub author: Option<String>,
}

/// Parse feed bytes into entries, resolving relative links against the feed
/// URL. A malformed document is a fatal parse error for the whole fetch.
pub(crate) fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| FreightError::Parse(format!("feed {feed_url}: {e}")))?;

    let base = Url::parse(feed_url).ok();

    let entries: Vec<FeedEntry> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

            let url = match (Url::parse(&link), &base) {
                (Ok(abs), _) => abs.to_string(),
                (Err(_), Some(base)) => base.join(&link).ok()?.to_string(),
                (Err(_), None) => return None,
            };

            Some(FeedEntry {
                url,
                title: entry.title.map(|t| t.content),
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc)),
                summary: entry.summary.map(|t| t.content),
                author: entry.authors.first().map(|p| p.name.clone()),
            })
        })
        .take(FEED_MAX_ITEMS)
        .collect();

    Ok(entries)
}

#[derive(Clone)]
pub struct FeedAdapter {
    http: reqwest::Client,
    pages: PageFetcher,
}

impl FeedAdapter {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(crate::extract::USER_AGENT)
            .build()
            .expect("failed to build feed HTTP client");
        Self {
            http,
            pages: PageFetcher::new(),
        }
    }

    /// Fetch and convert one feed. Also the delegation target for the
    /// universal adapter once it has found a feed URL.
    pub async fn fetch_feed(&self, feed_url: &str, cfg: &FeedConfig) -> Result<FetchOutcome> {
        let resp = self
            .http
            .get(feed_url)
            .send()
            .await
            .map_err(|e| FreightError::Network(format!("feed {feed_url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(FreightError::Network(format!(
                "feed {feed_url}: HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FreightError::Network(format!("feed {feed_url}: {e}")))?;

        let entries = parse_feed(&bytes, feed_url)?;

        let mut outcome = FetchOutcome::default();
        for entry in entries {
            let mut raw = RawArticle {
                url: entry.url.clone(),
                title: entry.title.unwrap_or_default(),
                published_at: entry.published,
                raw_html: None,
                raw_text: entry.summary,
                author: entry.author,
                extra_metadata: serde_json::Value::Null,
            };

            if cfg.fetch_full_text {
                match self.pages.fetch_html(&entry.url).await {
                    Ok(html) => raw.raw_html = Some(html),
                    Err(e) => {
                        // Per-entry failure: skip this entry, keep going.
                        warn!(url = %entry.url, error = %e, "feed entry page fetch failed");
                        outcome.partial_errors.push(format!("{}: {e}", entry.url));
                        continue;
                    }
                }
            }

            outcome.articles.push(raw);
        }

        info!(
            feed_url,
            articles = outcome.articles.len(),
            skipped = outcome.partial_errors.len(),
            "feed fetched"
        );
        Ok(outcome)
    }
}

impl Default for FeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let default_cfg = FeedConfig::default();
        let cfg = match &source.parser {
            ParserConfig::Feed(cfg) => cfg,
            _ => &default_cfg,
        };
        self.fetch_feed(&source.url, cfg).await
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Freight News</title>
    <link>https://news.example.com</link>
    <item>
      <title>Rates surge on transpacific</title>
      <link>https://news.example.com/rates-surge</link>
      <pubDate>Mon, 06 Jul 2026 10:00:00 GMT</pubDate>
      <description>Spot rates jumped.</description>
    </item>
    <item>
      <title>Missing link entry</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_entries_and_skips_linkless() {
        let entries = parse_feed(RSS.as_bytes(), "https://news.example.com/feed").unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.url, "https://news.example.com/rates-surge");
        assert_eq!(entry.title.as_deref(), Some("Rates surge on transpacific"));
        assert!(entry.published.is_some());
        assert_eq!(entry.summary.as_deref(), Some("Spot rates jumped."));
    }

    #[test]
    fn malformed_feed_is_a_parse_error() {
        let err = parse_feed(b"not a feed at all", "https://x.example/feed").unwrap_err();
        assert!(matches!(err, FreightError::Parse(_)));
    }

    #[tokio::test]
    async fn empty_feed_is_success_with_zero_articles() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>E</title></channel></rss>"#;
        let entries = parse_feed(empty.as_bytes(), "https://x.example/feed").unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn feed_level_http_failure_is_fatal() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = FeedAdapter::new();
        let err = adapter
            .fetch_feed(&format!("{}/feed", server.uri()), &FeedConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FreightError::Network(_)));
    }

    #[tokio::test]
    async fn per_entry_page_failure_is_partial() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let feed_body = format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>
               <item><title>Good</title><link>{0}/good</link></item>
               <item><title>Bad</title><link>{0}/bad</link></item>
               </channel></rss>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><article><p>Full text here.</p></article></body></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = FeedAdapter::new();
        let outcome = adapter
            .fetch_feed(&format!("{}/feed", server.uri()), &FeedConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.partial_errors.len(), 1);
        assert!(outcome.articles[0].raw_html.is_some());
    }
}
