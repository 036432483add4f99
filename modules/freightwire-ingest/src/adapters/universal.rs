//! Zero-configuration fallback adapter. Strategy cascade, first success
//! wins: feed autodiscovery, heuristic feed-URL scan, then link-heuristic
//! page extraction with a hard fetch cap.

use async_trait::async_trait;
use freightwire_common::{
    FeedConfig, FetchOutcome, FreightError, ParserConfig, RawArticle, Result, Source,
    UniversalConfig,
};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use url::Url;

use super::feed::FeedAdapter;
use super::SourceAdapter;
use crate::extract::PageFetcher;

const COMMON_FEED_PATHS: &[&str] = &["/feed", "/rss", "/atom.xml", "/feed.xml"];
const MAX_FEED_PROBES: usize = 8;

fn feed_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"<link[^>]+type\s*=\s*["']application/(?:rss\+xml|atom\+xml)["'][^>]*>"#,
        )
        .expect("feed link regex")
    })
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("href regex"))
}

fn feed_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s"'<>]+(?:/feed/?|/rss/?|/atom/?|\.rss|\.xml)[^\s"'<>]*"#)
            .expect("feed url regex")
    })
}

/// Strategy 1: `<link rel="alternate">` declarations in the page head.
pub(crate) fn discover_feed_links(html: &str, base_url: &str) -> Vec<String> {
    let mut feeds = Vec::new();
    let base = Url::parse(base_url).ok();
    for cap in feed_link_re().captures_iter(html) {
        let tag = cap.get(0).map(|m| m.as_str()).unwrap_or("");
        if let Some(href_cap) = href_re().captures(tag) {
            let href = href_cap.get(1).map(|m| m.as_str()).unwrap_or("");
            if href.starts_with("http") {
                feeds.push(href.to_string());
            } else if let Some(base) = &base {
                if let Ok(joined) = base.join(href) {
                    feeds.push(joined.to_string());
                }
            }
        }
    }
    feeds
}

/// Strategy 2: anything in the page body that looks like a feed URL.
pub(crate) fn scan_feed_urls(html: &str) -> Vec<String> {
    feed_url_re()
        .find_iter(html)
        .map(|m| m.as_str().trim_end_matches(&['"', '\''][..]).to_string())
        .collect()
}

/// Strategy 3 filter: does this link plausibly point at an article page?
/// Wants path depth >= 2 and a year or slug-looking segment; index-style
/// segments disqualify.
pub(crate) fn looks_like_article(url: &Url) -> bool {
    let segments: Vec<&str> = match url.path_segments() {
        Some(segs) => segs.filter(|s| !s.is_empty()).collect(),
        None => return false,
    };
    if segments.len() < 2 {
        return false;
    }

    const INDEX_SEGMENTS: &[&str] = &[
        "category", "categories", "tag", "tags", "topics", "author", "authors", "page",
        "about", "contact", "search", "archive", "login", "subscribe",
    ];
    if segments
        .iter()
        .any(|s| INDEX_SEGMENTS.contains(&s.to_lowercase().as_str()))
    {
        return false;
    }

    let has_year = segments.iter().any(|s| {
        s.len() == 4
            && s.chars().all(|c| c.is_ascii_digit())
            && (s.starts_with("19") || s.starts_with("20"))
    });
    let has_slug = segments
        .iter()
        .any(|s| s.matches('-').count() >= 2 || s.len() > 20);

    has_year || has_slug
}

/// All unique links on a page, absolutized against the document base.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").expect("anchor selector");
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for el in doc.select(&anchor) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else { continue };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        if seen.insert(url.to_string()) {
            links.push(url);
        }
    }
    links
}

pub(crate) fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    for raw in ["title", "h1"] {
        let sel = Selector::parse(raw).expect("title selector");
        if let Some(el) = doc.select(&sel).next() {
            let text = el
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

pub struct UniversalAdapter {
    pages: PageFetcher,
    feed: FeedAdapter,
}

impl UniversalAdapter {
    pub fn new(feed: FeedAdapter) -> Self {
        Self {
            pages: PageFetcher::new(),
            feed,
        }
    }

    /// Feed candidates from strategies 1 and 2 plus the well-known paths.
    fn feed_candidates(html: &str, base_url: &str) -> Vec<String> {
        let mut candidates = discover_feed_links(html, base_url);
        if let Ok(base) = Url::parse(base_url) {
            for path in COMMON_FEED_PATHS {
                if let Ok(joined) = base.join(path) {
                    candidates.push(joined.to_string());
                }
            }
        }
        candidates.extend(scan_feed_urls(html));

        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));
        candidates.truncate(MAX_FEED_PROBES);
        candidates
    }

    /// The validator's feed-detection path: probe candidates, return the
    /// first URL that parses as a real feed.
    pub async fn find_feed_url(&self, page_url: &str) -> Result<Option<String>> {
        let html = self.pages.fetch_html(page_url).await?;
        for candidate in Self::feed_candidates(&html, page_url) {
            if self
                .feed
                .fetch_feed(&candidate, &FeedConfig { fetch_full_text: false })
                .await
                .is_ok()
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// The full strategy cascade against an arbitrary URL. Also used by the
    /// discovery validator's trial fetch.
    pub async fn fetch_url(&self, page_url: &str, cfg: &UniversalConfig) -> Result<FetchOutcome> {
        let html = self.pages.fetch_html(page_url).await?;

        // Strategies 1 + 2: any candidate that parses as a feed wins.
        for candidate in Self::feed_candidates(&html, page_url) {
            match self.feed.fetch_feed(&candidate, &FeedConfig::default()).await {
                Ok(outcome) => {
                    info!(page_url, feed_url = %candidate, "universal: delegated to feed");
                    return Ok(outcome);
                }
                Err(e) => debug!(candidate, error = %e, "universal: feed probe failed"),
            }
        }

        // Strategy 3: link-heuristic page extraction.
        let base = Url::parse(page_url)
            .map_err(|e| FreightError::Parse(format!("url {page_url}: {e}")))?;
        let article_links: Vec<Url> = extract_links(&html, &base)
            .into_iter()
            .filter(|u| u.host_str() == base.host_str())
            .filter(looks_like_article)
            .take(cfg.max_page_fetches)
            .collect();

        let mut outcome = FetchOutcome::default();
        for link in article_links {
            let page = match self.pages.fetch_html(link.as_str()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = %link, error = %e, "universal: article fetch failed");
                    outcome.partial_errors.push(format!("{link}: {e}"));
                    continue;
                }
            };
            let title = extract_title(&page).unwrap_or_default();
            outcome.articles.push(RawArticle {
                url: link.to_string(),
                title,
                published_at: None,
                raw_html: Some(page),
                raw_text: None,
                author: None,
                extra_metadata: serde_json::Value::Null,
            });
        }

        info!(
            page_url,
            articles = outcome.articles.len(),
            skipped = outcome.partial_errors.len(),
            "universal: link extraction complete"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl SourceAdapter for UniversalAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let default_cfg = UniversalConfig::default();
        let cfg = match &source.parser {
            ParserConfig::Universal(cfg) => cfg,
            _ => &default_cfg,
        };
        self.fetch_url(&source.url, cfg).await
    }

    fn name(&self) -> &'static str {
        "universal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_alternate_feed_links() {
        let html = r#"
            <head>
              <link rel="alternate" type="application/rss+xml" href="/feed.xml">
              <link rel="alternate" type="application/atom+xml" href="https://cdn.example.com/atom">
              <link rel="stylesheet" href="/style.css">
            </head>
        "#;
        let feeds = discover_feed_links(html, "https://news.example.com/");
        assert_eq!(
            feeds,
            vec![
                "https://news.example.com/feed.xml".to_string(),
                "https://cdn.example.com/atom".to_string(),
            ]
        );
    }

    #[test]
    fn scans_body_for_feed_shaped_urls() {
        let html = r#"<a href="https://news.example.com/rss">RSS</a> plain text"#;
        let found = scan_feed_urls(html);
        assert_eq!(found, vec!["https://news.example.com/rss".to_string()]);
    }

    #[test]
    fn article_heuristic_accepts_dated_and_slugged_paths() {
        let yes = [
            "https://x.com/2026/07/rates-surge-again",
            "https://x.com/news/global-shipping-rates-surge",
        ];
        for raw in yes {
            assert!(looks_like_article(&Url::parse(raw).unwrap()), "{raw}");
        }
    }

    #[test]
    fn article_heuristic_rejects_indexes_and_shallow_paths() {
        let no = [
            "https://x.com/",
            "https://x.com/news",
            "https://x.com/category/shipping-and-logistics",
            "https://x.com/tag/2026/rates",
            "https://x.com/about/us",
        ];
        for raw in no {
            assert!(!looks_like_article(&Url::parse(raw).unwrap()), "{raw}");
        }
    }

    #[test]
    fn extract_links_dedups_and_absolutizes() {
        let html = r#"
            <a href="/2026/07/one-long-article-slug">a</a>
            <a href="https://other.example.com/2026/07/foreign">b</a>
            <a href="/2026/07/one-long-article-slug">duplicate</a>
            <a href="mailto:tips@example.com">c</a>
        "#;
        let base = Url::parse("https://news.example.com/").unwrap();
        let links = extract_links(html, &base);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].host_str(), Some("news.example.com"));
        assert_eq!(links[1].host_str(), Some("other.example.com"));
    }

    #[test]
    fn extract_title_prefers_title_tag() {
        let html = "<html><head><title> Page  Title </title></head><body><h1>H1</h1></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Page Title"));
        assert_eq!(extract_title("<h1>Only H1</h1>").as_deref(), Some("Only H1"));
    }

    #[tokio::test]
    async fn cascades_to_feed_when_autodiscovery_hits() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let page = r#"<head><link rel="alternate" type="application/rss+xml" href="/custom-feed"></head>"#;
        let feed = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>
            <item><title>From feed</title><link>https://elsewhere.example.com/a</link></item>
            </channel></rss>"#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/custom-feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed))
            .mount(&server)
            .await;
        // The feed adapter fetches the entry page for full text.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>body</p>"))
            .mount(&server)
            .await;

        let adapter = UniversalAdapter::new(FeedAdapter::new());
        let outcome = adapter
            .fetch_url(&server.uri(), &UniversalConfig::default())
            .await
            .unwrap();
        // Entry page fetch goes to elsewhere.example.com and fails; the item
        // lands in partial_errors, but delegation itself succeeded.
        assert!(outcome.articles.len() + outcome.partial_errors.len() == 1);
    }
}
