//! CSS-selector scraping adapter for sites with no feed or API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use freightwire_common::{
    FetchOutcome, FreightError, ParserConfig, RawArticle, Result, ScraperConfig, Source,
};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use super::api::parse_datetime;
use super::SourceAdapter;
use crate::extract::PageFetcher;

const SCRAPE_MAX_ENTRIES: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListEntry {
    pub title: String,
    pub url: String,
}

fn selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| FreightError::Parse(format!("selector {raw:?}: {e}")))
}

fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract `(title, link)` pairs from the listing page. `scraper::Html` is
/// not Send, so parsing stays synchronous and scoped.
pub(crate) fn parse_list(html: &str, cfg: &ScraperConfig, base: &Url) -> Result<Vec<ListEntry>> {
    let list_sel = selector(&cfg.list_selector)?;
    let title_sel = selector(&cfg.title_selector)?;
    let link_sel = selector(&cfg.link_selector)?;

    let doc = Html::parse_document(html);
    let mut entries = Vec::new();
    for container in doc.select(&list_sel).take(SCRAPE_MAX_ENTRIES) {
        let title = container.select(&title_sel).next().map(element_text);
        let href = container
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"));
        let (Some(title), Some(href)) = (title, href) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let Ok(url) = base.join(href) else { continue };
        entries.push(ListEntry {
            title,
            url: url.to_string(),
        });
    }
    Ok(entries)
}

/// Pull body/date from a detail page when selectors resolve. A `None` body
/// means the caller should fall back to full-text extraction.
pub(crate) fn parse_detail(
    html: &str,
    cfg: &ScraperConfig,
) -> (Option<String>, Option<DateTime<Utc>>) {
    let doc = Html::parse_document(html);

    let body = cfg.detail_body_selector.as_deref().and_then(|raw| {
        let sel = Selector::parse(raw).ok()?;
        let el = doc.select(&sel).next()?;
        let fragment = el.html();
        (!fragment.trim().is_empty()).then_some(fragment)
    });

    let date = cfg.detail_date_selector.as_deref().and_then(|raw| {
        let sel = Selector::parse(raw).ok()?;
        let el = doc.select(&sel).next()?;
        let attr_date = el.value().attr("datetime").map(str::to_string);
        let text = attr_date.unwrap_or_else(|| element_text(el));
        parse_datetime(text.trim())
    });

    (body, date)
}

pub struct ScrapeAdapter {
    pages: PageFetcher,
}

impl ScrapeAdapter {
    pub fn new() -> Self {
        Self {
            pages: PageFetcher::new(),
        }
    }
}

impl Default for ScrapeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ScrapeAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let cfg = match &source.parser {
            ParserConfig::Scraper(cfg) => cfg,
            _ => {
                return Err(FreightError::Validation(format!(
                    "source {} has no scraper parser config",
                    source.source_id
                )))
            }
        };

        let base = Url::parse(&source.url)
            .map_err(|e| FreightError::Parse(format!("source url {}: {e}", source.url)))?;
        let list_html = self.pages.fetch_html(&source.url).await?;
        let entries = parse_list(&list_html, cfg, &base)?;

        let mut outcome = FetchOutcome::default();
        for entry in entries {
            let detail_html = match self.pages.fetch_html(&entry.url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "detail page fetch failed");
                    outcome.partial_errors.push(format!("{}: {e}", entry.url));
                    continue;
                }
            };

            let (body_fragment, published_at) = parse_detail(&detail_html, cfg);
            outcome.articles.push(RawArticle {
                url: entry.url,
                title: entry.title,
                published_at,
                // Selected fragment when configured selectors resolve;
                // the whole page otherwise (Readability fallback).
                raw_html: Some(body_fragment.unwrap_or(detail_html)),
                raw_text: None,
                author: None,
                extra_metadata: serde_json::Value::Null,
            });
        }

        info!(
            source_id = %source.source_id,
            articles = outcome.articles.len(),
            skipped = outcome.partial_errors.len(),
            "scrape fetch complete"
        );
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "scraper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ScraperConfig {
        ScraperConfig {
            list_selector: "div.article-card".to_string(),
            title_selector: "h2".to_string(),
            link_selector: "a".to_string(),
            detail_body_selector: Some("article .content".to_string()),
            detail_date_selector: Some("time".to_string()),
        }
    }

    #[test]
    fn parses_list_entries_with_absolute_urls() {
        let html = r#"
            <div class="article-card">
              <h2> Rates  climb </h2>
              <a href="/news/rates-climb">read</a>
            </div>
            <div class="article-card">
              <h2>No link here</h2>
            </div>
        "#;
        let base = Url::parse("https://news.example.com/").unwrap();
        let entries = parse_list(html, &cfg(), &base).unwrap();
        assert_eq!(
            entries,
            vec![ListEntry {
                title: "Rates climb".to_string(),
                url: "https://news.example.com/news/rates-climb".to_string(),
            }]
        );
    }

    #[test]
    fn bad_selector_is_a_parse_error() {
        let mut bad = cfg();
        bad.list_selector = "div[".to_string();
        let base = Url::parse("https://news.example.com/").unwrap();
        assert!(matches!(
            parse_list("<div></div>", &bad, &base),
            Err(FreightError::Parse(_))
        ));
    }

    #[test]
    fn detail_selectors_resolve_body_and_date() {
        let html = r#"
            <article><div class="content"><p>Full body.</p></div></article>
            <time datetime="2026-07-01T08:00:00Z">July 1</time>
        "#;
        let (body, date) = parse_detail(html, &cfg());
        assert!(body.unwrap().contains("Full body."));
        assert!(date.is_some());
    }

    #[test]
    fn missing_detail_selectors_fall_back() {
        let html = "<main><p>Unstructured page.</p></main>";
        let (body, date) = parse_detail(html, &cfg());
        assert!(body.is_none());
        assert!(date.is_none());
    }
}
