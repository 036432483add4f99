//! Page fetching and full-text extraction (HTML → markdown via Readability).

use std::time::Duration;

use freightwire_common::{FreightError, RawArticle, Result};
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

use crate::normalize;

pub const USER_AGENT: &str = "freightwire/0.1";

/// Shared HTTP fetcher for article pages.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build page HTTP client");
        Self { client }
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FreightError::Network(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(FreightError::Network(format!(
                "{url}: HTTP {}",
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| FreightError::Network(format!("{url}: {e}")))
    }
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert raw HTML into clean markdown using Readability extraction.
pub fn html_to_markdown(html: &str, url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

/// Derive `(body_text, body_markdown)` from whatever the adapter produced.
/// Readability-extracted markdown wins; raw text and raw HTML are fallbacks.
pub fn build_body(raw: &RawArticle) -> (String, Option<String>) {
    if let Some(html) = &raw.raw_html {
        let markdown = html_to_markdown(html, Some(&raw.url));
        if !markdown.trim().is_empty() {
            let text = normalize::clean_text(&normalize::markdown_to_text(&markdown));
            if !text.is_empty() {
                return (text, Some(markdown));
            }
        }
        let text = normalize::normalize_html_text(html);
        if !text.is_empty() {
            return (text, None);
        }
    }
    if let Some(text) = &raw.raw_text {
        return (normalize::normalize_html_text(text), None);
    }
    (String::new(), None)
}
