//! Search providers for candidate generation: a cost-free HTML engine that
//! always works, plus an optional credentialed custom-search API.

use async_trait::async_trait;
use freightwire_common::{FreightError, Result};
use scraper::{Html, Selector};
use tracing::info;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
    fn name(&self) -> &'static str;
}

// --- DuckDuckGo (HTML endpoint, no credentials) ---

pub struct DuckDuckGoSearcher {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoSearcher {
    pub fn new() -> Self {
        Self::with_base_url("https://html.duckduckgo.com")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (compatible; freightwire/0.1)")
            .build()
            .expect("failed to build search HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Result links are redirect URLs carrying the real target in the `uddg`
/// query parameter.
pub(crate) fn decode_result_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    if url.path().starts_with("/l/") {
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    Some(absolute)
}

pub(crate) fn parse_result_page(html: &str, max_results: usize) -> Vec<SearchHit> {
    let doc = Html::parse_document(html);
    let result_sel = Selector::parse("a.result__a").expect("result selector");
    let mut hits = Vec::new();
    for el in doc.select(&result_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(url) = decode_result_href(href) else {
            continue;
        };
        let title = el
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        hits.push(SearchHit { url, title });
        if hits.len() >= max_results {
            break;
        }
    }
    hits
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/html/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| FreightError::Network(format!("search {query:?}: {e}")))?;

        if !resp.status().is_success() {
            return Err(FreightError::Network(format!(
                "search {query:?}: HTTP {}",
                resp.status()
            )));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| FreightError::Network(e.to_string()))?;
        let hits = parse_result_page(&html, max_results);
        info!(query, hits = hits.len(), "web search complete");
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

impl Default for DuckDuckGoSearcher {
    fn default() -> Self {
        Self::new()
    }
}

// --- Custom search API (optional, credentialed) ---

pub struct CustomSearcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

impl CustomSearcher {
    pub fn new(api_key: &str, engine_id: &str) -> Self {
        Self::with_base_url("https://www.googleapis.com/customsearch/v1", api_key, engine_id)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, engine_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .expect("failed to build search HTTP client");
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for CustomSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let num = max_results.min(10).to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FreightError::Network(format!("custom search {query:?}: {e}")))?;

        if !resp.status().is_success() {
            return Err(FreightError::Network(format!(
                "custom search {query:?}: HTTP {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FreightError::Parse(e.to_string()))?;

        let hits = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(SearchHit {
                            url: item["link"].as_str()?.to_string(),
                            title: item["title"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .take(max_results)
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "custom_search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_redirect_hrefs() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Ftheloadstar.com%2Fnews&rut=abc";
        assert_eq!(
            decode_result_href(href).as_deref(),
            Some("https://theloadstar.com/news")
        );
        assert_eq!(
            decode_result_href("https://direct.example.com/a").as_deref(),
            Some("https://direct.example.com/a")
        );
    }

    #[test]
    fn parses_result_anchors() {
        let html = r#"
            <div class="result">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fsplash247.com%2F">Splash 247 — shipping news</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://www.freightwaves.com/">FreightWaves</a>
            </div>
        "#;
        let hits = parse_result_page(html, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://splash247.com/");
        assert!(hits[0].title.contains("Splash 247"));
    }

    #[test]
    fn respects_max_results() {
        let html = r#"
            <a class="result__a" href="https://a.example.com/">A</a>
            <a class="result__a" href="https://b.example.com/">B</a>
        "#;
        assert_eq!(parse_result_page(html, 1).len(), 1);
    }

    #[tokio::test]
    async fn searches_against_html_endpoint() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "container shipping news"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a class="result__a" href="https://theloadstar.com/">The Loadstar</a>"#,
            ))
            .mount(&server)
            .await;

        let searcher = DuckDuckGoSearcher::with_base_url(&server.uri());
        let hits = searcher.search("container shipping news", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://theloadstar.com/");
    }

    #[tokio::test]
    async fn custom_search_parses_items() {
        use wiremock::matchers::{method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cx", "engine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"link": "https://splash247.com/", "title": "Splash 247"}
                ]
            })))
            .mount(&server)
            .await;

        let searcher = CustomSearcher::with_base_url(&server.uri(), "key", "engine");
        let hits = searcher.search("shipping", 5).await.unwrap();
        assert_eq!(
            hits,
            vec![SearchHit {
                url: "https://splash247.com/".to_string(),
                title: "Splash 247".to_string(),
            }]
        );
    }
}
