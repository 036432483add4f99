//! Generic JSON API adapter driven by a field-mapping configuration.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use freightwire_common::{
    ApiAuth, ApiConfig, FetchOutcome, FreightError, Pagination, ParserConfig, RawArticle, Result,
    Source,
};
use serde_json::Value;
use tracing::info;

use super::SourceAdapter;

pub struct ApiAdapter {
    http: reqwest::Client,
}

/// Walk a `/`-separated path into a JSON document. Array segments may be
/// numeric indexes. An empty path means the document root.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .try_fold(value, |current, seg| match current {
            Value::Object(map) => map.get(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

pub(crate) fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

fn string_at(item: &Value, path: &str) -> Option<String> {
    lookup(item, path).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl ApiAdapter {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .user_agent(crate::extract::USER_AGENT)
            .build()
            .expect("failed to build API HTTP client");
        Self { http }
    }

    fn page_url(
        base: &str,
        pagination: &Pagination,
        page: u32,
        cursor: Option<&str>,
    ) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        match pagination {
            Pagination::None => base.to_string(),
            Pagination::PageNumber { param, start } => {
                format!("{base}{sep}{param}={}", start + page)
            }
            Pagination::Offset { param, page_size } => {
                format!("{base}{sep}{param}={}", page * page_size)
            }
            Pagination::Cursor { param, .. } => match cursor {
                Some(c) => format!("{base}{sep}{param}={c}"),
                None => base.to_string(),
            },
        }
    }

    /// Convert one page of items. Items missing a title or URL become
    /// partial errors rather than sinking the page.
    fn collect_items(
        cfg: &ApiConfig,
        items: &[Value],
        outcome: &mut FetchOutcome,
    ) {
        for item in items {
            let title = string_at(item, &cfg.fields.title);
            let url = string_at(item, &cfg.fields.url);
            let (Some(title), Some(url)) = (title, url) else {
                outcome
                    .partial_errors
                    .push("item missing title or url".to_string());
                continue;
            };

            outcome.articles.push(RawArticle {
                url,
                title,
                published_at: cfg
                    .fields
                    .published_at
                    .as_deref()
                    .and_then(|p| string_at(item, p))
                    .and_then(|s| parse_datetime(&s)),
                raw_html: None,
                raw_text: string_at(item, &cfg.fields.body),
                author: cfg
                    .fields
                    .author
                    .as_deref()
                    .and_then(|p| string_at(item, p)),
                extra_metadata: serde_json::Value::Null,
            });
        }
    }
}

impl Default for ApiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ApiAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let cfg = match &source.parser {
            ParserConfig::Api(cfg) => cfg,
            _ => {
                return Err(FreightError::Validation(format!(
                    "source {} has no API parser config",
                    source.source_id
                )))
            }
        };

        let mut outcome = FetchOutcome::default();
        let mut cursor: Option<String> = None;

        for page in 0..cfg.max_pages {
            if matches!(cfg.pagination, Pagination::Cursor { .. }) && page > 0 && cursor.is_none()
            {
                break;
            }

            let url = Self::page_url(&source.url, &cfg.pagination, page, cursor.as_deref());
            let mut request = self.http.get(&url);
            request = match &cfg.auth {
                ApiAuth::None => request,
                ApiAuth::ApiKeyHeader { header, key } => request.header(header.as_str(), key),
                ApiAuth::Bearer { token } => request.bearer_auth(token),
            };

            let resp = request
                .send()
                .await
                .map_err(|e| FreightError::Network(format!("{url}: {e}")))?;
            if !resp.status().is_success() {
                return Err(FreightError::Network(format!(
                    "{url}: HTTP {}",
                    resp.status()
                )));
            }

            let body: Value = resp
                .json()
                .await
                .map_err(|e| FreightError::Parse(format!("{url}: {e}")))?;

            let items = match lookup(&body, &cfg.fields.list).and_then(Value::as_array) {
                Some(items) => items,
                None if page == 0 => {
                    return Err(FreightError::Parse(format!(
                        "{url}: list path {:?} not found",
                        cfg.fields.list
                    )))
                }
                None => break,
            };
            if items.is_empty() {
                break;
            }

            Self::collect_items(cfg, items, &mut outcome);

            match &cfg.pagination {
                Pagination::None => break,
                Pagination::Cursor { cursor_path, .. } => {
                    cursor = lookup(&body, cursor_path)
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                _ => {}
            }
        }

        info!(
            source_id = %source.source_id,
            articles = outcome.articles.len(),
            "api fetch complete"
        );
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightwire_common::FieldMap;

    fn config(pagination: Pagination) -> ApiConfig {
        ApiConfig {
            auth: ApiAuth::None,
            pagination,
            max_pages: 3,
            fields: FieldMap {
                list: "data/items".to_string(),
                title: "headline".to_string(),
                body: "content/text".to_string(),
                url: "link".to_string(),
                published_at: Some("published".to_string()),
                author: Some("byline".to_string()),
            },
        }
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let doc = serde_json::json!({"data": {"items": [{"a": 1}, {"a": 2}]}});
        assert_eq!(
            lookup(&doc, "data/items/1/a"),
            Some(&serde_json::json!(2))
        );
        assert!(lookup(&doc, "data/missing").is_none());
    }

    #[test]
    fn collect_items_maps_fields_and_reports_bad_items() {
        let cfg = config(Pagination::None);
        let items = vec![
            serde_json::json!({
                "headline": "Rates rise",
                "link": "https://example.com/rates",
                "content": {"text": "Body text"},
                "published": "2026-07-01T08:00:00Z",
                "byline": "A. Writer"
            }),
            serde_json::json!({"headline": "No url"}),
        ];
        let mut outcome = FetchOutcome::default();
        ApiAdapter::collect_items(&cfg, &items, &mut outcome);

        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.partial_errors.len(), 1);
        let article = &outcome.articles[0];
        assert_eq!(article.title, "Rates rise");
        assert_eq!(article.raw_text.as_deref(), Some("Body text"));
        assert_eq!(article.author.as_deref(), Some("A. Writer"));
        assert!(article.published_at.is_some());
    }

    #[test]
    fn page_url_variants() {
        assert_eq!(
            ApiAdapter::page_url(
                "https://api.example.com/news",
                &Pagination::PageNumber {
                    param: "page".to_string(),
                    start: 1
                },
                2,
                None
            ),
            "https://api.example.com/news?page=3"
        );
        assert_eq!(
            ApiAdapter::page_url(
                "https://api.example.com/news?q=freight",
                &Pagination::Offset {
                    param: "offset".to_string(),
                    page_size: 25
                },
                2,
                None
            ),
            "https://api.example.com/news?q=freight&offset=50"
        );
    }

    #[test]
    fn parse_datetime_accepts_common_formats() {
        assert!(parse_datetime("2026-07-01T08:00:00Z").is_some());
        assert!(parse_datetime("Mon, 06 Jul 2026 10:00:00 GMT").is_some());
        assert!(parse_datetime("2026-07-01 08:00:00").is_some());
        assert!(parse_datetime("2026-07-01").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[tokio::test]
    async fn paginates_until_empty_page() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"items": [
                    {"headline": "One", "link": "https://example.com/1", "content": {"text": "a"}}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"items": []}
            })))
            .mount(&server)
            .await;

        let source = Source {
            source_id: "apisrc".to_string(),
            name: "API Source".to_string(),
            kind: freightwire_common::SourceKind::Api,
            url: format!("{}/news", server.uri()),
            language: None,
            fetch_interval_minutes: 60,
            priority: 0,
            enabled: true,
            parser: ParserConfig::Api(config(Pagination::PageNumber {
                param: "page".to_string(),
                start: 1,
            })),
            last_fetched_at: None,
            health: freightwire_common::HealthState::Healthy,
            created_at: Utc::now(),
        };

        let outcome = ApiAdapter::new().fetch(&source).await.unwrap();
        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.articles[0].title, "One");
    }
}
