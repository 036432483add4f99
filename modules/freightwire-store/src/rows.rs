use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use freightwire_common::{Article, Enrichment, FreightError, KeyMetric, Language, Result};
use uuid::Uuid;

/// Parse a TEXT column into one of the domain enums.
pub(crate) fn parse_col<T>(column: &str, s: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e| FreightError::Store(format!("column {column}: {e}")))
}

/// MinHash signatures persist as little-endian u64 runs.
pub(crate) fn encode_minhash(signature: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(signature.len() * 8);
    for v in signature {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub(crate) fn decode_minhash(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().expect("chunks_exact(8)")))
        .collect()
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub id: Uuid,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub body_markdown: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub title_simhash: i64,
    pub content_minhash: Option<Vec<u8>>,
    pub summary_en: Option<String>,
    pub summary_zh: Option<String>,
    pub transport_modes: Vec<String>,
    pub primary_topic: Option<String>,
    pub secondary_topics: Vec<String>,
    pub content_type: Option<String>,
    pub regions: Vec<String>,
    pub entities: Option<serde_json::Value>,
    pub sentiment: Option<String>,
    pub market_impact: Option<String>,
    pub urgency: Option<String>,
    pub key_metrics: Option<serde_json::Value>,
    pub processing_status: String,
    pub llm_processed: bool,
}

/// Every article SELECT names these columns; the embedding never leaves
/// the database except through similarity expressions.
pub(crate) const ARTICLE_COLS: &str = "id, source_id, url, title, body_text, body_markdown, \
     language, author, published_at, fetched_at, title_simhash, content_minhash, \
     summary_en, summary_zh, transport_modes, primary_topic, secondary_topics, \
     content_type, regions, entities, sentiment, market_impact, urgency, key_metrics, \
     processing_status, llm_processed";

impl ArticleRow {
    pub(crate) fn into_article(self) -> Result<Article> {
        let enrichment = match (&self.sentiment, &self.urgency) {
            (Some(sentiment), Some(urgency)) => {
                let entities: BTreeMap<String, Vec<String>> = self
                    .entities
                    .as_ref()
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let key_metrics: Vec<KeyMetric> = self
                    .key_metrics
                    .as_ref()
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                Some(Enrichment {
                    summary_en: self.summary_en.clone().unwrap_or_default(),
                    summary_zh: self.summary_zh.clone().unwrap_or_default(),
                    transport_modes: self
                        .transport_modes
                        .iter()
                        .filter_map(|m| m.parse().ok())
                        .collect(),
                    primary_topic: self.primary_topic.clone().unwrap_or_default(),
                    secondary_topics: self.secondary_topics.clone(),
                    content_type: self.content_type.clone().unwrap_or_default(),
                    regions: self.regions.clone(),
                    entities,
                    sentiment: parse_col("sentiment", sentiment)?,
                    market_impact: self
                        .market_impact
                        .as_deref()
                        .map(|m| parse_col("market_impact", m))
                        .transpose()?
                        .unwrap_or(freightwire_common::MarketImpact::Low),
                    urgency: parse_col("urgency", urgency)?,
                    key_metrics,
                })
            }
            _ => None,
        };

        Ok(Article {
            id: self.id,
            source_id: self.source_id,
            url: self.url,
            title: self.title,
            body_text: self.body_text,
            body_markdown: self.body_markdown,
            language: self
                .language
                .as_deref()
                .and_then(|l| Language::from_str(l).ok()),
            author: self.author,
            published_at: self.published_at,
            fetched_at: self.fetched_at,
            title_simhash: self.title_simhash as u64,
            content_minhash: self
                .content_minhash
                .as_deref()
                .map(decode_minhash)
                .unwrap_or_default(),
            enrichment,
            processing_status: parse_col("processing_status", &self.processing_status)?,
            llm_processed: self.llm_processed,
        })
    }
}
