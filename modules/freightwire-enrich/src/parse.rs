//! Tolerant-but-narrow parsing and validation of the LLM's structured
//! response. Tolerated: surrounding whitespace and one fenced code block.
//! Anything else is a validation failure.

use std::collections::BTreeMap;

use freightwire_common::{
    Enrichment, FreightError, KeyMetric, MarketImpact, Result, Sentiment, TransportMode, Urgency,
};
use serde::Deserialize;

/// Raw deserialization target: everything optional so presence checks are
/// explicit validation, not serde errors.
#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub summary_en: Option<String>,
    pub summary_zh: Option<String>,
    #[serde(default)]
    pub transport_modes: Vec<String>,
    pub primary_topic: Option<String>,
    #[serde(default)]
    pub secondary_topics: Vec<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
    pub sentiment: Option<String>,
    pub market_impact: Option<String>,
    pub urgency: Option<String>,
    #[serde(default)]
    pub key_metrics: Vec<LlmMetric>,
}

#[derive(Debug, Deserialize)]
pub struct LlmMetric {
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub value: Option<String>,
}

/// Allow-list unwrap: optional whitespace, then optionally one ``` fence
/// pair (with or without a `json` tag). No other prose survives.
pub(crate) fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

pub fn parse_response(raw: &str) -> Result<LlmResponse> {
    let json = strip_fences(raw);
    serde_json::from_str(json)
        .map_err(|e| FreightError::Validation(format!("LLM response is not valid JSON: {e}")))
}

fn normalize_set(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let v = value.trim().to_lowercase();
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

fn required_enum<T>(field: &str, value: Option<String>) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value
        .ok_or_else(|| FreightError::Validation(format!("missing required field {field}")))?;
    raw.trim()
        .to_lowercase()
        .parse()
        .map_err(|e| FreightError::Validation(format!("{field}: {e}")))
}

fn required_text(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(FreightError::Validation(format!(
            "missing required field {field}"
        ))),
    }
}

/// Schema-check and normalize. Rejects (→ article `failed`) when sentiment,
/// urgency, or either summary is absent, or a present enum value is not a
/// member.
pub fn validate(llm: LlmResponse) -> Result<Enrichment> {
    let sentiment: Sentiment = required_enum("sentiment", llm.sentiment)?;
    let urgency: Urgency = required_enum("urgency", llm.urgency)?;
    let summary_en = required_text("summary_en", llm.summary_en)?;
    let summary_zh = required_text("summary_zh", llm.summary_zh)?;

    let market_impact = match llm.market_impact {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<MarketImpact>()
            .map_err(|e| FreightError::Validation(format!("market_impact: {e}")))?,
        None => MarketImpact::Low,
    };

    // Unknown transport mode strings are dropped rather than fatal; the set
    // is normalized either way.
    let transport_modes: Vec<TransportMode> = normalize_set(llm.transport_modes)
        .into_iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let entities: BTreeMap<String, Vec<String>> = llm
        .entities
        .into_iter()
        .map(|(category, values)| (category.trim().to_lowercase(), normalize_set(values)))
        .filter(|(category, values)| !category.is_empty() && !values.is_empty())
        .collect();

    let key_metrics: Vec<KeyMetric> = llm
        .key_metrics
        .into_iter()
        .filter_map(|m| {
            Some(KeyMetric {
                metric_type: m.metric_type?,
                value: m.value?,
            })
        })
        .collect();

    Ok(Enrichment {
        summary_en,
        summary_zh,
        transport_modes,
        primary_topic: llm
            .primary_topic
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default(),
        secondary_topics: normalize_set(llm.secondary_topics),
        content_type: llm
            .content_type
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_else(|| "news".to_string()),
        regions: normalize_set(llm.regions),
        entities,
        sentiment,
        market_impact,
        urgency,
        key_metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_response() -> String {
        serde_json::json!({
            "summary_en": "Rates rose sharply.",
            "summary_zh": "运价大幅上涨。",
            "transport_modes": ["Ocean", "ocean", " AIR "],
            "primary_topic": "Freight-Rates",
            "secondary_topics": ["Port-Congestion", "port-congestion"],
            "content_type": "News",
            "regions": ["Transpacific"],
            "entities": {"Companies": ["Maersk", "maersk"], "ports": []},
            "sentiment": "negative",
            "market_impact": "high",
            "urgency": "high",
            "key_metrics": [{"type": "rate_change", "value": "+12%"}]
        })
        .to_string()
    }

    #[test]
    fn plain_json_parses_and_validates() {
        let enrichment = validate(parse_response(&full_response()).unwrap()).unwrap();
        assert_eq!(enrichment.sentiment, Sentiment::Negative);
        assert_eq!(enrichment.urgency, Urgency::High);
        assert_eq!(
            enrichment.transport_modes,
            vec![TransportMode::Ocean, TransportMode::Air]
        );
        assert_eq!(enrichment.secondary_topics, vec!["port-congestion"]);
        assert_eq!(enrichment.entities["companies"], vec!["maersk"]);
        assert!(!enrichment.entities.contains_key("ports"));
    }

    #[test]
    fn fenced_response_is_tolerated() {
        let fenced = format!("```json\n{}\n```", full_response());
        assert!(parse_response(&fenced).is_ok());
        let bare_fence = format!("```\n{}\n```", full_response());
        assert!(parse_response(&bare_fence).is_ok());
        let padded = format!("  \n{}\n  ", full_response());
        assert!(parse_response(&padded).is_ok());
    }

    #[test]
    fn prose_wrapper_is_rejected() {
        let prose = format!("Here is the analysis:\n{}", full_response());
        assert!(parse_response(&prose).is_err());
    }

    #[test]
    fn invalid_sentiment_is_rejected() {
        let mut v: serde_json::Value = serde_json::from_str(&full_response()).unwrap();
        v["sentiment"] = serde_json::json!("maybe");
        let err = validate(parse_response(&v.to_string()).unwrap()).unwrap_err();
        assert!(matches!(err, FreightError::Validation(_)));
    }

    #[test]
    fn missing_summary_is_rejected() {
        let mut v: serde_json::Value = serde_json::from_str(&full_response()).unwrap();
        v.as_object_mut().unwrap().remove("summary_zh");
        let err = validate(parse_response(&v.to_string()).unwrap()).unwrap_err();
        assert!(matches!(err, FreightError::Validation(_)));
    }

    #[test]
    fn missing_urgency_is_rejected() {
        let mut v: serde_json::Value = serde_json::from_str(&full_response()).unwrap();
        v.as_object_mut().unwrap().remove("urgency");
        assert!(validate(parse_response(&v.to_string()).unwrap()).is_err());
    }

    #[test]
    fn unknown_transport_modes_are_dropped() {
        let mut v: serde_json::Value = serde_json::from_str(&full_response()).unwrap();
        v["transport_modes"] = serde_json::json!(["ocean", "teleport"]);
        let enrichment = validate(parse_response(&v.to_string()).unwrap()).unwrap();
        assert_eq!(enrichment.transport_modes, vec![TransportMode::Ocean]);
    }

    #[test]
    fn missing_market_impact_defaults_low() {
        let mut v: serde_json::Value = serde_json::from_str(&full_response()).unwrap();
        v.as_object_mut().unwrap().remove("market_impact");
        let enrichment = validate(parse_response(&v.to_string()).unwrap()).unwrap();
        assert_eq!(enrichment.market_impact, MarketImpact::Low);
    }
}
