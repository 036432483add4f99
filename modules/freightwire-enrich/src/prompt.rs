//! Versioned enrichment prompt. Bump the version whenever the requested
//! schema changes so responses can be traced to the template that asked.

pub const PROMPT_VERSION: &str = "v1";

pub const DEFAULT_BODY_LIMIT: usize = 8000;

pub const SYSTEM_PROMPT: &str = r#"You are a logistics news analyst. Analyze the article and respond with STRICT JSON only: a single object, no prose, no markdown fences, matching exactly this shape:

{
  "summary_en": "2-3 sentence English summary",
  "summary_zh": "2-3 sentence Chinese summary",
  "transport_modes": ["ocean" | "air" | "rail" | "road", ...],
  "primary_topic": "short topic slug, e.g. freight-rates",
  "secondary_topics": ["slug", ...],
  "content_type": "news | analysis | announcement | report",
  "regions": ["region or trade lane, lowercase", ...],
  "entities": {"companies": [...], "ports": [...], "organizations": [...]},
  "sentiment": "positive" | "neutral" | "negative",
  "market_impact": "high" | "medium" | "low",
  "urgency": "high" | "medium" | "low",
  "key_metrics": [{"type": "rate_change", "value": "+12% WoW"}, ...]
}

Every field is required. Use empty arrays/objects when nothing applies.
summary_zh must be written in Chinese regardless of the article language."#;

/// Title + truncated body, the user half of the prompt.
pub fn build_user_prompt(title: &str, body: &str, body_limit: usize) -> String {
    let body = truncate_chars(body, body_limit);
    format!("Title: {title}\n\nArticle body:\n{body}")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "运价上涨".repeat(4000);
        let out = truncate_chars(&text, DEFAULT_BODY_LIMIT);
        assert!(out.len() <= DEFAULT_BODY_LIMIT);
        assert!(out.chars().count() > 0);
    }

    #[test]
    fn prompt_contains_title_and_body() {
        let prompt = build_user_prompt("Rates surge", "Body text.", 8000);
        assert!(prompt.contains("Rates surge"));
        assert!(prompt.contains("Body text."));
    }
}
