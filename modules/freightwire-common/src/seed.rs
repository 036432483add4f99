use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::{Language, ParserConfig, SourceKind};

/// TOML-backed source seeding. Secrets stay in env vars; this file describes
/// what to collect, not how to authenticate to the platform itself.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesFile {
    #[serde(default)]
    pub sources: Vec<SeedSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedSource {
    pub source_id: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub language: Option<Language>,
    #[serde(default = "default_interval")]
    pub fetch_interval_minutes: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub parser: Option<ParserConfig>,
}

fn default_interval() -> u32 {
    60
}

fn default_enabled() -> bool {
    true
}

/// Discovery inputs: search queries and seed industry pages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedsFile {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub seed_urls: Vec<String>,
}

pub fn load_sources(path: &Path) -> Result<SourcesFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {}", path.display()))?;
    let parsed: SourcesFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse sources file: {}", path.display()))?;
    Ok(parsed)
}

pub fn load_seeds(path: &Path) -> Result<SeedsFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seeds file: {}", path.display()))?;
    let parsed: SeedsFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse seeds file: {}", path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_file_parses_minimal_entry() {
        let toml = r#"
            [[sources]]
            source_id = "loadstar"
            name = "The Loadstar"
            kind = "feed"
            url = "https://theloadstar.com/feed"
            language = "en"
        "#;
        let parsed: SourcesFile = toml::from_str(toml).unwrap();
        assert_eq!(parsed.sources.len(), 1);
        let s = &parsed.sources[0];
        assert_eq!(s.kind, SourceKind::Feed);
        assert_eq!(s.fetch_interval_minutes, 60);
        assert!(s.enabled);
        assert!(s.parser.is_none());
    }

    #[test]
    fn seeds_file_defaults_empty() {
        let parsed: SeedsFile = toml::from_str("").unwrap();
        assert!(parsed.queries.is_empty());
        assert!(parsed.seed_urls.is_empty());
    }
}
