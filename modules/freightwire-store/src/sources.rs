use chrono::{DateTime, Utc};
use freightwire_common::seed::SeedSource;
use freightwire_common::{
    FeedConfig, FreightError, HealthState, ParserConfig, Result, Source, SourceKind,
    UniversalConfig,
};

use crate::rows::parse_col;
use crate::Store;

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    source_id: String,
    name: String,
    kind: String,
    url: String,
    language: Option<String>,
    fetch_interval_minutes: i32,
    priority: i32,
    enabled: bool,
    parser_config: serde_json::Value,
    last_fetched_at: Option<DateTime<Utc>>,
    health: String,
    created_at: DateTime<Utc>,
}

impl SourceRow {
    fn into_source(self) -> Result<Source> {
        let kind: SourceKind = parse_col("kind", &self.kind)?;
        let parser = serde_json::from_value(self.parser_config)
            .map_err(|e| FreightError::Store(format!("parser_config: {e}")))?;
        Ok(Source {
            source_id: self.source_id,
            name: self.name,
            kind,
            url: self.url,
            language: self
                .language
                .as_deref()
                .and_then(|l| l.parse().ok()),
            fetch_interval_minutes: self.fetch_interval_minutes.max(1) as u32,
            priority: self.priority,
            enabled: self.enabled,
            parser,
            last_fetched_at: self.last_fetched_at,
            health: parse_col("health", &self.health)?,
            created_at: self.created_at,
        })
    }
}

/// Fill in a parser config when a seed entry omits one. Feed and universal
/// sources have sensible zero-config defaults; api and scraper do not.
pub fn default_parser_for(kind: SourceKind) -> Option<ParserConfig> {
    match kind {
        SourceKind::Feed => Some(ParserConfig::Feed(FeedConfig::default())),
        SourceKind::Universal => Some(ParserConfig::Universal(UniversalConfig::default())),
        SourceKind::Api | SourceKind::Scraper => None,
    }
}

const SOURCE_COLS: &str = "source_id, name, kind, url, language, fetch_interval_minutes, \
     priority, enabled, parser_config, last_fetched_at, health, created_at";

impl Store {
    /// Seed a source from the config file. Identity fields update; runtime
    /// bookkeeping (health, last_fetched_at) is preserved across restarts.
    pub async fn upsert_seed_source(&self, seed: &SeedSource) -> Result<()> {
        let parser = match &seed.parser {
            Some(p) => p.clone(),
            None => default_parser_for(seed.kind).ok_or_else(|| {
                FreightError::Config(format!(
                    "source {} of kind {} requires an explicit parser config",
                    seed.source_id, seed.kind
                ))
            })?,
        };
        if parser.kind() != seed.kind {
            return Err(FreightError::Config(format!(
                "source {}: parser config kind {} does not match source kind {}",
                seed.source_id,
                parser.kind(),
                seed.kind
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO sources
                (source_id, name, kind, url, language, fetch_interval_minutes,
                 priority, enabled, parser_config)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                url = EXCLUDED.url,
                language = EXCLUDED.language,
                fetch_interval_minutes = EXCLUDED.fetch_interval_minutes,
                priority = EXCLUDED.priority,
                enabled = EXCLUDED.enabled,
                parser_config = EXCLUDED.parser_config
            "#,
        )
        .bind(&seed.source_id)
        .bind(&seed.name)
        .bind(seed.kind.as_str())
        .bind(&seed.url)
        .bind(seed.language.map(|l| l.as_str()))
        .bind(seed.fetch_interval_minutes as i32)
        .bind(seed.priority)
        .bind(seed.enabled)
        .bind(serde_json::to_value(&parser).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }

    /// Insert a promoted source. Fails on source_id collision — discovery
    /// retries with a fresh suffix.
    pub async fn insert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources
                (source_id, name, kind, url, language, fetch_interval_minutes,
                 priority, enabled, parser_config, health)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&source.source_id)
        .bind(&source.name)
        .bind(source.kind.as_str())
        .bind(&source.url)
        .bind(source.language.map(|l| l.as_str()))
        .bind(source.fetch_interval_minutes as i32)
        .bind(source.priority)
        .bind(source.enabled)
        .bind(serde_json::to_value(&source.parser).unwrap_or_default())
        .bind(source.health.as_str())
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLS} FROM sources ORDER BY priority DESC, source_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;
        rows.into_iter().map(SourceRow::into_source).collect()
    }

    pub async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLS} FROM sources WHERE enabled ORDER BY priority DESC, source_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;
        rows.into_iter().map(SourceRow::into_source).collect()
    }

    pub async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLS} FROM sources WHERE source_id = $1"
        ))
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FreightError::store)?;
        row.map(SourceRow::into_source).transpose()
    }

    pub async fn source_exists(&self, source_id: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sources WHERE source_id = $1",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(found > 0)
    }

    pub async fn update_source_after_fetch(
        &self,
        source_id: &str,
        fetched_at: DateTime<Utc>,
        health: HealthState,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sources SET last_fetched_at = $2, health = $3 WHERE source_id = $1",
        )
        .bind(source_id)
        .bind(fetched_at)
        .bind(health.as_str())
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }

    pub async fn set_source_enabled(&self, source_id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE sources SET enabled = $2 WHERE source_id = $1")
            .bind(source_id)
            .bind(enabled)
            .execute(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }
}
