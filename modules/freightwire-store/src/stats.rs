use chrono::{Duration, Utc};
use freightwire_common::{FreightError, Result};
use serde::Serialize;

use crate::Store;

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceArticleCount {
    pub source_id: String,
    pub count: i64,
}

/// Aggregate analytics for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewStats {
    pub total_articles: i64,
    pub articles_last_24h: i64,
    pub by_status: Vec<StatusCount>,
    pub top_sources: Vec<SourceArticleCount>,
    pub fetches_last_24h: i64,
    pub found_last_24h: i64,
    pub new_last_24h: i64,
    pub dedup_last_24h: i64,
}

impl Store {
    pub async fn overview_stats(&self) -> Result<OverviewStats> {
        let since = Utc::now() - Duration::hours(24);

        let total_articles =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
                .fetch_one(&self.pool)
                .await
                .map_err(FreightError::store)?;

        let articles_last_24h = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM articles WHERE fetched_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)?;

        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT processing_status, COUNT(*) FROM articles GROUP BY processing_status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;

        let top_sources: Vec<(String, i64)> = sqlx::query_as(
            "SELECT source_id, COUNT(*) AS n FROM articles \
             GROUP BY source_id ORDER BY n DESC LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;

        let fetch_totals: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(articles_found), 0)::BIGINT,
                   COALESCE(SUM(articles_new), 0)::BIGINT,
                   COALESCE(SUM(articles_dedup), 0)::BIGINT
            FROM fetch_logs WHERE started_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)?;

        Ok(OverviewStats {
            total_articles,
            articles_last_24h,
            by_status: by_status
                .into_iter()
                .map(|(status, count)| StatusCount { status, count })
                .collect(),
            top_sources: top_sources
                .into_iter()
                .map(|(source_id, count)| SourceArticleCount { source_id, count })
                .collect(),
            fetches_last_24h: fetch_totals.0,
            found_last_24h: fetch_totals.1,
            new_last_24h: fetch_totals.2,
            dedup_last_24h: fetch_totals.3,
        })
    }
}
