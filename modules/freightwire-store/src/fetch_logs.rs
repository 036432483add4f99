use chrono::{DateTime, Utc};
use freightwire_common::{FetchLog, FetchStatus, FreightError, Result};
use uuid::Uuid;

use crate::rows::parse_col;
use crate::Store;

/// Aggregates over a source's recent fetch attempts, for health evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchWindowStats {
    pub total: i64,
    pub successes: i64,
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct FetchLogRow {
    id: Uuid,
    source_id: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: String,
    articles_found: i32,
    articles_new: i32,
    articles_dedup: i32,
    error_message: Option<String>,
    duration_ms: Option<i64>,
}

impl FetchLogRow {
    fn into_log(self) -> Result<FetchLog> {
        Ok(FetchLog {
            id: self.id,
            source_id: self.source_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            status: parse_col("status", &self.status)?,
            articles_found: self.articles_found,
            articles_new: self.articles_new,
            articles_dedup: self.articles_dedup,
            error_message: self.error_message,
            duration_ms: self.duration_ms,
        })
    }
}

impl Store {
    /// Open a fetch attempt. The row starts as `failed` so a crash mid-fetch
    /// still counts against the source's health window.
    pub async fn fetch_log_started(&self, source_id: &str) -> Result<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO fetch_logs (source_id) VALUES ($1) RETURNING id",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn fetch_log_complete(
        &self,
        id: Uuid,
        status: FetchStatus,
        articles_found: i32,
        articles_new: i32,
        articles_dedup: i32,
        error_message: Option<&str>,
        duration_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fetch_logs SET
                completed_at = now(), status = $2, articles_found = $3,
                articles_new = $4, articles_dedup = $5, error_message = $6,
                duration_ms = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(articles_found)
        .bind(articles_new)
        .bind(articles_dedup)
        .bind(error_message)
        .bind(duration_ms)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }

    pub async fn list_fetch_logs(
        &self,
        source_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FetchLog>> {
        let rows = match source_id {
            Some(sid) => {
                sqlx::query_as::<_, FetchLogRow>(
                    "SELECT * FROM fetch_logs WHERE source_id = $1 \
                     ORDER BY started_at DESC LIMIT $2",
                )
                .bind(sid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, FetchLogRow>(
                    "SELECT * FROM fetch_logs ORDER BY started_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(FreightError::store)?;

        rows.into_iter().map(FetchLogRow::into_log).collect()
    }

    pub async fn fetch_window_stats(
        &self,
        source_id: &str,
        since: DateTime<Utc>,
    ) -> Result<FetchWindowStats> {
        let row: (i64, i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'success'),
                MAX(started_at) FILTER (WHERE status = 'success')
            FROM fetch_logs
            WHERE source_id = $1 AND started_at >= $2
            "#,
        )
        .bind(source_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)?;

        Ok(FetchWindowStats {
            total: row.0,
            successes: row.1,
            last_success_at: row.2,
        })
    }
}
