use chrono::{DateTime, Utc};
use freightwire_common::{
    CandidateStatus, DiscoveryMethod, FreightError, Result, SamplePreview, SourceCandidate,
    ValidationDetails,
};
use uuid::Uuid;

use crate::rows::parse_col;
use crate::Store;

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    candidate_id: Uuid,
    url: String,
    feed_url: Option<String>,
    kind: String,
    discovery_method: String,
    discovery_query: Option<String>,
    status: String,
    quality_score: f64,
    relevance_score: f64,
    combined_score: f64,
    sample_articles: serde_json::Value,
    validation: Option<serde_json::Value>,
    auto_approved: bool,
    created_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
}

impl CandidateRow {
    fn into_candidate(self) -> Result<SourceCandidate> {
        let sample_articles: Vec<SamplePreview> =
            serde_json::from_value(self.sample_articles).unwrap_or_default();
        let validation: Option<ValidationDetails> = self
            .validation
            .and_then(|v| serde_json::from_value(v).ok());
        Ok(SourceCandidate {
            candidate_id: self.candidate_id,
            url: self.url,
            feed_url: self.feed_url,
            kind: parse_col("kind", &self.kind)?,
            discovery_method: parse_col("discovery_method", &self.discovery_method)?,
            discovery_query: self.discovery_query,
            status: parse_col("status", &self.status)?,
            quality_score: self.quality_score,
            relevance_score: self.relevance_score,
            combined_score: self.combined_score,
            sample_articles,
            validation,
            auto_approved: self.auto_approved,
            created_at: self.created_at,
            validated_at: self.validated_at,
        })
    }
}

const CANDIDATE_COLS: &str = "candidate_id, url, feed_url, kind, discovery_method, \
     discovery_query, status, quality_score, relevance_score, combined_score, \
     sample_articles, validation, auto_approved, created_at, validated_at";

impl Store {
    /// Persist a newly discovered URL. Domain-unique: the second candidate on
    /// a domain is silently dropped. Returns whether a row was created.
    pub async fn insert_candidate(
        &self,
        url: &str,
        domain: &str,
        method: DiscoveryMethod,
        query: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO source_candidates (url, domain, discovery_method, discovery_query)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (domain) DO NOTHING
            "#,
        )
        .bind(url)
        .bind(domain)
        .bind(method.as_str())
        .bind(query)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }

    /// Atomically claim up to `limit` discovered candidates for validation.
    pub async fn claim_candidates_for_validation(
        &self,
        limit: i64,
    ) -> Result<Vec<SourceCandidate>> {
        let rows = sqlx::query_as::<_, CandidateRow>(&format!(
            r#"
            UPDATE source_candidates SET status = 'validating'
            WHERE candidate_id IN (
                SELECT candidate_id FROM source_candidates
                WHERE status = 'discovered'
                ORDER BY created_at ASC
                LIMIT $1
            )
            RETURNING {CANDIDATE_COLS}
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;

        rows.into_iter().map(CandidateRow::into_candidate).collect()
    }

    /// Write the validator's verdict back onto the candidate row.
    pub async fn record_validation(&self, c: &SourceCandidate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_candidates SET
                feed_url = $2, kind = $3, status = $4, quality_score = $5,
                relevance_score = $6, combined_score = $7, sample_articles = $8,
                validation = $9, auto_approved = $10, validated_at = now()
            WHERE candidate_id = $1
            "#,
        )
        .bind(c.candidate_id)
        .bind(&c.feed_url)
        .bind(c.kind.as_str())
        .bind(c.status.as_str())
        .bind(c.quality_score)
        .bind(c.relevance_score)
        .bind(c.combined_score)
        .bind(serde_json::to_value(&c.sample_articles).unwrap_or_default())
        .bind(c.validation.as_ref().map(|v| serde_json::to_value(v).unwrap_or_default()))
        .bind(c.auto_approved)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }

    pub async fn get_candidate(&self, id: Uuid) -> Result<Option<SourceCandidate>> {
        let row = sqlx::query_as::<_, CandidateRow>(&format!(
            "SELECT {CANDIDATE_COLS} FROM source_candidates WHERE candidate_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FreightError::store)?;
        row.map(CandidateRow::into_candidate).transpose()
    }

    pub async fn list_candidates(
        &self,
        status: Option<CandidateStatus>,
        limit: i64,
    ) -> Result<Vec<SourceCandidate>> {
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, CandidateRow>(&format!(
                    "SELECT {CANDIDATE_COLS} FROM source_candidates WHERE status = $1 \
                     ORDER BY combined_score DESC, created_at DESC LIMIT $2"
                ))
                .bind(s.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, CandidateRow>(&format!(
                    "SELECT {CANDIDATE_COLS} FROM source_candidates \
                     ORDER BY combined_score DESC, created_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(FreightError::store)?;

        rows.into_iter().map(CandidateRow::into_candidate).collect()
    }

    pub async fn set_candidate_status(
        &self,
        id: Uuid,
        status: CandidateStatus,
        auto_approved: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE source_candidates SET status = $2, auto_approved = $3 \
             WHERE candidate_id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(auto_approved)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }

    /// True when a domain already has a candidate or a live source.
    pub async fn domain_known(&self, domain: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT (SELECT COUNT(*) FROM source_candidates WHERE domain = $1)
                 + (SELECT COUNT(*) FROM sources WHERE url LIKE '%' || $1 || '%')
            "#,
        )
        .bind(domain)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(count > 0)
    }
}

