use chrono::{DateTime, Utc};
use freightwire_common::{
    Enrichment, FreightError, Language, Result, Sentiment, TransportMode, Urgency,
};
use pgvector::Vector;
use sqlx::{FromRow, QueryBuilder, Row};
use uuid::Uuid;

use crate::rows::{encode_minhash, ArticleRow, ARTICLE_COLS};
use crate::Store;

/// Everything known about an article at insert time, before enrichment.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_id: String,
    /// Already canonicalized.
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub body_markdown: Option<String>,
    pub language: Option<Language>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub title_simhash: u64,
    pub content_minhash: Vec<u64>,
}

/// Persisted fingerprints, read in bulk for LSH warmup.
#[derive(Debug, Clone)]
pub struct FingerprintRow {
    pub id: Uuid,
    pub title_simhash: u64,
    pub content_minhash: Vec<u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredArticle {
    pub article: freightwire_common::Article,
    pub similarity: f64,
}

/// Filters for the article list endpoint. Page is 1-based.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub source_id: Option<String>,
    pub transport_mode: Option<TransportMode>,
    pub topic: Option<String>,
    pub language: Option<Language>,
    pub sentiment: Option<Sentiment>,
    pub urgency: Option<Urgency>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl ArticleQuery {
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 200) as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit()
    }
}

impl Store {
    /// Insert-if-absent on the canonical URL. `None` means the unique index
    /// already holds this URL — the serialization point for dedup races.
    pub async fn insert_article_if_absent(&self, a: &NewArticle) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO articles
                (source_id, url, title, body_text, body_markdown, language, author,
                 published_at, title_simhash, content_minhash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&a.source_id)
        .bind(&a.url)
        .bind(&a.title)
        .bind(&a.body_text)
        .bind(&a.body_markdown)
        .bind(a.language.map(|l| l.as_str()))
        .bind(&a.author)
        .bind(a.published_at)
        .bind(a.title_simhash as i64)
        .bind(encode_minhash(&a.content_minhash))
        .fetch_optional(&self.pool)
        .await
        .map_err(FreightError::store)?;

        Ok(id)
    }

    pub async fn find_article_id_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM articles WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(FreightError::store)
    }

    pub async fn get_article(&self, id: Uuid) -> Result<Option<freightwire_common::Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FreightError::store)?;

        row.map(ArticleRow::into_article).transpose()
    }

    pub async fn list_articles(
        &self,
        q: &ArticleQuery,
    ) -> Result<Vec<freightwire_common::Article>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ARTICLE_COLS} FROM articles WHERE TRUE"
        ));

        if let Some(source_id) = &q.source_id {
            qb.push(" AND source_id = ");
            qb.push_bind(source_id.clone());
        }
        if let Some(mode) = q.transport_mode {
            qb.push(" AND ");
            qb.push_bind(mode.as_str());
            qb.push(" = ANY(transport_modes)");
        }
        if let Some(topic) = &q.topic {
            qb.push(" AND (primary_topic = ");
            qb.push_bind(topic.clone());
            qb.push(" OR ");
            qb.push_bind(topic.clone());
            qb.push(" = ANY(secondary_topics))");
        }
        if let Some(language) = q.language {
            qb.push(" AND language = ");
            qb.push_bind(language.as_str());
        }
        if let Some(sentiment) = q.sentiment {
            qb.push(" AND sentiment = ");
            qb.push_bind(sentiment.as_str());
        }
        if let Some(urgency) = q.urgency {
            qb.push(" AND urgency = ");
            qb.push_bind(urgency.as_str());
        }
        if let Some(from) = q.from_date {
            qb.push(" AND published_at >= ");
            qb.push_bind(from);
        }
        if let Some(to) = q.to_date {
            qb.push(" AND published_at <= ");
            qb.push_bind(to);
        }
        if let Some(search) = &q.search {
            qb.push(
                " AND to_tsvector('english', title || ' ' || body_text) \
                 @@ websearch_to_tsquery('english', ",
            );
            qb.push_bind(search.clone());
            qb.push(")");
        }

        qb.push(" ORDER BY published_at DESC NULLS LAST, fetched_at DESC LIMIT ");
        qb.push_bind(q.limit());
        qb.push(" OFFSET ");
        qb.push_bind(q.offset());

        let rows: Vec<ArticleRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(FreightError::store)?;

        rows.into_iter().map(ArticleRow::into_article).collect()
    }

    /// Compare-and-set `pending -> processing`. False when another worker got
    /// there first or the article already finished.
    pub async fn begin_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE articles SET processing_status = 'processing' \
             WHERE id = $1 AND processing_status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_enrichment_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE articles SET processing_status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(())
    }

    /// Operator retry: `failed -> pending`. Never automatic.
    pub async fn reset_failed_to_pending(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE articles SET processing_status = 'pending' \
             WHERE id = $1 AND processing_status = 'failed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }

    /// One-shot enrichment write: all analysis fields, the embedding, and the
    /// terminal status transition.
    pub async fn apply_enrichment(
        &self,
        id: Uuid,
        e: &Enrichment,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let modes: Vec<String> = e.transport_modes.iter().map(|m| m.to_string()).collect();
        sqlx::query(
            r#"
            UPDATE articles SET
                summary_en = $2, summary_zh = $3, transport_modes = $4,
                primary_topic = $5, secondary_topics = $6, content_type = $7,
                regions = $8, entities = $9, sentiment = $10, market_impact = $11,
                urgency = $12, key_metrics = $13, embedding = $14,
                llm_processed = TRUE, processing_status = 'completed'
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&e.summary_en)
        .bind(&e.summary_zh)
        .bind(&modes)
        .bind(&e.primary_topic)
        .bind(&e.secondary_topics)
        .bind(&e.content_type)
        .bind(&e.regions)
        .bind(serde_json::to_value(&e.entities).unwrap_or_default())
        .bind(e.sentiment.as_str())
        .bind(e.market_impact.as_str())
        .bind(e.urgency.as_str())
        .bind(serde_json::to_value(&e.key_metrics).unwrap_or_default())
        .bind(Vector::from(embedding))
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }

    /// Backstop feed: ids still pending enrichment, oldest first.
    pub async fn pending_article_ids(&self, limit: i64) -> Result<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM articles WHERE processing_status = 'pending' \
             ORDER BY fetched_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)
    }

    /// Batch fingerprint read for LSH warmup.
    pub async fn all_fingerprints(&self) -> Result<Vec<FingerprintRow>> {
        let rows = sqlx::query(
            "SELECT id, title_simhash, content_minhash FROM articles \
             WHERE content_minhash IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let simhash: i64 = row.get("title_simhash");
                let bytes: Vec<u8> = row.get("content_minhash");
                FingerprintRow {
                    id: row.get("id"),
                    title_simhash: simhash as u64,
                    content_minhash: crate::rows::decode_minhash(&bytes),
                }
            })
            .collect())
    }

    /// Cosine-similarity search over the HNSW index, descending similarity.
    pub async fn semantic_search(
        &self,
        embedding: Vec<f32>,
        limit: i64,
    ) -> Result<Vec<ScoredArticle>> {
        let vector = Vector::from(embedding);
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLS}, 1 - (embedding <=> $1) AS similarity \
             FROM articles WHERE embedding IS NOT NULL \
             ORDER BY embedding <=> $1 LIMIT $2"
        ))
        .bind(vector)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;

        rows.into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                let article = ArticleRow::from_row(&row)
                    .map_err(FreightError::store)?
                    .into_article()?;
                Ok(ScoredArticle {
                    article,
                    similarity,
                })
            })
            .collect()
    }

    /// Nearest neighbors of an existing article's embedding.
    pub async fn related_articles(
        &self,
        id: Uuid,
        limit: i64,
        exclude_same_source: bool,
    ) -> Result<Vec<ScoredArticle>> {
        let source_clause = if exclude_same_source {
            " AND a.source_id != anchor.source_id"
        } else {
            ""
        };
        let sql = format!(
            "WITH anchor AS (
                 SELECT embedding, source_id FROM articles
                 WHERE id = $1 AND embedding IS NOT NULL
             )
             SELECT {cols}, 1 - (a.embedding <=> anchor.embedding) AS similarity
             FROM articles a, anchor
             WHERE a.id != $1 AND a.embedding IS NOT NULL{source_clause}
             ORDER BY a.embedding <=> anchor.embedding
             LIMIT $2",
            cols = ARTICLE_COLS
                .split(", ")
                .map(|c| format!("a.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let rows = sqlx::query(&sql)
            .bind(id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(FreightError::store)?;

        rows.into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                let article = ArticleRow::from_row(&row)
                    .map_err(FreightError::store)?
                    .into_article()?;
                Ok(ScoredArticle {
                    article,
                    similarity,
                })
            })
            .collect()
    }
}
