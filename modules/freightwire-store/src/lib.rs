//! Postgres persistence: articles + fingerprints, full-text and vector
//! retrieval, sources, fetch logs, discovery candidates, subscriptions,
//! delivery logs, and API keys.

mod api_keys;
mod articles;
mod candidates;
mod fetch_logs;
mod rows;
mod sources;
mod stats;
mod subscriptions;

pub use articles::{ArticleQuery, FingerprintRow, NewArticle, ScoredArticle};
pub use fetch_logs::FetchWindowStats;
pub use stats::{OverviewStats, SourceArticleCount, StatusCount};

use freightwire_common::{FreightError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(FreightError::store)?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
