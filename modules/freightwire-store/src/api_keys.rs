use chrono::{DateTime, Utc};
use freightwire_common::{ApiKey, ApiRole, FreightError, Result};
use uuid::Uuid;

use crate::rows::parse_col;
use crate::Store;

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    name: String,
    key_hash: String,
    role: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_key(self) -> Result<ApiKey> {
        Ok(ApiKey {
            id: self.id,
            name: self.name,
            key_hash: self.key_hash,
            role: parse_col("role", &self.role)?,
            enabled: self.enabled,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

impl Store {
    pub async fn insert_api_key(
        &self,
        name: &str,
        key_hash: &str,
        role: ApiRole,
    ) -> Result<ApiKey> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            INSERT INTO api_keys (name, key_hash, role)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(key_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)?;
        row.into_key()
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT * FROM api_keys ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;
        rows.into_iter().map(ApiKeyRow::into_key).collect()
    }

    /// Whether any key exists at all. While empty, the API runs open.
    pub async fn any_api_keys(&self) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(count > 0)
    }

    pub async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND enabled",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(FreightError::store)?;
        row.map(ApiKeyRow::into_key).transpose()
    }

    pub async fn touch_api_key(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(())
    }

    pub async fn delete_api_key(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }
}
