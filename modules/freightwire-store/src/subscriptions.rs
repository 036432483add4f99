use chrono::{DateTime, Utc};
use freightwire_common::{
    FreightError, Result, Subscription, SubscriptionFilter,
};
use uuid::Uuid;

use crate::rows::parse_col;
use crate::Store;

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    name: String,
    filter: serde_json::Value,
    channel: String,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    frequency: String,
    enabled: bool,
    created_at: DateTime<Utc>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription> {
        let filter: SubscriptionFilter =
            serde_json::from_value(self.filter).unwrap_or_default();
        Ok(Subscription {
            id: self.id,
            name: self.name,
            filter,
            channel: parse_col("channel", &self.channel)?,
            webhook_url: self.webhook_url,
            webhook_secret: self.webhook_secret,
            frequency: parse_col("frequency", &self.frequency)?,
            enabled: self.enabled,
            created_at: self.created_at,
        })
    }
}

impl Store {
    pub async fn create_subscription(&self, sub: &Subscription) -> Result<Uuid> {
        sub.validate_channel().map_err(FreightError::Validation)?;
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO subscriptions
                (name, filter, channel, webhook_url, webhook_secret, frequency, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&sub.name)
        .bind(serde_json::to_value(&sub.filter).unwrap_or_default())
        .bind(sub.channel.as_str())
        .bind(&sub.webhook_url)
        .bind(&sub.webhook_secret)
        .bind(sub.frequency.as_str())
        .bind(sub.enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(FreightError::store)
    }

    pub async fn update_subscription(&self, sub: &Subscription) -> Result<bool> {
        sub.validate_channel().map_err(FreightError::Validation)?;
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                name = $2, filter = $3, channel = $4, webhook_url = $5,
                webhook_secret = $6, frequency = $7, enabled = $8
            WHERE id = $1
            "#,
        )
        .bind(sub.id)
        .bind(&sub.name)
        .bind(serde_json::to_value(&sub.filter).unwrap_or_default())
        .bind(sub.channel.as_str())
        .bind(&sub.webhook_url)
        .bind(&sub.webhook_secret)
        .bind(sub.frequency.as_str())
        .bind(sub.enabled)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_subscription(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(FreightError::store)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FreightError::store)?;
        row.map(SubscriptionRow::into_subscription).transpose()
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;
        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }

    /// The dispatcher's webhook fan-out set.
    pub async fn list_realtime_webhook_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions \
             WHERE enabled AND channel = 'webhook' AND frequency = 'realtime'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(FreightError::store)?;
        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }

    pub async fn insert_webhook_log(
        &self,
        subscription_id: Uuid,
        article_id: Uuid,
        attempt: i32,
        http_status: Option<i32>,
        latency_ms: i64,
        error: Option<&str>,
        success: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_delivery_logs
                (subscription_id, article_id, attempt, http_status, latency_ms, error, success)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(subscription_id)
        .bind(article_id)
        .bind(attempt)
        .bind(http_status)
        .bind(latency_ms)
        .bind(error)
        .bind(success)
        .execute(&self.pool)
        .await
        .map_err(FreightError::store)?;
        Ok(())
    }
}
