//! PostgreSQL queue backend
//!
//! Lists live in `queue_items`, values in `queue_kv` (see `migrations/`). Pop uses
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never receive the same item.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::backend::QueueBackend;
use super::error::QueueError;

#[derive(Clone)]
pub struct PgQueueBackend {
    pool: PgPool,
}

impl PgQueueBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueBackend for PgQueueBackend {
    #[tracing::instrument(skip(self, payload))]
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO queue_items (queue_name, payload) VALUES ($1, $2::jsonb)")
            .bind(queue)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn pop(&self, queue: &str) -> Result<Option<String>, QueueError> {
        let payload: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM queue_items
            WHERE id = (
                SELECT id FROM queue_items
                WHERE queue_name = $1
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING payload::text
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payload)
    }

    #[tracing::instrument(skip(self, value))]
    async fn set_value(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), QueueError> {
        let expires_at = match ttl {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl)
                        .map_err(|e| QueueError::Config(format!("Invalid TTL: {}", e)))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO queue_kv (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_value(&self, key: &str) -> Result<Option<String>, QueueError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM queue_kv WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn len(&self, queue: &str) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue_name = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    #[tracing::instrument(skip(self))]
    async fn purge_expired(&self) -> Result<u64, QueueError> {
        let result = sqlx::query("DELETE FROM queue_kv WHERE expires_at IS NOT NULL AND expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
