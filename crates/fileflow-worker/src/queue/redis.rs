//! Redis queue backend
//!
//! Feature-gated behind `redis-queue`. Lists map to Redis lists (`LPUSH`/`RPOP`),
//! values to plain string keys with `PX` expiry. Redis expires keys itself, so
//! `purge_expired` has nothing to do.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};

use super::backend::QueueBackend;
use super::error::QueueError;

const KEY_PREFIX: &str = "fileflow:";
const LIST_PREFIX: &str = "fileflow:queue:";

#[derive(Clone)]
pub struct RedisQueueBackend {
    pool: Pool,
}

impl RedisQueueBackend {
    pub async fn new(redis_url: &str) -> Result<Self, QueueError> {
        let sanitized_url = sanitize_redis_url(redis_url);

        let mut config = Config::from_url(redis_url);
        config.pool = Some(deadpool_redis::PoolConfig {
            max_size: 32,
            timeouts: deadpool_redis::Timeouts {
                wait: Some(Duration::from_secs(5)),
                create: Some(Duration::from_secs(5)),
                recycle: Some(Duration::from_secs(5)),
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            QueueError::Connection(format!(
                "Failed to create Redis pool for {sanitized_url}: {e}"
            ))
        })?;

        let mut conn = pool.get().await.map_err(|e| {
            QueueError::Connection(format!(
                "Failed to get Redis connection from pool for {sanitized_url}: {e}"
            ))
        })?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                QueueError::Connection(format!("Redis PING failed for {sanitized_url}: {e}"))
            })?;

        tracing::debug!(url = %sanitized_url, "Redis queue backend connected");

        Ok(Self { pool })
    }

    fn list_key(queue: &str) -> String {
        format!("{LIST_PREFIX}{queue}")
    }

    fn value_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        deadpool_redis::redis::cmd("LPUSH")
            .arg(Self::list_key(queue))
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.pool.get().await?;
        let item = deadpool_redis::redis::cmd("RPOP")
            .arg(Self::list_key(queue))
            .query_async::<Option<String>>(&mut conn)
            .await?;
        Ok(item)
    }

    async fn set_value(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        let mut cmd = deadpool_redis::redis::cmd("SET");
        cmd.arg(Self::value_key(key)).arg(value);
        if let Some(ttl) = ttl {
            // PX 0 is rejected by Redis
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.pool.get().await?;
        let value = deadpool_redis::redis::cmd("GET")
            .arg(Self::value_key(key))
            .query_async::<Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn len(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.pool.get().await?;
        let len = deadpool_redis::redis::cmd("LLEN")
            .arg(Self::list_key(queue))
            .query_async::<u64>(&mut conn)
            .await?;
        Ok(len)
    }

    async fn purge_expired(&self) -> Result<u64, QueueError> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Sanitize Redis URL for logging (removes password)
fn sanitize_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
        if let Some(colon_pos) = url[scheme_end..at_pos].find(':') {
            let abs_colon = scheme_end + colon_pos;
            let prefix = &url[..abs_colon + 1];
            let suffix = &url[at_pos..];
            return format!("{prefix}***{suffix}");
        }
    }
    url.to_string()
}
