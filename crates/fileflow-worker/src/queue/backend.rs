//! Queue backend trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::QueueError;

/// Shared store behind the task queue: named FIFO lists of JSON payloads and a
/// key/value map with optional expiry.
///
/// # Delivery
///
/// `pop` must hand each item to exactly one caller even with many concurrent
/// consumers. An item popped by a consumer that then crashes is lost.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a payload to the tail of `queue`.
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError>;

    /// Remove and return the head of `queue`, or `None` if it is empty. Never blocks.
    async fn pop(&self, queue: &str) -> Result<Option<String>, QueueError>;

    /// Upsert a value. With `ttl` the entry expires that long after this write.
    async fn set_value(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), QueueError>;

    /// Read a value; expired entries read as `None`.
    async fn get_value(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Number of items waiting in `queue`.
    async fn len(&self, queue: &str) -> Result<u64, QueueError>;

    /// Physically delete expired entries. Returns how many were removed. Backends
    /// with native expiry return 0.
    async fn purge_expired(&self) -> Result<u64, QueueError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), QueueError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
