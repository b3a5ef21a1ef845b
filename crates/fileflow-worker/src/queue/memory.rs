//! In-memory queue backend
//!
//! Process-local FIFO lists and an expiring key/value map. Clones share state, so one
//! backend can feed the pipeline and several worker instances in the same process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::QueueBackend;
use super::error::QueueError;

struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    values: HashMap<String, ValueEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryQueueBackend {
    state: Arc<Mutex<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a connection error until cleared. Used to
    /// exercise the unavailable-store paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Connection(
                "memory queue marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(queue.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.lists.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn set_value(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), QueueError> {
        self.check_available()?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut state = self.state.lock().await;
        state
            .values
            .insert(key.to_string(), ValueEntry { value, expires_at });
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, QueueError> {
        self.check_available()?;
        let now = Instant::now();
        let state = self.state.lock().await;
        Ok(state
            .values
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn len(&self, queue: &str) -> Result<u64, QueueError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.lists.get(queue).map_or(0, |list| list.len() as u64))
    }

    async fn purge_expired(&self) -> Result<u64, QueueError> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let before = state.values.len();
        state.values.retain(|_, entry| !entry.is_expired(now));
        Ok((before - state.values.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.check_available()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
