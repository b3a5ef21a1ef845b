//! Fileflow Worker Library
//!
//! Task queue (FIFO list plus a key/value progress map on one shared store) and the
//! worker loop that drains it.

pub mod context;
pub mod queue;
pub mod worker;

pub use context::{TaskHandler, TaskOutcome};
pub use queue::{MemoryQueueBackend, PgQueueBackend, QueueBackend, QueueError, TaskQueue};
#[cfg(feature = "redis-queue")]
pub use queue::RedisQueueBackend;
pub use worker::{Tick, WorkerHandle, WorkerLoop, WorkerLoopConfig};
