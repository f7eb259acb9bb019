//! Key/value storage behind the response cache and conversation history.
//!
//! Redis is preferred when reachable at startup; the in-process
//! [`MemoryStore`] stands in for it otherwise and absorbs cache writes
//! whenever a Redis call fails.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

mod cache;
mod memory;
mod redis_store;
mod sessions;

pub use cache::Cache;
pub use memory::MemoryStore;
pub use redis_store::connect;
pub use sessions::{SessionStore, Turn};

/// The subset of Redis commands the agent relies on.
#[async_trait]
pub trait KvStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// SET, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// RPUSH a single element.
    async fn push(&self, key: &str, value: String) -> Result<()>;

    /// LRANGE 0 -1.
    async fn range(&self, key: &str) -> Result<Vec<String>>;

    /// EXPIRE, or PERSIST when `ttl` is `None`.
    async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
