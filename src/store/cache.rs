use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{KvStore, MemoryStore};

/// JSON response cache. Reads and writes go to Redis when connected and fall
/// back to process memory on any Redis failure; errors never reach callers.
pub struct Cache {
    primary: Option<Arc<dyn KvStore>>,
    local: MemoryStore,
}

impl Cache {
    pub fn new(primary: Option<Arc<dyn KvStore>>) -> Self {
        Cache {
            primary,
            local: MemoryStore::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn backend(&self) -> &'static str {
        self.primary.as_ref().map_or("memory", |p| p.name())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match &self.primary {
            Some(primary) => match primary.get(key).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(key, error = %e, "[cache] redis get failed, reading memory");
                    self.local.get(key).await.ok().flatten()
                }
            },
            None => self.local.get(key).await.ok().flatten(),
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "[cache] ignoring undecodable entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "[cache] value not serializable");
                return;
            }
        };

        if let Some(primary) = &self.primary {
            match primary.set(key, raw.clone(), Some(ttl)).await {
                Ok(()) => return,
                Err(e) => warn!(key, error = %e, "[cache] redis set failed, writing memory"),
            }
        }
        let _ = self.local.set(key, raw, Some(ttl)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Result};
    use async_trait::async_trait;

    struct Broken;

    #[async_trait]
    impl KvStore for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(AgentError::NotConfigured("redis"))
        }
        async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<()> {
            Err(AgentError::NotConfigured("redis"))
        }
        async fn push(&self, _: &str, _: String) -> Result<()> {
            Err(AgentError::NotConfigured("redis"))
        }
        async fn range(&self, _: &str) -> Result<Vec<String>> {
            Err(AgentError::NotConfigured("redis"))
        }
        async fn expire(&self, _: &str, _: Option<Duration>) -> Result<()> {
            Err(AgentError::NotConfigured("redis"))
        }
        async fn delete(&self, _: &str) -> Result<()> {
            Err(AgentError::NotConfigured("redis"))
        }
    }

    #[tokio::test]
    async fn round_trips_json_in_memory() {
        let cache = Cache::in_memory();
        cache
            .set_json("news:coindesk:5", &vec!["a", "b"], Duration::from_secs(60))
            .await;
        let got: Option<Vec<String>> = cache.get_json("news:coindesk:5").await;
        assert_eq!(got, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(cache.backend(), "memory");
    }

    #[tokio::test]
    async fn failing_redis_falls_back_to_memory() {
        let cache = Cache::new(Some(Arc::new(Broken)));
        cache.set_json("price:bitcoin:usd", &42.5f64, Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<f64>("price:bitcoin:usd").await, Some(42.5));
    }

    #[tokio::test]
    async fn wrong_shape_reads_as_missing() {
        let cache = Cache::in_memory();
        cache.set_json("trending", &"not a list", Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Vec<u32>>("trending").await, None);
    }
}
