use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::KvStore;
use crate::error::{AgentError, Result};

#[derive(Debug, Clone)]
enum Slot {
    Value(String),
    List(Vec<String>),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Writes sweep expired keys at most this often.
const SWEEP_EVERY: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, Entry>,
    last_sweep: Option<Instant>,
}

impl Inner {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.map.get(key).is_some_and(|e| e.expired(now)) {
            self.map.remove(key);
        }
        self.map.get_mut(key)
    }

    fn sweep(&mut self, now: Instant) {
        if self.last_sweep.is_some_and(|at| now.duration_since(at) < SWEEP_EVERY) {
            return;
        }
        self.map.retain(|_, e| !e.expired(now));
        self.last_sweep = Some(now);
    }
}

/// In-process TTL map. Expired keys vanish on access and are swept on writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live<R>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> R) -> R {
        let mut inner = self.inner.lock();
        f(inner.live(key, Instant::now()))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_live(key, |entry| match entry {
            Some(Entry {
                slot: Slot::Value(v),
                ..
            }) => Some(v.clone()),
            _ => None,
        }))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.sweep(now);
        inner.map.insert(
            key.to_string(),
            Entry {
                slot: Slot::Value(value),
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(())
    }

    async fn push(&self, key: &str, value: String) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.sweep(now);
        if inner.live(key, now).is_none() {
            inner.map.insert(
                key.to_string(),
                Entry {
                    slot: Slot::List(Vec::new()),
                    expires_at: None,
                },
            );
        }
        match inner.map.get_mut(key) {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => {
                items.push(value);
                Ok(())
            }
            _ => Err(AgentError::WrongType(key.to_string())),
        }
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.with_live(key, |entry| match entry {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => items.clone(),
            _ => Vec::new(),
        }))
    }

    async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<()> {
        self.with_live(key, |entry| {
            if let Some(entry) = entry {
                entry.expires_at = ttl.map(|t| Instant::now() + t);
            }
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().map.remove(key);
        Ok(())
    }
}
