use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::KvStore;
use crate::error::Result;

const PREFIX: &str = "history:";

/// One exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Turn {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Per-session chat history kept as a list of JSON turns.
pub struct SessionStore {
    store: Arc<dyn KvStore>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// `ttl` of `None` keeps history forever.
    pub fn new(store: Arc<dyn KvStore>, ttl: Option<Duration>) -> Self {
        SessionStore { store, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("{PREFIX}{session_id}")
    }

    pub async fn append(&self, session_id: &str, user: &str, assistant: &str) -> Result<()> {
        let key = Self::key(session_id);
        let turn = serde_json::to_string(&Turn::new(user, assistant))?;
        self.store.push(&key, turn).await?;
        self.store.expire(&key, self.ttl).await
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let raw = self.store.range(&Self::key(session_id)).await?;
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str::<Turn>(item) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!(session_id, error = %e, "[history] skipping undecodable turn");
                    None
                }
            })
            .collect())
    }

    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.store.delete(&Self::key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn appends_in_order_and_clears() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Some(Duration::from_secs(60)));
        sessions.append("acme:ada", "price of btc", "BTC is $1").await.unwrap();
        sessions.append("acme:ada", "and eth?", "ETH is $2").await.unwrap();

        let history = sessions.history("acme:ada").await.unwrap();
        assert_eq!(
            history,
            vec![Turn::new("price of btc", "BTC is $1"), Turn::new("and eth?", "ETH is $2")]
        );
        assert!(sessions.history("someone-else").await.unwrap().is_empty());

        sessions.clear("acme:ada").await.unwrap();
        assert!(sessions.history("acme:ada").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_entries_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.push("history:s", "{not json".into()).await.unwrap();
        store
            .push("history:s", r#"{"user":"hi","assistant":"hello"}"#.into())
            .await
            .unwrap();
        let sessions = SessionStore::new(store, None);
        assert_eq!(sessions.history("s").await.unwrap(), vec![Turn::new("hi", "hello")]);
    }
}
