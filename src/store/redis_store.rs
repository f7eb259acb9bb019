use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};
use tracing::{info, warn};

use super::KvStore;
use crate::config::Config;
use crate::error::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Open a managed connection and confirm it with PING.
    pub async fn open(info: impl IntoConnectionInfo) -> Result<RedisStore> {
        let client = redis::Client::open(info)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(RedisStore { conn })
    }
}

fn host_info(config: &Config) -> ConnectionInfo {
    let password = (!config.redis_password.is_empty()).then(|| config.redis_password.clone());
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.redis_host.clone(), config.redis_port),
        redis: RedisConnectionInfo {
            db: config.redis_db,
            password,
            ..Default::default()
        },
    }
}

async fn try_open(info: impl IntoConnectionInfo) -> std::result::Result<RedisStore, String> {
    match tokio::time::timeout(CONNECT_TIMEOUT, RedisStore::open(info)).await {
        Ok(Ok(store)) => Ok(store),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", CONNECT_TIMEOUT)),
    }
}

/// Connect via `redis_url`, then via host/port/db. `None` when neither answers.
pub async fn connect(config: &Config) -> Option<RedisStore> {
    if !config.redis_url.is_empty() {
        match try_open(config.redis_url.as_str()).await {
            Ok(store) => {
                info!("connected to redis via REDIS_URL");
                return Some(store);
            }
            Err(e) => warn!(error = %e, "redis url connection failed"),
        }
    }

    match try_open(host_info(config)).await {
        Ok(store) => {
            info!(
                host = %config.redis_host,
                port = config.redis_port,
                db = config.redis_db,
                password = if config.redis_password.is_empty() { "no" } else { "yes" },
                "connected to redis"
            );
            Some(store)
        }
        Err(e) => {
            warn!(error = %e, "redis host/port connection failed; using in-memory store");
            None
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn push(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
                conn.expire::<_, ()>(key, secs).await?
            }
            None => conn.persist::<_, ()>(key).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_info_carries_password_verbatim() {
        let mut cfg = Config::default();
        let info = host_info(&cfg);
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".into(), 6379));
        assert_eq!(info.redis.password, None);
        assert_eq!(info.redis.db, 0);

        cfg.redis_password = "p@ss:w/rd".into();
        cfg.redis_db = 2;
        let info = host_info(&cfg);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss:w/rd"));
        assert_eq!(info.redis.db, 2);
    }
}
