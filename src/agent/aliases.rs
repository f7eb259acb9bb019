use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use crate::services::MarketData;
use crate::store::Cache;

const CACHE_KEY: &str = "coin_aliases:v1";
const MARKETS_PAGE: usize = 250;

type AliasMap = HashMap<String, String>;

/// Symbol/name/id lookup for CoinGecko coin ids.
pub struct AliasIndex {
    market: Arc<dyn MarketData>,
    cache: Arc<Cache>,
    ttl: Duration,
    local: RwLock<Option<(Instant, Arc<AliasMap>)>>,
    rebuild: Mutex<()>,
}

fn insert_coin(aliases: &mut AliasMap, id: &str, symbol: &str, name: &str) {
    let id = id.trim().to_lowercase();
    if id.is_empty() {
        return;
    }
    for key in [symbol.trim().to_lowercase(), name.trim().to_lowercase(), id.clone()] {
        if !key.is_empty() {
            aliases.entry(key).or_insert_with(|| id.clone());
        }
    }
}

impl AliasIndex {
    pub fn new(market: Arc<dyn MarketData>, cache: Arc<Cache>, ttl: Duration) -> Self {
        AliasIndex {
            market,
            cache,
            ttl,
            local: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    async fn fetch(&self) -> AliasMap {
        let (markets, list) = futures::join!(self.market.markets(MARKETS_PAGE), self.market.coin_list());
        let mut aliases = AliasMap::new();

        // market-cap order first so major coins claim shared symbols
        match markets {
            Ok(coins) => {
                for c in &coins {
                    insert_coin(&mut aliases, &c.id, &c.symbol, &c.name);
                }
            }
            Err(e) => error!(error = %e, "[aliases] markets fetch failed"),
        }
        match list {
            Ok(coins) => {
                for c in &coins {
                    insert_coin(&mut aliases, &c.id, &c.symbol, &c.name);
                }
            }
            Err(e) => error!(error = %e, "[aliases] coin list fetch failed"),
        }

        info!(entries = aliases.len(), "[aliases] built index");
        aliases
    }

    fn local_copy(&self) -> Option<Arc<AliasMap>> {
        self.local
            .read()
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, map)| map.clone())
    }

    fn remember(&self, map: AliasMap) -> Arc<AliasMap> {
        let map = Arc::new(map);
        *self.local.write() = Some((Instant::now(), map.clone()));
        map
    }

    async fn cached(&self) -> Option<Arc<AliasMap>> {
        match self.cache.get_json::<AliasMap>(CACHE_KEY).await {
            Some(map) if !map.is_empty() => Some(self.remember(map)),
            _ => None,
        }
    }

    /// Current alias map, rebuilding it when neither memory nor cache has one.
    pub async fn get(&self) -> Arc<AliasMap> {
        if let Some(map) = self.local_copy() {
            return map;
        }
        if let Some(map) = self.cached().await {
            return map;
        }

        let _guard = self.rebuild.lock().await;
        if let Some(map) = self.local_copy() {
            return map;
        }
        if let Some(map) = self.cached().await {
            return map;
        }
        let aliases = self.fetch().await;
        if aliases.is_empty() {
            return Arc::new(aliases);
        }
        self.cache.set_json(CACHE_KEY, &aliases, self.ttl).await;
        self.remember(aliases)
    }

    /// Warm the index; used at startup.
    pub async fn refresh(&self) -> usize {
        self.get().await.len()
    }

    /// `btc`, `Bitcoin`, `ETH` and the like to a coin id.
    pub async fn resolve(&self, maybe: &str) -> Option<String> {
        let key = maybe.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        let aliases = self.get().await;
        if let Some(id) = aliases.get(&key) {
            return Some(id.clone());
        }
        let stripped: String = key.chars().filter(|c| c.is_alphanumeric()).collect();
        if stripped != key {
            return aliases.get(&stripped).cloned();
        }
        None
    }
}
