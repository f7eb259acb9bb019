//! In-memory stand-ins for the upstream services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Agent, AgentParts};
use crate::error::{AgentError, Result};
use crate::services::ai::{ChatModel, ChatRequest};
use crate::services::coingecko::{CoinDetail, CoinRef, MarketCoin, MarketData, TrendingCoin};
use crate::services::{NewsSource, SystemPrompt};

fn coin(id: &str, symbol: &str, name: &str, price: f64, cap: f64, change: f64) -> MarketCoin {
    MarketCoin {
        id: id.into(),
        symbol: symbol.into(),
        name: name.into(),
        current_price: Some(price),
        market_cap: Some(cap),
        price_change_percentage_24h: Some(change),
    }
}

/// Four coins in market-cap order plus a long tail only present in `/coins/list`.
pub struct FakeMarket {
    coins: Vec<MarketCoin>,
    fail: bool,
    pub market_calls: AtomicUsize,
    pub price_calls: AtomicUsize,
}

impl Default for FakeMarket {
    fn default() -> Self {
        FakeMarket {
            coins: vec![
                coin("bitcoin", "btc", "Bitcoin", 64000.0, 1.26e12, 2.5),
                coin("ethereum", "eth", "Ethereum", 3100.5, 3.7e11, -1.0),
                coin("solana", "sol", "Solana", 150.25, 7.0e10, -4.2),
                coin("tether", "usdt", "Tether", 1.0, 1.1e11, 0.01),
            ],
            fail: false,
            market_calls: AtomicUsize::new(0),
            price_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeMarket {
    pub fn failing() -> Self {
        FakeMarket {
            fail: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(AgentError::status("coingecko", reqwest::StatusCode::TOO_MANY_REQUESTS))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn price(&self, coin_id: &str, _vs: &str) -> Result<Option<f64>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .coins
            .iter()
            .find(|c| c.id == coin_id)
            .and_then(|c| c.current_price))
    }

    async fn markets(&self, limit: usize) -> Result<Vec<MarketCoin>> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.coins.iter().take(limit).cloned().collect())
    }

    async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        self.check()?;
        Ok(vec![
            TrendingCoin {
                id: Some("pepe".into()),
                name: Some("Pepe".into()),
                symbol: Some("pepe".into()),
                score: Some(0),
                market_cap_rank: Some(30),
            },
            TrendingCoin {
                id: Some("sui".into()),
                name: Some("Sui".into()),
                symbol: Some("SUI".into()),
                score: Some(1),
                market_cap_rank: Some(12),
            },
        ])
    }

    async fn coin_detail(&self, coin_id: &str) -> Result<Option<CoinDetail>> {
        self.check()?;
        Ok(self.coins.iter().find(|c| c.id == coin_id).map(|c| CoinDetail {
            id: c.id.clone(),
            name: c.name.clone(),
            symbol: c.symbol.to_uppercase(),
            price: c.current_price,
            market_cap: c.market_cap,
            volume_24h: Some(1.0e9),
            change_24h: c.price_change_percentage_24h,
        }))
    }

    async fn coin_list(&self) -> Result<Vec<CoinRef>> {
        self.check()?;
        let mut list: Vec<CoinRef> = self
            .coins
            .iter()
            .map(|c| CoinRef {
                id: c.id.clone(),
                symbol: c.symbol.clone(),
                name: c.name.clone(),
            })
            .collect();
        list.push(CoinRef {
            id: "ethereum-wormhole".into(),
            symbol: "eth".into(),
            name: "Ethereum (Wormhole)".into(),
        });
        list.push(CoinRef {
            id: "wojak-token".into(),
            symbol: "wojak".into(),
            name: "Wojak".into(),
        });
        Ok(list)
    }
}

#[derive(Default)]
pub struct FakeNews {
    titles: Vec<String>,
}

impl FakeNews {
    pub fn with(titles: &[&str]) -> Self {
        FakeNews {
            titles: titles.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl NewsSource for FakeNews {
    async fn headlines(&self, limit: usize) -> Vec<String> {
        self.titles.iter().take(limit).cloned().collect()
    }
}

/// Replies with a fixed text, or fails every call.
pub struct FakeModel {
    reply: Option<String>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl FakeModel {
    pub fn replying(reply: &str) -> Self {
        FakeModel {
            reply: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        FakeModel {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> ChatRequest {
        self.seen.lock().last().cloned().expect("model was never called")
    }

    pub fn last_user_text(&self) -> String {
        self.last_request()
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    pub fn last_facts(&self) -> String {
        self.last_request()
            .messages
            .iter()
            .find(|m| m.content.starts_with("[FACTS]"))
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.seen.lock().push(request.clone());
        self.reply
            .clone()
            .ok_or_else(|| AgentError::Model("offline".into()))
    }
}

pub fn agent_with(market: Arc<FakeMarket>, news: Arc<FakeNews>, model: Arc<FakeModel>) -> Agent {
    Agent::new(AgentParts {
        market,
        news,
        model,
        prompt: SystemPrompt::from_template("You are CryptoSage{{ DEPLOYMENT_REFERENCE }}."),
        redis: None,
        max_tokens: 200,
        cache_ttl_short: Duration::from_secs(300),
        alias_ttl: Duration::from_secs(3600),
        history_ttl: Some(Duration::from_secs(86400)),
    })
}
