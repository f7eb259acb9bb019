use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// One row of `/coins/markets`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoin {
    pub id: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub score: Option<i64>,
    pub market_cap_rank: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub change_24h: Option<f64>,
}

/// One row of `/coins/list`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CoinRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn price(&self, coin_id: &str, vs: &str) -> Result<Option<f64>>;
    async fn markets(&self, limit: usize) -> Result<Vec<MarketCoin>>;
    async fn trending(&self) -> Result<Vec<TrendingCoin>>;
    async fn coin_detail(&self, coin_id: &str) -> Result<Option<CoinDetail>>;
    async fn coin_list(&self) -> Result<Vec<CoinRef>>;
}

pub struct CoinGecko {
    base: String,
    http: Client,
}

impl CoinGecko {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(CoinGecko {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(query)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::status("coingecko", resp.status()));
        }
        Ok(resp.json().await?)
    }

    /// `{base}/coins/{id}` with the id percent-encoded as one path segment.
    fn detail_url(&self, coin_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base).map_err(|e| AgentError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| AgentError::InvalidUrl(self.base.clone()))?
            .pop_if_empty()
            .extend(["coins", coin_id]);
        Ok(url)
    }
}

fn parse_trending(body: Value) -> Vec<TrendingCoin> {
    body.get("coins")
        .and_then(Value::as_array)
        .map(|coins| {
            coins
                .iter()
                .map(|c| {
                    let item = c.get("item").cloned().unwrap_or(Value::Null);
                    serde_json::from_value(item).unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_detail(data: &Value) -> CoinDetail {
    let md = &data["market_data"];
    let usd = |field: &str| md[field]["usd"].as_f64();
    CoinDetail {
        id: data["id"].as_str().unwrap_or_default().to_string(),
        name: data["name"].as_str().unwrap_or_default().to_string(),
        symbol: data["symbol"].as_str().unwrap_or_default().to_uppercase(),
        price: usd("current_price"),
        market_cap: usd("market_cap"),
        volume_24h: usd("total_volume"),
        change_24h: md["price_change_percentage_24h"].as_f64(),
    }
}

#[async_trait]
impl MarketData for CoinGecko {
    async fn price(&self, coin_id: &str, vs: &str) -> Result<Option<f64>> {
        let body = self
            .get_json(
                "/simple/price",
                &[("ids", coin_id.to_string()), ("vs_currencies", vs.to_string())],
            )
            .await?;
        Ok(body[coin_id][vs].as_f64())
    }

    async fn markets(&self, limit: usize) -> Result<Vec<MarketCoin>> {
        let body = self
            .get_json(
                "/coins/markets",
                &[
                    ("vs_currency", "usd".into()),
                    ("order", "market_cap_desc".into()),
                    ("per_page", limit.to_string()),
                    ("page", "1".into()),
                    ("sparkline", "false".into()),
                    ("price_change_percentage", "24h".into()),
                ],
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        Ok(parse_trending(self.get_json("/search/trending", &[]).await?))
    }

    async fn coin_detail(&self, coin_id: &str) -> Result<Option<CoinDetail>> {
        let resp = self
            .http
            .get(self.detail_url(coin_id)?)
            .query(&[
                ("localization", "false"),
                ("tickers", "false"),
                ("community_data", "false"),
                ("developer_data", "false"),
                ("sparkline", "false"),
            ])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AgentError::status("coingecko", resp.status()));
        }
        let data: Value = resp.json().await?;
        Ok(Some(parse_detail(&data)))
    }

    async fn coin_list(&self) -> Result<Vec<CoinRef>> {
        Ok(serde_json::from_value(self.get_json("/coins/list", &[]).await?)?)
    }
}
