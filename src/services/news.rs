use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{AgentError, Result};

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Latest headline titles, newest first. Empty when nothing could be fetched.
    async fn headlines(&self, limit: usize) -> Vec<String>;
}

/// CoinDesk headlines via rss2json, falling back to the raw RSS feed.
pub struct CoinDeskNews {
    feed_url: String,
    rss2json_url: String,
    http: Client,
}

impl CoinDeskNews {
    pub fn new(feed_url: &str, rss2json_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(CoinDeskNews {
            feed_url: feed_url.to_string(),
            rss2json_url: rss2json_url.to_string(),
            http,
        })
    }

    async fn via_rss2json(&self, limit: usize) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(&self.rss2json_url)
            .query(&[("rss_url", &self.feed_url)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::status("rss2json", resp.status()));
        }
        Ok(titles_from_rss2json(&resp.json().await?, limit))
    }

    async fn via_feed(&self, limit: usize) -> Result<Vec<String>> {
        let resp = self.http.get(&self.feed_url).send().await?;
        if !resp.status().is_success() {
            return Err(AgentError::status("coindesk", resp.status()));
        }
        let body = resp.bytes().await?;
        titles_from_feed(&body, limit)
    }
}

fn titles_from_rss2json(data: &Value, limit: usize) -> Vec<String> {
    let items = data
        .get("items")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .or_else(|| data.get("articles").and_then(Value::as_array));
    items
        .into_iter()
        .flatten()
        .take(limit)
        .filter_map(|it| it.get("title").and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn titles_from_feed(body: &[u8], limit: usize) -> Result<Vec<String>> {
    let channel = rss::Channel::read_from(body)?;
    Ok(channel
        .items()
        .iter()
        .take(limit)
        .filter_map(|item| item.title())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl NewsSource for CoinDeskNews {
    async fn headlines(&self, limit: usize) -> Vec<String> {
        match self.via_rss2json(limit).await {
            Ok(titles) if !titles.is_empty() => return titles,
            Ok(_) => debug!("[news] rss2json returned no items"),
            Err(e) => debug!(error = %e, "[news] rss2json failed"),
        }
        match self.via_feed(limit).await {
            Ok(titles) => titles,
            Err(e) => {
                debug!(error = %e, "[news] feed fetch failed");
                Vec::new()
            }
        }
    }
}
