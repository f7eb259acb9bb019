use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Runtime settings, layered defaults < YAML file < environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // CoinGecko (free public API)
    pub coingecko_api_url: String,
    pub coingecko_timeout: f64,
    pub alias_ttl: u64,

    // News
    pub coindesk_rss: String,
    pub rss2json_api_url: String,
    pub news_timeout: f64,

    // Redis
    pub redis_url: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub redis_password: String,
    pub cache_ttl_short: u64,
    pub chat_history_ttl: i64,

    // Azure OpenAI
    pub azure_openai_endpoint: String,
    pub azure_openai_api_key: String,
    pub azure_openai_api_version: String,
    pub azure_openai_deployment: String,
    pub max_tokens: u32,
    pub temperature: f32,

    // Prompts
    pub prompt_dir: String,
    pub prompt_file: String,
    pub deployment_label: String,

    // Agent manifest
    pub agent_name: String,
    pub agent_description: String,
    pub agent_version: String,
    pub agent_publisher: String,
    pub agent_website: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 8012,
            coingecko_api_url: "https://api.coingecko.com/api/v3".to_string(),
            coingecko_timeout: 10.0,
            alias_ttl: 3600,
            coindesk_rss: "https://www.coindesk.com/arc/outboundfeeds/rss/".to_string(),
            rss2json_api_url: "https://api.rss2json.com/v1/api.json".to_string(),
            news_timeout: 6.0,
            redis_url: "redis://localhost:6379/0".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: String::new(),
            cache_ttl_short: 300,
            chat_history_ttl: 86400,
            azure_openai_endpoint: String::new(),
            azure_openai_api_key: String::new(),
            azure_openai_api_version: "2024-02-01".to_string(),
            azure_openai_deployment: String::new(),
            max_tokens: 200,
            temperature: 0.7,
            prompt_dir: "prompts".to_string(),
            prompt_file: "cryptosage.tpl".to_string(),
            deployment_label: "CryptoSage A2A".to_string(),
            agent_name: "CryptoSage AI".to_string(),
            agent_description:
                "Crypto-focused A2A agent: prices, market lists, headlines, and concise explanations."
                    .to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            agent_publisher: "Emmanuel Ademola".to_string(),
            agent_website: "https://emmanueldev247.github.io/".to_string(),
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value {:?} for {}", raw, name))
}

macro_rules! overlay {
    ($lookup:ident, $cfg:ident, string: [$($s:ident),* $(,)?], parsed: [$($p:ident),* $(,)?]) => {{
        $(
            if let Some(v) = $lookup(&stringify!($s).to_ascii_uppercase()) {
                $cfg.$s = v;
            }
        )*
        $(
            let name = stringify!($p).to_ascii_uppercase();
            if let Some(v) = $lookup(&name) {
                $cfg.$p = parse_var(&name, &v)?;
            }
        )*
    }};
}

impl Config {
    /// Build the effective configuration. `path` points at an optional YAML file.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let _ = dotenvy::dotenv();

        let base = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Config::default(),
        };
        base.with_overrides(|name| env::var(name).ok())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Config> {
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply `NAME=value` overrides from `lookup`, then validate.
    pub fn with_overrides<F>(self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = self;
        overlay!(lookup, cfg,
            string: [
                host, coingecko_api_url, coindesk_rss, rss2json_api_url,
                redis_url, redis_host, redis_password,
                azure_openai_endpoint, azure_openai_api_key, azure_openai_api_version,
                azure_openai_deployment, prompt_dir, prompt_file,
                deployment_label, agent_name, agent_description, agent_version,
                agent_publisher, agent_website,
            ],
            parsed: [
                port, coingecko_timeout, alias_ttl, news_timeout, redis_port, redis_db,
                cache_ttl_short, chat_history_ttl, max_tokens, temperature,
            ]
        );
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            bail!("TEMPERATURE must be within [0, 1], got {}", self.temperature);
        }
        if !(self.coingecko_timeout.is_finite() && self.coingecko_timeout > 0.0) {
            bail!("COINGECKO_TIMEOUT must be positive, got {}", self.coingecko_timeout);
        }
        if !(self.news_timeout.is_finite() && self.news_timeout > 0.0) {
            bail!("NEWS_TIMEOUT must be positive, got {}", self.news_timeout);
        }
        Ok(())
    }

    pub fn coingecko_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.coingecko_timeout)
    }

    pub fn news_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.news_timeout)
    }

    /// `None` when history should never expire.
    pub fn chat_history_ttl(&self) -> Option<Duration> {
        u64::try_from(self.chat_history_ttl)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn azure_configured(&self) -> bool {
        !self.azure_openai_endpoint.is_empty()
            && !self.azure_openai_api_key.is_empty()
            && !self.azure_openai_deployment.is_empty()
    }
}
