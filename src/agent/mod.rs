//! Intent routing: classify a message, gather live data, compose a reply.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::services::coingecko::{MarketCoin, TrendingCoin};
use crate::services::{
    AzureOpenAi, ChatModel, CoinDeskNews, CoinGecko, Composer, Facts, MarketData, NewsSource,
    SystemPrompt,
};
use crate::store::{Cache, KvStore, MemoryStore, SessionStore, Turn};

pub mod aliases;
pub mod intent;
pub mod render;
#[cfg(test)]
pub(crate) mod testing;

pub use aliases::AliasIndex;
pub use intent::Intent;

const PRICE_TTL: Duration = Duration::from_secs(300);
const NEWS_KEY: &str = "news:coindesk:5";
const NEWS_LIMIT: usize = 5;
const TRENDING_KEY: &str = "trending";
const HISTORY_WINDOW: usize = 30;
const DEFAULT_LIST_COUNT: usize = 10;

/// One user message, already attributed to a session.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub text: String,
    pub deployment_label: String,
    pub temperature: f32,
    /// Earlier user messages supplied inline by the caller, oldest first.
    pub inline_history: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnError {
    CoinNotFound,
}

impl TurnError {
    pub fn code(&self) -> i64 {
        match self {
            TurnError::CoinNotFound => 404,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            TurnError::CoinNotFound => "Coin not found.",
        }
    }
}

pub struct Agent {
    market: Arc<dyn MarketData>,
    news: Arc<dyn NewsSource>,
    composer: Composer,
    cache: Arc<Cache>,
    sessions: SessionStore,
    aliases: AliasIndex,
    cache_ttl_short: Duration,
}

pub struct AgentParts {
    pub market: Arc<dyn MarketData>,
    pub news: Arc<dyn NewsSource>,
    pub model: Arc<dyn ChatModel>,
    pub prompt: SystemPrompt,
    pub redis: Option<Arc<dyn KvStore>>,
    pub max_tokens: u32,
    pub cache_ttl_short: Duration,
    pub alias_ttl: Duration,
    pub history_ttl: Option<Duration>,
}

impl Agent {
    pub fn new(parts: AgentParts) -> Self {
        let cache = Arc::new(Cache::new(parts.redis.clone()));
        let history_store: Arc<dyn KvStore> = match parts.redis {
            Some(redis) => redis,
            None => Arc::new(MemoryStore::new()),
        };
        Agent {
            aliases: AliasIndex::new(parts.market.clone(), cache.clone(), parts.alias_ttl),
            market: parts.market,
            news: parts.news,
            composer: Composer::new(parts.model, parts.prompt, parts.max_tokens),
            cache,
            sessions: SessionStore::new(history_store, parts.history_ttl),
            cache_ttl_short: parts.cache_ttl_short,
        }
    }

    /// Wire the production clients described by `config`.
    pub fn from_config(config: &Config, redis: Option<Arc<dyn KvStore>>) -> crate::error::Result<Self> {
        Ok(Agent::new(AgentParts {
            market: Arc::new(CoinGecko::new(&config.coingecko_api_url, config.coingecko_timeout())?),
            news: Arc::new(CoinDeskNews::new(
                &config.coindesk_rss,
                &config.rss2json_api_url,
                config.news_timeout(),
            )?),
            model: Arc::new(AzureOpenAi::from_config(config)?),
            prompt: SystemPrompt::load(&config.prompt_dir, &config.prompt_file)?,
            redis,
            max_tokens: config.max_tokens,
            cache_ttl_short: Duration::from_secs(config.cache_ttl_short),
            alias_ttl: Duration::from_secs(config.alias_ttl),
            history_ttl: config.chat_history_ttl(),
        }))
    }

    pub fn storage_backend(&self) -> &'static str {
        self.cache.backend()
    }

    pub fn aliases(&self) -> &AliasIndex {
        &self.aliases
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    async fn history_for(&self, req: &TurnRequest) -> Vec<Turn> {
        let stored = match self.sessions.history(&req.session_id).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(session = %req.session_id, error = %e, "[history] get failed (non-fatal)");
                Vec::new()
            }
        };
        if req.inline_history.is_empty() {
            return stored;
        }
        let mut merged: Vec<Turn> = req
            .inline_history
            .iter()
            .map(|t| Turn::new(t.as_str(), ""))
            .chain(stored)
            .collect();
        let excess = merged.len().saturating_sub(HISTORY_WINDOW);
        merged.drain(..excess);
        merged
    }

    /// Answer one message and record the exchange in the session history.
    pub async fn respond(&self, req: &TurnRequest) -> Result<String, TurnError> {
        let history = self.history_for(req).await;
        let intent = intent::classify(&req.text);
        info!(session = %req.session_id, %intent, text = ?req.text, "[invoke] handling turn");

        let ctx = Ctx {
            req,
            history: &history,
        };
        let content = match intent {
            Intent::Price => self.price(&ctx).await?,
            Intent::News => self.headlines(&ctx).await,
            Intent::Top => self.market_list(&ctx, false).await,
            Intent::Worst => self.market_list(&ctx, true).await,
            Intent::Trending => self.trending(&ctx).await,
            Intent::Detail => self.detail(&ctx).await?,
            Intent::Unknown => self.free_form(&ctx).await,
        };

        if let Err(e) = self.sessions.append(&req.session_id, &req.text, &content).await {
            warn!(session = %req.session_id, error = %e, "[history] append failed (non-fatal)");
        }
        Ok(content)
    }

    async fn compose_or(&self, ctx: &Ctx<'_>, text: &str, facts: Facts, fallback: impl FnOnce() -> String) -> String {
        match self
            .composer
            .compose(text, ctx.history, &facts, ctx.req.temperature)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "[compose] model unavailable, using fallback");
                fallback()
            }
        }
    }

    async fn price(&self, ctx: &Ctx<'_>) -> Result<String, TurnError> {
        let label = &ctx.req.deployment_label;
        let coin = match intent::extract_coin_from_price(&ctx.req.text) {
            Some(word) => self.aliases.resolve(&word).await,
            None => None,
        };
        let Some(coin) = coin else {
            return Ok(self
                .compose_or(
                    ctx,
                    "User asked for a price but provided no recognized coin. Ask them to specify it clearly.",
                    Facts::new(label),
                    || "Which coin do you mean? Try something like `price of bitcoin`.".to_string(),
                )
                .await);
        };

        let key = format!("price:{coin}:usd");
        let price = match self.cache.get_json::<f64>(&key).await {
            Some(price) => price,
            None => match self.market.price(&coin, "usd").await {
                Ok(Some(price)) => {
                    self.cache.set_json(&key, &price, PRICE_TTL).await;
                    price
                }
                Ok(None) => return Err(TurnError::CoinNotFound),
                Err(e) => {
                    warn!(%coin, error = %e, "[price] fetch failed");
                    let text = format!(
                        "User asked for price of {coin} but live price could not be fetched. Apologize briefly and ask to try again."
                    );
                    let facts = Facts::new(label).with("intent", "price").with("coin", coin.as_str());
                    return Ok(self
                        .compose_or(ctx, &text, facts, || {
                            format!("Sorry, I couldn’t fetch the live price of **{coin}** right now. Please try again shortly.")
                        })
                        .await);
                }
            },
        };

        let facts = Facts::new(label)
            .with("intent", "price")
            .with("coin", coin.as_str())
            .with("price_usd", price)
            .with("data_source", "CoinGecko");
        Ok(self
            .compose_or(ctx, &ctx.req.text, facts, || render::price_line(&coin, price))
            .await)
    }

    async fn headlines(&self, ctx: &Ctx<'_>) -> String {
        let headlines = match self.cache.get_json::<Vec<String>>(NEWS_KEY).await {
            Some(cached) if !cached.is_empty() => cached,
            _ => self.news.headlines(NEWS_LIMIT).await,
        };
        if headlines.is_empty() {
            warn!("[news] no headlines available");
            return render::HEADLINES_UNAVAILABLE.to_string();
        }
        self.cache
            .set_json(NEWS_KEY, &headlines, self.cache_ttl_short)
            .await;

        let facts = Facts::new(&ctx.req.deployment_label)
            .with("intent", "market_news")
            .with("headlines", headlines.join("; "))
            .with("data_source", "CoinDesk RSS");
        self.compose_or(ctx, "Summarize these headlines for the user.", facts, || {
            render::headlines(&headlines)
        })
        .await
    }

    async fn market_list(&self, ctx: &Ctx<'_>, worst: bool) -> String {
        let n = intent::extract_count(&ctx.req.text, DEFAULT_LIST_COUNT);
        let title = render::list_title(worst, n);
        let key = format!("markets:top:{n}");

        let mut markets = match self.cache.get_json::<Vec<MarketCoin>>(&key).await {
            Some(cached) if !cached.is_empty() => cached,
            _ => match self.market.markets(n).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(error = %e, "[markets] fetch failed, building fallback");
                    return render::market_list(&title, &[]);
                }
            },
        };
        self.cache.set_json(&key, &markets, self.cache_ttl_short).await;

        if worst {
            markets.sort_by(|a, b| {
                let a = a.price_change_percentage_24h.unwrap_or(0.0);
                let b = b.price_change_percentage_24h.unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            });
            markets.truncate(n);
        }

        let items: Vec<_> = markets
            .iter()
            .enumerate()
            .map(|(i, c)| {
                json!({
                    "rank": i + 1,
                    "name": c.name,
                    "symbol": c.symbol.to_uppercase(),
                    "price": c.current_price,
                    "change_24h": c.price_change_percentage_24h,
                    "market_cap": c.market_cap,
                })
            })
            .collect();
        let facts = Facts::new(&ctx.req.deployment_label)
            .with("intent", if worst { "worst" } else { "top" })
            .with("count", n)
            .with("list", items)
            .with("data_source", "CoinGecko");
        self.compose_or(ctx, &ctx.req.text, facts, || render::market_list(&title, &markets))
            .await
    }

    async fn trending(&self, ctx: &Ctx<'_>) -> String {
        let trending = match self.cache.get_json::<Vec<TrendingCoin>>(TRENDING_KEY).await {
            Some(cached) if !cached.is_empty() => cached,
            _ => match self.market.trending().await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(error = %e, "[trending] fetch failed");
                    return render::trending_list(&[]);
                }
            },
        };
        self.cache
            .set_json(TRENDING_KEY, &trending, self.cache_ttl_short)
            .await;

        let items: Vec<_> = trending
            .iter()
            .enumerate()
            .map(|(i, c)| {
                json!({
                    "rank": i + 1,
                    "name": c.name,
                    "symbol": c.symbol.as_deref().unwrap_or_default().to_uppercase(),
                    "market_cap_rank": c.market_cap_rank,
                })
            })
            .collect();
        let facts = Facts::new(&ctx.req.deployment_label)
            .with("intent", "trending")
            .with("list", items)
            .with("data_source", "CoinGecko");
        self.compose_or(ctx, &ctx.req.text, facts, || render::trending_list(&trending))
            .await
    }

    async fn detail(&self, ctx: &Ctx<'_>) -> Result<String, TurnError> {
        let maybe = ctx
            .req
            .text
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
            .to_lowercase();
        if maybe.is_empty() {
            return Err(TurnError::CoinNotFound);
        }
        let coin = self.aliases.resolve(&maybe).await.unwrap_or(maybe);

        let detail = match self.market.coin_detail(&coin).await {
            Ok(Some(detail)) => detail,
            Ok(None) => return Err(TurnError::CoinNotFound),
            Err(e) => {
                warn!(%coin, error = %e, "[detail] fetch failed");
                return Err(TurnError::CoinNotFound);
            }
        };

        let facts = Facts::new(&ctx.req.deployment_label)
            .with("intent", "detail")
            .with("name", detail.name.as_str())
            .with("symbol", detail.symbol.as_str())
            .with("price", detail.price)
            .with("market_cap", detail.market_cap)
            .with("volume_24h", detail.volume_24h)
            .with("change_24h", detail.change_24h)
            .with("data_source", "CoinGecko");
        Ok(self
            .compose_or(ctx, &ctx.req.text, facts, || render::detail(&detail))
            .await)
    }

    async fn free_form(&self, ctx: &Ctx<'_>) -> String {
        let facts = Facts::new(&ctx.req.deployment_label);
        match self
            .composer
            .fallback_answer(&ctx.req.text, ctx.history, &facts, ctx.req.temperature)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "[compose] fallback answer failed");
                render::SORRY.to_string()
            }
        }
    }
}

struct Ctx<'a> {
    req: &'a TurnRequest,
    history: &'a [Turn],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{agent_with, FakeMarket, FakeModel, FakeNews};
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn turn(session: &str, text: &str) -> TurnRequest {
        TurnRequest {
            session_id: session.to_string(),
            text: text.to_string(),
            deployment_label: "Telex".to_string(),
            temperature: 0.7,
            inline_history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn price_is_grounded_and_recorded() {
        let model = Arc::new(FakeModel::replying("BTC is $64,000."));
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model.clone());

        let reply = agent.respond(&turn("s1", "price of BTC")).await.unwrap();
        assert_eq!(reply, "BTC is $64,000.");

        let facts = model.last_facts();
        assert!(facts.contains("- coin: bitcoin"));
        assert!(facts.contains("- price_usd: 64000.0") || facts.contains("- price_usd: 64000"));
        assert!(facts.contains("- data_source: CoinGecko"));

        let history = agent.sessions().history("s1").await.unwrap();
        assert_eq!(history, vec![Turn::new("price of BTC", "BTC is $64,000.")]);
    }

    #[tokio::test]
    async fn price_is_cached_between_turns() {
        let market = Arc::new(FakeMarket::default());
        let agent = agent_with(market.clone(), Arc::new(FakeNews::default()), Arc::new(FakeModel::replying("ok")));
        agent.respond(&turn("s", "price of eth")).await.unwrap();
        agent.respond(&turn("s", "price of ethereum")).await.unwrap();
        assert_eq!(market.price_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_price_is_coin_not_found_and_not_recorded() {
        let agent = agent_with(
            Arc::new(FakeMarket::default()),
            Arc::new(FakeNews::default()),
            Arc::new(FakeModel::replying("ok")),
        );
        // resolves through the alias map but the price endpoint has no quote
        let err = agent.respond(&turn("s", "price of wojak")).await.unwrap_err();
        assert_eq!(err, TurnError::CoinNotFound);
        assert_eq!((err.code(), err.message()), (404, "Coin not found."));
        assert!(agent.sessions().history("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrecognised_coin_asks_for_clarification() {
        let model = Arc::new(FakeModel::replying("Which coin?"));
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model.clone());
        let reply = agent.respond(&turn("s", "price of zzzz")).await.unwrap();
        assert_eq!(reply, "Which coin?");
        assert!(model.last_user_text().contains("no recognized coin"));
    }

    #[tokio::test]
    async fn price_without_model_uses_plain_line() {
        let agent = agent_with(
            Arc::new(FakeMarket::default()),
            Arc::new(FakeNews::default()),
            Arc::new(FakeModel::failing()),
        );
        let reply = agent.respond(&turn("s", "price of sol")).await.unwrap();
        assert!(reply.starts_with("**solana** is trading at **$150.25**"));
    }

    #[tokio::test]
    async fn worst_sorts_by_change_ascending() {
        let model = Arc::new(FakeModel::failing());
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model);
        let reply = agent.respond(&turn("s", "worst 3 coins")).await.unwrap();
        let lines: Vec<&str> = reply.lines().filter(|l| l.starts_with(char::is_numeric)).collect();
        assert_eq!(lines.len(), 3);
        assert!(reply.starts_with("**Worst 3 coins (24h)**"));
        assert!(lines[0].contains("Solana"));
        assert!(lines[2].contains("Tether") || lines[2].contains("Bitcoin"));
    }

    #[tokio::test]
    async fn top_list_facts_carry_count_and_ranks() {
        let model = Arc::new(FakeModel::replying("list"));
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model.clone());
        agent.respond(&turn("s", "top 2 coins")).await.unwrap();
        let facts = model.last_facts();
        assert!(facts.contains("- intent: top"));
        assert!(facts.contains("- count: 2"));
        assert!(facts.contains(r#""rank":1"#));
        assert!(facts.contains(r#""symbol":"BTC""#));
    }

    #[tokio::test]
    async fn market_outage_returns_empty_titled_list() {
        let agent = agent_with(
            Arc::new(FakeMarket::failing()),
            Arc::new(FakeNews::default()),
            Arc::new(FakeModel::replying("never")),
        );
        let reply = agent.respond(&turn("s", "top 5 coins")).await.unwrap();
        assert!(reply.starts_with("**Top 5 coins by market cap**"));
        assert!(reply.ends_with(render::DISCLAIMER));
    }

    #[tokio::test]
    async fn news_without_headlines_warns() {
        let agent = agent_with(
            Arc::new(FakeMarket::default()),
            Arc::new(FakeNews::default()),
            Arc::new(FakeModel::replying("never")),
        );
        assert_eq!(
            agent.respond(&turn("s", "any news?")).await.unwrap(),
            render::HEADLINES_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn news_headlines_are_joined_into_facts() {
        let model = Arc::new(FakeModel::replying("summary"));
        let news = Arc::new(FakeNews::with(&["ETF approved", "Hack at exchange"]));
        let agent = agent_with(Arc::new(FakeMarket::default()), news, model.clone());
        assert_eq!(agent.respond(&turn("s", "latest headlines")).await.unwrap(), "summary");
        assert!(model.last_facts().contains("- headlines: ETF approved; Hack at exchange"));
        assert_eq!(model.last_user_text(), "Summarize these headlines for the user.");
    }

    #[tokio::test]
    async fn trending_falls_back_to_markdown() {
        let agent = agent_with(
            Arc::new(FakeMarket::default()),
            Arc::new(FakeNews::default()),
            Arc::new(FakeModel::failing()),
        );
        let reply = agent.respond(&turn("s", "trending coins")).await.unwrap();
        assert!(reply.starts_with("**Trending coins**\n\n1. Pepe (PEPE)"));
    }

    #[tokio::test]
    async fn detail_resolves_last_word() {
        let model = Arc::new(FakeModel::failing());
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model);
        let reply = agent.respond(&turn("s", "details on ETH?")).await.unwrap();
        assert!(reply.starts_with("**Ethereum (ETH)**"));

        let err = agent.respond(&turn("s", "info nothinghere")).await.unwrap_err();
        assert_eq!(err, TurnError::CoinNotFound);
    }

    #[tokio::test]
    async fn free_form_without_model_apologises() {
        let agent = agent_with(
            Arc::new(FakeMarket::default()),
            Arc::new(FakeNews::default()),
            Arc::new(FakeModel::failing()),
        );
        assert_eq!(
            agent.respond(&turn("s", "what is staking?")).await.unwrap(),
            render::SORRY
        );
    }

    #[tokio::test]
    async fn inline_history_precedes_stored_turns() {
        let model = Arc::new(FakeModel::replying("answer"));
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model.clone());
        agent.sessions().append("s", "earlier", "reply").await.unwrap();

        let mut req = turn("s", "what is staking?");
        req.inline_history = vec!["from telex".to_string()];
        agent.respond(&req).await.unwrap();

        let contents: Vec<String> = model
            .last_request()
            .messages
            .iter()
            .skip(1)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents[..3], ["from telex", "earlier", "reply"]);
    }

    #[tokio::test]
    async fn merged_history_keeps_the_newest_thirty_turns() {
        let model = Arc::new(FakeModel::replying("answer"));
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model.clone());
        for i in 0..10 {
            agent.sessions().append("s", &format!("q{i}"), &format!("a{i}")).await.unwrap();
        }

        let mut req = turn("s", "what is staking?");
        req.inline_history = (0..25).map(|i| format!("i{i}")).collect();
        agent.respond(&req).await.unwrap();

        let messages = model.last_request().messages;
        // system, 20 inline, 10 stored pairs, facts, question
        assert_eq!(messages.len(), 1 + 20 + 20 + 1 + 1);
        assert_eq!(messages[1].content, "i5");
        assert_eq!(messages[20].content, "i24");
        assert_eq!(messages[21].content, "q0");
    }

    #[tokio::test]
    async fn turn_temperature_is_forwarded() {
        let model = Arc::new(FakeModel::replying("answer"));
        let agent = agent_with(Arc::new(FakeMarket::default()), Arc::new(FakeNews::default()), model.clone());
        let mut req = turn("s", "what is staking?");
        req.temperature = 0.2;
        agent.respond(&req).await.unwrap();
        assert_eq!(model.last_request().temperature, 0.2);
    }
}
