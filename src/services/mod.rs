//! Clients for the upstream services the agent grounds its answers in.

pub mod ai;
pub mod coingecko;
pub mod news;
pub mod prompt;

pub use ai::{AzureOpenAi, ChatModel, Composer, Facts};
pub use coingecko::{CoinGecko, MarketData};
pub use news::{CoinDeskNews, NewsSource};
pub use prompt::SystemPrompt;
