use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:price|worth|value|rate)\s+of\s+([\w\-]+)").unwrap());
static TOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:top|best)\s+(\d{1,2})?\s*(?:coins|cryptos?)").unwrap());
static WORST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:worst|losers?)\s+(\d{1,2})?\s*(?:coins|cryptos?)").unwrap());
static TREND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:trending|hot)\s+(\d{1,2})?\s*(?:coins|cryptos?)").unwrap());

const MAX_COUNT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    News,
    Price,
    Top,
    Worst,
    Trending,
    Detail,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::News => "news",
            Intent::Price => "price",
            Intent::Top => "top",
            Intent::Worst => "worst",
            Intent::Trending => "trending",
            Intent::Detail => "detail",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First matching rule wins; keyword rules are checked before patterns.
pub fn classify(text: &str) -> Intent {
    let t = text.to_lowercase();
    if t.contains("news") || t.contains("headline") {
        Intent::News
    } else if PRICE_RE.is_match(&t) {
        Intent::Price
    } else if TOP_RE.is_match(&t) {
        Intent::Top
    } else if WORST_RE.is_match(&t) {
        Intent::Worst
    } else if TREND_RE.is_match(&t) {
        Intent::Trending
    } else if t.contains("detail") || t.contains("info") {
        Intent::Detail
    } else {
        Intent::Unknown
    }
}

pub fn extract_coin_from_price(text: &str) -> Option<String> {
    PRICE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Count requested by a list query, clamped to `1..=50`.
pub fn extract_count(text: &str, default: usize) -> usize {
    for rx in [&*TOP_RE, &*WORST_RE, &*TREND_RE] {
        if let Some(caps) = rx.captures(text) {
            let n = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(default);
            return n.clamp(1, MAX_COUNT);
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_intent() {
        assert_eq!(classify("Any crypto NEWS today?"), Intent::News);
        assert_eq!(classify("latest headlines"), Intent::News);
        assert_eq!(classify("what's the price of BTC"), Intent::Price);
        assert_eq!(classify("value of eth right now"), Intent::Price);
        assert_eq!(classify("top 10 coins"), Intent::Top);
        assert_eq!(classify("best cryptos"), Intent::Top);
        assert_eq!(classify("worst 5 coins"), Intent::Worst);
        assert_eq!(classify("biggest losers crypto"), Intent::Worst);
        assert_eq!(classify("trending coins"), Intent::Trending);
        assert_eq!(classify("hot 3 cryptos"), Intent::Trending);
        assert_eq!(classify("details on solana"), Intent::Detail);
        assert_eq!(classify("info dogecoin"), Intent::Detail);
        assert_eq!(classify("what is a blockchain?"), Intent::Unknown);
    }

    #[test]
    fn news_beats_price() {
        assert_eq!(classify("news about the price of bitcoin"), Intent::News);
    }

    #[test]
    fn coin_is_lowercased_word_after_of() {
        assert_eq!(extract_coin_from_price("Price of Shiba-Inu?").as_deref(), Some("shiba-inu"));
        assert_eq!(extract_coin_from_price("price please"), None);
    }

    #[test]
    fn counts_default_and_clamp() {
        assert_eq!(extract_count("top 5 coins", 10), 5);
        assert_eq!(extract_count("top coins", 10), 10);
        assert_eq!(extract_count("worst 99 coins", 10), 50);
        assert_eq!(extract_count("top 0 coins", 10), 1);
        assert_eq!(extract_count("trending 7 cryptos", 10), 7);
        assert_eq!(extract_count("hello", 10), 10);
    }
}
