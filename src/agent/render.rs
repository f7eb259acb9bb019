//! Deterministic Markdown used when the language model is unavailable.

use crate::services::coingecko::{CoinDetail, MarketCoin, TrendingCoin};

pub const DISCLAIMER: &str = "_This is not financial advice._";
pub const SORRY: &str = "Sorry, I couldn’t process that just now.";
pub const HEADLINES_UNAVAILABLE: &str = "⚠️ Couldn’t fetch headlines right now.";

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `1234.5` as `1,234.50`, keeping the sign.
fn grouped(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, group_thousands(int), frac)
}

pub fn usd(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let g = grouped(v);
            match g.strip_prefix('-') {
                Some(rest) => format!("-${rest}"),
                None => format!("${g}"),
            }
        }
        _ => "N/A".to_string(),
    }
}

pub fn percent_change(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let g = grouped(v);
            if g.starts_with('-') {
                format!("{g}%")
            } else {
                format!("+{g}%")
            }
        }
        _ => "N/A".to_string(),
    }
}

pub fn list_title(worst: bool, n: usize) -> String {
    if worst {
        format!("Worst {n} coins (24h)")
    } else {
        format!("Top {n} coins by market cap")
    }
}

pub fn market_list(title: &str, coins: &[MarketCoin]) -> String {
    let lines: Vec<String> = coins
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let name = if c.name.is_empty() { &c.id } else { &c.name };
            let change = c
                .price_change_percentage_24h
                .map(|p| format!(" ({})", percent_change(Some(p))))
                .unwrap_or_default();
            format!(
                "{}. **{} ({})** — {}{}",
                i + 1,
                name,
                c.symbol.to_uppercase(),
                usd(c.current_price),
                change
            )
        })
        .collect();
    format!("**{}**\n\n{}\n\n{}", title, lines.join("\n"), DISCLAIMER)
}

pub fn trending_list(coins: &[TrendingCoin]) -> String {
    let lines: Vec<String> = coins
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. {} ({})",
                i + 1,
                c.name.as_deref().unwrap_or("?"),
                c.symbol.as_deref().unwrap_or_default().to_uppercase()
            )
        })
        .collect();
    format!("**Trending coins**\n\n{}\n\n{}", lines.join("\n"), DISCLAIMER)
}

pub fn price_line(coin: &str, price: f64) -> String {
    format!(
        "**{}** is trading at **{}** (CoinGecko).\n\n{}",
        coin,
        usd(Some(price)),
        DISCLAIMER
    )
}

pub fn headlines(titles: &[String]) -> String {
    let lines: Vec<String> = titles.iter().map(|t| format!("- {t}")).collect();
    format!(
        "**Latest crypto headlines**\n\n{}\n\n_Source: CoinDesk RSS_",
        lines.join("\n")
    )
}

pub fn detail(d: &CoinDetail) -> String {
    format!(
        "**{} ({})**\n\n- Price: {}\n- Market cap: {}\n- 24h volume: {}\n- 24h change: {}\n\n{}",
        d.name,
        d.symbol,
        usd(d.price),
        usd(d.market_cap),
        usd(d.volume_24h),
        percent_change(d.change_24h),
        DISCLAIMER
    )
}
