use serde_json::{json, Value};
use warp::{Rejection, Reply};

use crate::api::AppState;
use crate::config::Config;

pub fn base_url(config: &Config, host: Option<&str>, proto: Option<&str>) -> String {
    let scheme = proto
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("http");
    match host.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => format!("{scheme}://{host}"),
        None => format!("{scheme}://{}:{}", config.host, config.port),
    }
}

/// Agent card advertised to A2A platforms.
pub fn build_manifest(config: &Config, base_url: &str) -> Value {
    let base = base_url.trim_end_matches('/');
    let website = (!config.agent_website.is_empty()).then(|| config.agent_website.clone());
    json!({
        "name": config.agent_name,
        "description": config.agent_description,
        "version": config.agent_version,
        "publisher": config.agent_publisher,
        "website": website,

        "protocol": "jsonrpc-2.0",
        "runtime": "rust/warp",
        "endpoints": {
            "a2a": format!("{base}/invoke"),
            "health": format!("{base}/health"),
        },
        "methodsSupported": ["message/send", "invoke", "help"],

        "messageParts": ["text", "data"],
        "headersExpected": ["X-Telex-Org-Id", "X-Telex-User-Id", "X-Deployment-Label", "X-Session-Id"],

        "capabilities": {
            "topics": ["cryptocurrency", "defi", "nfts", "market-data", "headlines"],
            "grounding": ["CoinGecko", "CoinDesk RSS"],
            "responses": {"format": "markdown", "maxWords": 200, "disclaimer": "This is not financial advice."},
        }
    })
}

pub async fn agent_json(
    state: AppState,
    host: Option<String>,
    proto: Option<String>,
) -> Result<impl Reply, Rejection> {
    let base = base_url(&state.config, host.as_deref(), proto.as_deref());
    let manifest = build_manifest(&state.config, &base);
    Ok(warp::reply::with_header(
        warp::reply::json(&manifest),
        "cache-control",
        "public, max-age=300",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_prefers_forwarded_headers() {
        let cfg = Config::default();
        assert_eq!(base_url(&cfg, Some("agent.example.com"), Some("https")), "https://agent.example.com");
        assert_eq!(base_url(&cfg, Some("a.io"), Some("https, http")), "https://a.io");
        assert_eq!(base_url(&cfg, None, None), "http://0.0.0.0:8012");
    }

    #[test]
    fn manifest_points_at_endpoints() {
        let mut cfg = Config::default();
        cfg.agent_website.clear();
        let m = build_manifest(&cfg, "https://agent.example.com/");
        assert_eq!(m["endpoints"]["a2a"], "https://agent.example.com/invoke");
        assert_eq!(m["endpoints"]["health"], "https://agent.example.com/health");
        assert_eq!(m["website"], Value::Null);
        assert_eq!(m["name"], "CryptoSage AI");
        assert_eq!(m["capabilities"]["responses"]["maxWords"], 200);
    }
}
