use tracing_subscriber::EnvFilter;

const QUIET_CRATES: &str = ",hyper=warn,reqwest=warn,redis=warn,warp=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info{QUIET_CRATES}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
