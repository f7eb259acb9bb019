use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};
use warp::{Filter, Rejection, Reply};

use crate::api::{handlers, with_state, AppState};

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let root = warp::path::end().and(warp::get()).and_then(handlers::root);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::health);

    let invoke = warp::path("invoke")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(handlers::invoke);

    let help = warp::path("help")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and_then(handlers::help);

    let card = warp::path("agent.json")
        .and(warp::path::end())
        .or(warp::path(".well-known").and(warp::path("agent.json")).and(warp::path::end()))
        .unify()
        .and(warp::get())
        .and(with_state(state))
        .and(warp::header::optional::<String>("host"))
        .and(warp::header::optional::<String>("x-forwarded-proto"))
        .and_then(handlers::agent_json);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec![
            "content-type",
            "x-deployment-label",
            "x-session-id",
            "x-telex-user-id",
            "x-telex-org-id",
            "x-user-id",
            "x-org-id",
            "x-workspace-id",
        ]);

    root.or(health)
        .or(invoke)
        .or(help)
        .or(card)
        .with(cors)
        .with(warp::trace::request())
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%bound, "CryptoSage A2A listening");
    server.await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                warn!("signal handlers unavailable, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received, stopping server");
}
