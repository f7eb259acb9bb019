use serde::Serialize;
use warp::{Rejection, Reply};

use crate::api::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub redis: bool,
    pub version: &'static str,
}

pub async fn root() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "name": "CryptoSage A2A",
        "status": "ok",
    })))
}

pub async fn health(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&Health {
        status: "ok",
        redis: state.agent.storage_backend() == "redis",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
