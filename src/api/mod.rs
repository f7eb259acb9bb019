use std::convert::Infallible;
use std::sync::Arc;

use warp::Filter;

use crate::agent::Agent;
use crate::config::Config;

pub mod handlers;
pub mod server;

/// Shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(agent: Agent, config: Config) -> Self {
        AppState {
            agent: Arc::new(agent),
            config: Arc::new(config),
        }
    }
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
