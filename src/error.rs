use thiserror::Error;

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Failures of the agent's upstream dependencies.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("rss feed: {0}")]
    Feed(#[from] rss::Error),

    #[error("language model: {0}")]
    Model(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("WRONGTYPE operation against key {0} holding the wrong kind of value")]
    WrongType(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("prompt template: {0}")]
    Prompt(#[from] std::io::Error),
}

impl AgentError {
    pub fn status(service: &'static str, status: reqwest::StatusCode) -> Self {
        AgentError::Status { service, status }
    }
}
