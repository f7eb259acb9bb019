use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info};
use warp::http::HeaderMap;
use warp::{Rejection, Reply};

use crate::a2a::jsonrpc::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};
use crate::a2a::{parse_envelope, session_id, telex, Envelope, InvokeParams, RpcResponse, SessionHints, TaskResult};
use crate::agent::{TurnError, TurnRequest};
use crate::api::AppState;

/// Largest accepted request body.
pub const MAX_BODY: usize = 64 * 1024;

pub const HELP_TEXT: &str = "**CryptoSage — A2A Agent**\n\n\
I can answer crypto questions:\n\
- `price of <coin>`\n\
- `top 10 coins` / `worst 5 coins`\n\
- `trending coins`\n\
- `news`\n\
- `details on <coin>`\n\n\
_All data via free public APIs. This is not financial advice._";

pub async fn invoke(state: AppState, headers: HeaderMap, body: Bytes) -> Result<impl Reply, Rejection> {
    let response = dispatch(&state, &headers, &body).await;
    Ok(warp::reply::json(&response))
}

/// `POST /help`; the body is optional and only consulted for its `id`.
pub async fn help(body: Bytes) -> Result<impl Reply, Rejection> {
    let id = (body.len() <= MAX_BODY)
        .then(|| serde_json::from_slice::<Value>(&body).ok())
        .flatten()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null);
    Ok(warp::reply::json(&RpcResponse::message(id, HELP_TEXT)))
}

pub async fn dispatch(state: &AppState, headers: &HeaderMap, body: &[u8]) -> RpcResponse {
    if body.len() > MAX_BODY {
        return RpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid Request: body exceeds 64 KiB");
    }
    let envelope = match parse_envelope(body) {
        Ok(envelope) => envelope,
        Err(response) => return response,
    };
    match envelope.method.as_str() {
        "help" => RpcResponse::message(envelope.id, HELP_TEXT),
        "invoke" => invoke_method(state, headers, envelope).await,
        "message/send" => message_send(state, headers, envelope).await,
        _ => RpcResponse::error(envelope.id, METHOD_NOT_FOUND, "Method not found"),
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn meta_label(meta: Option<&serde_json::Map<String, Value>>) -> Option<&str> {
    meta.and_then(|m| m.get("deployment_label"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn run_turn(state: &AppState, turn: TurnRequest) -> Result<String, RpcFailure> {
    match AssertUnwindSafe(state.agent.respond(&turn)).catch_unwind().await {
        Ok(Ok(content)) => Ok(content),
        Ok(Err(e)) => Err(RpcFailure::Turn(e)),
        Err(_) => {
            error!(session = %turn.session_id, "[invoke] agent panicked");
            Err(RpcFailure::Internal)
        }
    }
}

enum RpcFailure {
    Turn(TurnError),
    Internal,
}

impl RpcFailure {
    fn into_response(self, id: Value) -> RpcResponse {
        match self {
            RpcFailure::Turn(e) => RpcResponse::error(id, e.code(), e.message()),
            RpcFailure::Internal => RpcResponse::error(id, INTERNAL_ERROR, "Internal error"),
        }
    }
}

async fn invoke_method(state: &AppState, headers: &HeaderMap, envelope: Envelope) -> RpcResponse {
    let Envelope { id, params, .. } = envelope;
    let params: InvokeParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(_) => return RpcResponse::error(id, INVALID_PARAMS, "Invalid params: 'text' is required"),
    };
    let text = params.text.trim();
    if text.is_empty() {
        return RpcResponse::error(id, INVALID_PARAMS, "Invalid params: 'text' is required");
    }
    let temperature = match params.temperature {
        Some(t) if !(0.0..=1.0).contains(&t) => {
            return RpcResponse::error(id, INVALID_PARAMS, "Invalid params: 'temperature' must be within [0, 1]")
        }
        Some(t) => t,
        None => state.config.temperature,
    };

    let deployment_label = meta_label(params.metadata.as_ref())
        .or_else(|| header_str(headers, "x-deployment-label"))
        .unwrap_or(&state.config.deployment_label)
        .to_string();
    let hints = SessionHints {
        user_id: params.user_id.as_deref(),
        org_id: params.org_id.as_deref(),
        channel_id: params.channel_id.as_deref(),
        metadata: params.metadata.as_ref(),
    };

    let turn = TurnRequest {
        session_id: session_id(&hints, headers),
        text: text.to_string(),
        deployment_label,
        temperature,
        inline_history: Vec::new(),
    };
    match run_turn(state, turn).await {
        Ok(content) => RpcResponse::message(id, content),
        Err(failure) => failure.into_response(id),
    }
}

async fn message_send(state: &AppState, headers: &HeaderMap, envelope: Envelope) -> RpcResponse {
    let Envelope { id, params, .. } = envelope;
    if !params.is_object() {
        return RpcResponse::error(id, INVALID_PARAMS, "Invalid params for message/send");
    }
    info!(kinds = ?telex::part_kinds(&params), "[telex] message received");

    let extracted = telex::extract(&params);
    let Some(text) = extracted.text else {
        return RpcResponse::error(id, INVALID_PARAMS, "No text provided in Telex message.");
    };
    info!(dbg = %extracted.debug, "[telex] extracted text");

    let meta = params.get("metadata").and_then(Value::as_object);
    let deployment_label = header_str(headers, "x-deployment-label")
        .or_else(|| meta_label(meta))
        .unwrap_or(&state.config.deployment_label)
        .to_string();
    let hints = SessionHints {
        metadata: meta,
        ..Default::default()
    };
    let (context_id, task_id) = telex::conversation_ids(&params);

    let turn = TurnRequest {
        session_id: session_id(&hints, headers),
        text: text.clone(),
        deployment_label,
        temperature: state.config.temperature,
        inline_history: extracted.inline_history,
    };
    match run_turn(state, turn).await {
        Ok(content) => {
            let task = TaskResult::completed(
                &content,
                context_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                Some(&text),
            );
            RpcResponse::task(id, task)
        }
        Err(failure) => failure.into_response(id),
    }
}
