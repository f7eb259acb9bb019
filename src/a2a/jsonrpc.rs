use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// `type: message` result returned by `invoke` and `help`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageResult {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub format: &'static str,
    pub content: String,
}

impl MessageResult {
    pub fn markdown(content: impl Into<String>) -> Self {
        MessageResult {
            kind: "message",
            format: "markdown",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub kind: &'static str,
    pub text: String,
}

impl Part {
    fn text(text: &str) -> Self {
        Part {
            kind: "text",
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    pub kind: &'static str,
    pub role: &'static str,
    pub parts: Vec<Part>,
    pub message_id: String,
    pub task_id: Option<String>,
    pub metadata: Option<Value>,
}

impl A2aMessage {
    fn new(role: &'static str, text: &str) -> Self {
        A2aMessage {
            kind: "message",
            role,
            parts: vec![Part::text(text)],
            message_id: Uuid::new_v4().to_string(),
            task_id: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub state: &'static str,
    pub timestamp: String,
    pub message: A2aMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    pub parts: Vec<Part>,
}

/// Completed A2A task carrying the agent's reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    pub artifacts: Vec<Artifact>,
    pub history: Vec<A2aMessage>,
    pub kind: &'static str,
}

impl TaskResult {
    pub fn completed(content: &str, context_id: String, task_id: String, user_echo: Option<&str>) -> Self {
        TaskResult {
            id: task_id,
            context_id,
            status: TaskStatus {
                state: "completed",
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                message: A2aMessage::new("agent", content),
            },
            artifacts: vec![Artifact {
                artifact_id: Uuid::new_v4().to_string(),
                name: "assistantResponse".to_string(),
                parts: vec![Part::text(content)],
            }],
            history: user_echo
                .map(|text| vec![A2aMessage::new("user", text)])
                .unwrap_or_default(),
            kind: "task",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcResult {
    Message(MessageResult),
    Task(Box<TaskResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RpcResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn message(id: Value, content: impl Into<String>) -> Self {
        Self::result(id, RpcResult::Message(MessageResult::markdown(content)))
    }

    pub fn task(id: Value, task: TaskResult) -> Self {
        Self::result(id, RpcResult::Task(Box::new(task)))
    }

    fn result(id: Value, result: RpcResult) -> Self {
        RpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        RpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// A request whose envelope passed validation; `params` is still raw.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

/// Decode a JSON-RPC request without rejecting at the HTTP layer.
pub fn parse_envelope(body: &[u8]) -> Result<Envelope, RpcResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| RpcResponse::error(Value::Null, PARSE_ERROR, "Parse error"))?;
    let Value::Object(mut obj) = value else {
        return Err(RpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid Request"));
    };

    let id = obj.remove("id").unwrap_or(Value::Null);
    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(RpcResponse::error(id, INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""));
    }
    let method = match obj.remove("method") {
        Some(Value::String(m)) => m,
        _ => return Err(RpcResponse::error(id, INVALID_REQUEST, "Invalid Request: method is required")),
    };
    Ok(Envelope {
        id,
        method,
        params: obj.remove("params").unwrap_or(Value::Null),
    })
}

/// Parameters of the `invoke` method.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvokeParams {
    pub text: String,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub temperature: Option<f32>,
}
