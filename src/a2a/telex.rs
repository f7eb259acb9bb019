//! Telex `message/send` payloads.
//!
//! Telex sends the current message as `parts[0]` and recent channel messages
//! (often as HTML) as `parts[1].data`. The newest data item is the message the
//! user just typed, so it is preferred over `parts[0]`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static TAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const INLINE_HISTORY_LIMIT: usize = 20;

/// Decode entities, drop markup, collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = TAGS_RE.replace_all(&decoded, " ");
    WS_RE.replace_all(&stripped, " ").trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub text: Option<String>,
    /// Earlier messages, oldest first, not including `text`.
    pub inline_history: Vec<String>,
    /// Short summary for logs.
    pub debug: String,
}

fn part_of_kind<'a>(parts: &'a [Value], idx: usize, kind: &str) -> Option<&'a Value> {
    parts
        .get(idx)
        .filter(|p| p.get("kind").and_then(Value::as_str) == Some(kind))
}

fn text_field(v: &Value) -> &str {
    v.get("text").and_then(Value::as_str).unwrap_or_default()
}

pub fn extract(params: &Value) -> Extracted {
    let message = params.get("message").unwrap_or(&Value::Null);
    let parts: &[Value] = message
        .get("parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut out = Extracted::default();
    let mut debug = Vec::new();

    if let Some(data) = part_of_kind(parts, 1, "data") {
        let cleaned: Vec<String> = data
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|item| item.get("kind").and_then(Value::as_str) == Some("text"))
            .map(|item| clean_text(text_field(item)))
            .filter(|t| !t.is_empty())
            .collect();
        debug.push(format!("data_text_count={}", cleaned.len()));

        let start = cleaned.len().saturating_sub(INLINE_HISTORY_LIMIT);
        out.inline_history = cleaned[start..].to_vec();
        if let Some(last) = out.inline_history.pop() {
            out.text = Some(last);
            debug.push("source=data:last".to_string());
        }
    }

    if out.text.is_none() {
        if let Some(first) = part_of_kind(parts, 0, "text") {
            let t = clean_text(text_field(first));
            if !t.is_empty() {
                out.text = Some(t);
                debug.push("source=parts0".to_string());
            }
        }
    }

    if out.text.is_none() {
        let t = clean_text(text_field(message));
        if !t.is_empty() {
            out.text = Some(t);
            debug.push("source=message.text".to_string());
        }
    }

    out.debug = debug.join(";");
    out
}

/// `contextId`/`taskId` from the message, then from params.
pub fn conversation_ids(params: &Value) -> (Option<String>, Option<String>) {
    let message = params.get("message").unwrap_or(&Value::Null);
    let pick = |key: &str| {
        message
            .get(key)
            .or_else(|| params.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    (pick("contextId"), pick("taskId"))
}

/// Kinds of the first three parts, for logging.
pub fn part_kinds(params: &Value) -> Vec<String> {
    params
        .pointer("/message/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .take(3)
        .map(|p| p.get("kind").and_then(Value::as_str).unwrap_or("?").to_string())
        .collect()
}
