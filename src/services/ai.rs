use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::prompt::SystemPrompt;
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::store::Turn;

const HISTORY_WINDOW: usize = 30;
const FACT_VALUE_LIMIT: usize = 1000;
const FALLBACK_MAX_TOKENS: u32 = 220;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Chat completions against an Azure OpenAI deployment.
pub struct AzureOpenAi {
    endpoint: String,
    api_key: String,
    api_version: String,
    deployment: String,
    http: Client,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl AzureOpenAi {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(AzureOpenAi {
            endpoint: config.azure_openai_endpoint.trim_end_matches('/').to_string(),
            api_key: config.azure_openai_api_key.clone(),
            api_version: config.azure_openai_api_version.clone(),
            deployment: config.azure_openai_deployment.clone(),
            http,
        })
    }
}

#[async_trait]
impl ChatModel for AzureOpenAi {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if self.endpoint.is_empty() || self.api_key.is_empty() || self.deployment.is_empty() {
            return Err(AgentError::NotConfigured("azure openai"));
        }
        let url = format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        );
        let resp = self
            .http
            .post(url)
            .query(&[("api-version", &self.api_version)])
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::status("azure openai", resp.status()));
        }
        let completion: Completion = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| AgentError::Model("completion had no content".into()))
    }
}

/// Ordered grounding data handed to the model as a `[FACTS]` message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facts(Vec<(&'static str, Value)>);

impl Facts {
    pub fn new(deployment_label: &str) -> Self {
        Facts::default().with("deployment_label", deployment_label)
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.0.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn deployment_label(&self) -> &str {
        self.get("deployment_label")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn render(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let mut lines = vec!["[FACTS]".to_string()];
        for (key, value) in &self.0 {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("- {}: {}", key, clip(&text)));
        }
        Some(lines.join("\n"))
    }
}

fn clip(text: &str) -> String {
    match text.char_indices().nth(FACT_VALUE_LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Turns history, facts and the user's words into a model reply.
pub struct Composer {
    model: Arc<dyn ChatModel>,
    prompt: SystemPrompt,
    max_tokens: u32,
}

impl Composer {
    pub fn new(model: Arc<dyn ChatModel>, prompt: SystemPrompt, max_tokens: u32) -> Self {
        Composer {
            model,
            prompt,
            max_tokens,
        }
    }

    pub fn messages(&self, user_text: &str, history: &[Turn], facts: &Facts) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new(
            "system",
            self.prompt.render(facts.deployment_label()),
        )];

        let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
        for turn in recent {
            let user = turn.user.trim();
            let assistant = turn.assistant.trim();
            if !user.is_empty() {
                messages.push(ChatMessage::new("user", user));
            }
            if !assistant.is_empty() {
                messages.push(ChatMessage::new("assistant", assistant));
            }
        }

        if let Some(block) = facts.render() {
            messages.push(ChatMessage::new("user", block));
        }
        messages.push(ChatMessage::new("user", user_text));
        messages
    }

    pub async fn compose(
        &self,
        user_text: &str,
        history: &[Turn],
        facts: &Facts,
        temperature: f32,
    ) -> Result<String> {
        self.complete(user_text, history, facts, temperature, self.max_tokens)
            .await
    }

    /// Free-form answer for messages that match no intent.
    pub async fn fallback_answer(
        &self,
        user_text: &str,
        history: &[Turn],
        facts: &Facts,
        temperature: f32,
    ) -> Result<String> {
        self.complete(user_text, history, facts, temperature, FALLBACK_MAX_TOKENS)
            .await
    }

    async fn complete(
        &self,
        user_text: &str,
        history: &[Turn],
        facts: &Facts,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            messages: self.messages(user_text, history, facts),
            temperature,
            max_tokens,
        };
        let content = self.model.complete(&request).await?;
        if content.trim().is_empty() {
            return Err(AgentError::Model("empty completion".into()));
        }
        Ok(content)
    }
}
