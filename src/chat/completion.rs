//! Chat-completion client (Azure OpenAI deployment API).

use super::transcript::{Message, ToolCall};
use crate::config::CompletionConfig;
use crate::error::{BridgeError, ConfigError};
use crate::mcp::FunctionTool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// The model's answer to one completion request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ToolCall>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Request the next assistant message. An empty `tools` slice disables tool calling.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[FunctionTool],
    ) -> Result<AssistantReply, BridgeError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [FunctionTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_completion_tokens: u32,
}

impl<'a> CompletionRequest<'a> {
    fn new(messages: &'a [Message], tools: &'a [FunctionTool], max_completion_tokens: u32) -> Self {
        let with_tools = !tools.is_empty();
        Self {
            messages,
            tools: with_tools.then_some(tools),
            tool_choice: with_tools.then_some("auto"),
            max_completion_tokens,
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantReply,
}

pub struct AzureCompletionClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    max_completion_tokens: u32,
}

impl AzureCompletionClient {
    pub fn new(http: reqwest::Client, config: &CompletionConfig) -> Result<Self, ConfigError> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint()?.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );
        Ok(Self {
            http,
            url,
            api_key: config.api_key()?.to_string(),
            max_completion_tokens: config.max_completion_tokens,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionApi for AzureCompletionClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[FunctionTool],
    ) -> Result<AssistantReply, BridgeError> {
        debug!(messages = messages.len(), tools = tools.len(), "Requesting completion");
        let body = CompletionRequest::new(messages, tools, self.max_completion_tokens);
        let res = self
            .http
            .post(&self.url)
            .timeout(COMPLETION_TIMEOUT)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            return Err(BridgeError::Status {
                service: "completion API",
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let parsed: CompletionResponse =
            serde_json::from_slice(&bytes).map_err(|source| BridgeError::Decode {
                what: "completion response",
                source,
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(BridgeError::EmptyCompletion)
    }
}
