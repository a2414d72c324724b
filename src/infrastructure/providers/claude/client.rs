//! Adapts the Claude Messages API to [`ModelProvider`] (spec §4.12).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;

use super::error::ClaudeApiError;
use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::RetryPolicy;
use super::types::{ContentBlock, Message, MessageContent, MessageRequest, MessageResponse, Tool};
use crate::domain::error::VigilError;
use crate::domain::ports::model_provider::{ChatRequest, ChatResponse, ModelProvider, Role, ToolCallRequest};

pub struct ClaudeProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub rate_limit_rps: f64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ClaudeProviderConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            rate_limit_rps: 10.0,
            max_retries: 3,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 300_000,
            timeout_secs: 300,
        }
    }
}

pub struct ClaudeProvider {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    rate_limiter: TokenBucketRateLimiter,
    retry_policy: RetryPolicy,
}

impl ClaudeProvider {
    pub fn new(config: ClaudeProviderConfig) -> Result<Self, VigilError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| VigilError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            max_tokens: config.max_tokens,
            rate_limiter: TokenBucketRateLimiter::new(config.rate_limit_rps),
            retry_policy: RetryPolicy::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms),
        })
    }

    fn to_wire(&self, request: &ChatRequest) -> MessageRequest {
        let mut system = None;
        let mut messages = Vec::with_capacity(request.messages.len());
        for m in &request.messages {
            match m.role {
                Role::System => system = Some(m.content.clone()),
                Role::User | Role::Assistant => {
                    messages.push(Message {
                        role: if m.role == Role::User { "user".to_string() } else { "assistant".to_string() },
                        content: MessageContent::Text(m.content.clone()),
                    });
                }
                Role::Tool => {
                    let tool_use_id = m.tool_call_id.clone().unwrap_or_default();
                    messages.push(Message {
                        role: "user".to_string(),
                        content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id,
                            content: m.content.clone(),
                            is_error: None,
                        }]),
                    });
                }
            }
        }

        let tools = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|t| Tool { name: t.name.clone(), description: t.description.clone(), input_schema: t.parameters.clone() })
                .collect()
        });

        MessageRequest { model: self.model.clone(), messages, max_tokens: self.max_tokens, system, tools }
    }

    fn from_wire(response: MessageResponse) -> ChatResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCallRequest { id, name, args: input }),
                ContentBlock::ToolResult { .. } => {}
            }
        }

        ChatResponse {
            content,
            tool_calls,
            model: response.model,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            thinking: None,
        }
    }

    async fn send_request(&self, request: &MessageRequest) -> Result<MessageResponse, anyhow::Error> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(anyhow::Error::new(ClaudeApiError::from_status(status, body)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ModelProvider for ClaudeProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, VigilError> {
        self.rate_limiter.acquire().await.map_err(VigilError::ModelTransport)?;

        let wire_request = self.to_wire(&request);
        let response = self
            .retry_policy
            .execute(|| self.send_request(&wire_request))
            .await
            .map_err(|e| VigilError::ModelTransport(e.to_string()))?;

        Ok(Self::from_wire(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::model_provider::ChatMessage;

    fn provider() -> ClaudeProvider {
        ClaudeProvider::new(ClaudeProviderConfig { api_key: "test".to_string(), ..Default::default() }).unwrap()
    }

    #[test]
    fn pulls_system_message_out_of_the_turn_sequence() {
        let provider = provider();
        let request = ChatRequest {
            messages: vec![ChatMessage::system("be terse"), ChatMessage::user("hi")],
            tools: vec![],
        };
        let wire = provider.to_wire(&request);
        assert_eq!(wire.system.as_deref(), Some("be terse"));
        assert_eq!(wire.messages.len(), 1);
    }

    #[test]
    fn maps_tool_result_message_to_tool_result_block() {
        let provider = provider();
        let request = ChatRequest { messages: vec![ChatMessage::tool_result("t1", "42")], tools: vec![] };
        let wire = provider.to_wire(&request);
        match &wire.messages[0].content {
            MessageContent::Blocks(blocks) => {
                assert!(matches!(&blocks[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "t1"));
            }
            MessageContent::Text(_) => panic!("expected blocks"),
        }
    }
}
