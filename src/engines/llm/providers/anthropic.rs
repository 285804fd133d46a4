use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{timeout, Duration};

use crate::engines::llm::{types::*, LlmProvider};
use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Anthropic Messages API provider with tool-use support and typed error
/// classification.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorEnvelope {
    error: AnthropicErrorDetails,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_seconds: 60,
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Convert a runtime request into Anthropic wire format. Tool-role
    /// messages become user-role `tool_result` blocks; assistant tool
    /// requests become `tool_use` blocks.
    fn convert_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| match msg.role.as_str() {
                "tool" => AnthropicMessage {
                    role: "user".to_string(),
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    }],
                },
                role => {
                    let mut content = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    if let Some(calls) = &msg.tool_calls {
                        for call in calls {
                            content.push(ContentBlock::ToolUse {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                input: call.arguments.clone(),
                            });
                        }
                    }
                    if content.is_empty() {
                        content.push(ContentBlock::Text {
                            text: String::new(),
                        });
                    }
                    AnthropicMessage {
                        role: role.to_string(),
                        content,
                    }
                }
            })
            .collect();

        let tools = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                })
                .collect()
        });

        AnthropicRequest {
            model: request
                .config
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            max_tokens: request.config.max_tokens,
            temperature: request.config.temperature,
            system: request.system.clone(),
            messages,
            tools,
        }
    }

    fn convert_response(&self, response: AnthropicResponse) -> TutorResult<LlmResponse> {
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::ToolResult { .. } => {
                    return Err(TutorError::new(
                        ErrorCode::LLMInvalidResponse,
                        ErrorCategory::LLM,
                        ErrorSeverity::High,
                        "unexpected tool_result block in model response",
                    ));
                }
            }
        }

        let usage = response.usage.map(|u| TokenUsage {
            prompt: u.input_tokens,
            completion: u.output_tokens,
            total: u.input_tokens + u.output_tokens,
        });

        Ok(LlmResponse {
            content: text_parts.join(""),
            model: response.model,
            provider: "anthropic".to_string(),
            stop_reason: response.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            token_usage: usage,
        })
    }

    fn classify_status(status: StatusCode, detail: &str) -> TutorError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TutorError::new(
                ErrorCode::LLMAuthentication,
                ErrorCategory::LLM,
                ErrorSeverity::Critical,
                &format!("Anthropic authentication failed: {}", detail),
            ),
            StatusCode::TOO_MANY_REQUESTS => TutorError::new(
                ErrorCode::UpstreamServiceError,
                ErrorCategory::LLM,
                ErrorSeverity::Medium,
                &format!("Anthropic rate limited: {}", detail),
            ),
            s if s.is_server_error() => TutorError::new(
                ErrorCode::UpstreamServiceError,
                ErrorCategory::LLM,
                ErrorSeverity::Medium,
                &format!("Anthropic service error {}: {}", s, detail),
            ),
            s => TutorError::new(
                ErrorCode::LLMApiError,
                ErrorCategory::LLM,
                ErrorSeverity::High,
                &format!("Anthropic request rejected with {}: {}", s, detail),
            ),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: LlmRequest) -> TutorResult<LlmResponse> {
        let wire_request = self.convert_request(&request);
        let url = format!("{}/messages", self.base_url);

        let send = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&wire_request)
            .send();

        let response = timeout(Duration::from_secs(self.timeout_seconds), send)
            .await
            .map_err(|_| {
                TutorError::new(
                    ErrorCode::Timeout,
                    ErrorCategory::LLM,
                    ErrorSeverity::Medium,
                    &format!("model call timed out after {}s", self.timeout_seconds),
                )
            })?
            .map_err(|e| {
                TutorError::new(
                    ErrorCode::NetworkError,
                    ErrorCategory::Network,
                    ErrorSeverity::Medium,
                    &format!("model call failed: {}", e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<AnthropicErrorEnvelope>(&body)
                .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
                .unwrap_or(body);
            return Err(Self::classify_status(status, &detail));
        }

        let wire_response: AnthropicResponse = response.json().await.map_err(|e| {
            TutorError::new(
                ErrorCode::LLMInvalidResponse,
                ErrorCategory::LLM,
                ErrorSeverity::High,
                &format!("failed to parse Anthropic response: {}", e),
            )
        })?;

        self.convert_response(wire_response)
    }

    async fn health_check(&self) -> TutorResult<bool> {
        Ok(!self.api_key.is_empty())
    }
}
