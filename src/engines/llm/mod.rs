pub mod providers;
pub mod types;

use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use types::{LlmRequest, LlmResponse};

/// Trait for model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Complete a request
    async fn complete(&self, request: LlmRequest) -> TutorResult<LlmResponse>;

    /// Health check
    async fn health_check(&self) -> TutorResult<bool> {
        Ok(true)
    }
}

/// Retry policy for model calls.
#[derive(Debug, Clone)]
pub struct LlmRetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for LlmRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Model handler that wraps a provider with bounded-backoff retry.
///
/// Transient provider failures are retried with a doubling delay up to
/// `max_retries`; validation and authentication failures are surfaced
/// immediately.
pub struct LlmHandler {
    provider: Arc<dyn LlmProvider>,
    config: LlmRetryConfig,
}

impl LlmHandler {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmRetryConfig) -> Self {
        Self { provider, config }
    }

    /// Build a handler from the environment, registering the Anthropic
    /// provider when `ANTHROPIC_API_KEY` is set. The retry policy comes from
    /// the caller, typically [`RuntimeConfig::llm_retry`](crate::config::RuntimeConfig::llm_retry).
    pub fn from_env(retry: LlmRetryConfig) -> TutorResult<Self> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => {
                let provider = providers::anthropic::AnthropicProvider::new(api_key);
                Ok(Self::new(Arc::new(provider), retry))
            }
            _ => Err(TutorError::new(
                ErrorCode::ConfigError,
                ErrorCategory::Configuration,
                ErrorSeverity::High,
                "ANTHROPIC_API_KEY is required in environment configuration",
            )),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Complete a model request, retrying transient failures.
    pub async fn complete(&self, request: LlmRequest) -> TutorResult<LlmResponse> {
        let mut attempt: u32 = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    tracing::debug!(
                        provider = self.provider.name(),
                        model = %response.model,
                        stop_reason = %response.stop_reason,
                        "model call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retriable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay =
                        Duration::from_millis(self.config.retry_delay_ms << (attempt - 1));
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Simple one-shot inference without tools.
    pub async fn inference(&self, prompt: &str, config: types::LlmConfig) -> TutorResult<String> {
        let request = LlmRequest {
            system: None,
            messages: vec![types::LlmMessage::user(prompt)],
            tools: None,
            config,
        };
        let response = self.complete(request).await?;
        Ok(response.content)
    }

    pub async fn health_check(&self) -> TutorResult<bool> {
        self.provider.health_check().await
    }
}
