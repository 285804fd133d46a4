use crate::engines::llm::LlmRetryConfig;
use serde::Deserialize;
use std::time::Duration;

/// Tunable limits for the session-orchestration layer.
///
/// Every bound the runtime enforces lives here: the tool-loop round cap, the
/// LLM retry policy, the submission cooldown, the grading poll backoff, and
/// the content cache TTL.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Hard cap on model round-trips within one user turn.
    pub max_tool_rounds: u32,
    /// Retries for a failed model call before the turn is surfaced as failed.
    pub llm_max_retries: u32,
    /// Base delay between model-call retries; doubles per attempt.
    pub llm_retry_delay_ms: u64,
    /// Window in which a duplicate submit for the same (user, exercise) is a
    /// silent no-op.
    pub submit_cooldown_ms: u64,
    /// First grading poll delay.
    pub poll_base_delay_ms: u64,
    /// Ceiling for the doubling poll delay.
    pub poll_max_delay_ms: u64,
    /// Poll ticks before grading is surfaced as "taking longer than expected".
    pub poll_max_attempts: u32,
    /// Wall-clock lifetime of a content cache entry.
    pub content_ttl_secs: u64,
}

impl RuntimeConfig {
    /// Retry policy handed to the model handler.
    pub fn llm_retry(&self) -> LlmRetryConfig {
        LlmRetryConfig {
            max_retries: self.llm_max_retries,
            retry_delay_ms: self.llm_retry_delay_ms,
        }
    }

    pub fn submit_cooldown(&self) -> Duration {
        Duration::from_millis(self.submit_cooldown_ms)
    }

    pub fn poll_base_delay(&self) -> Duration {
        Duration::from_millis(self.poll_base_delay_ms)
    }

    pub fn poll_max_delay(&self) -> Duration {
        Duration::from_millis(self.poll_max_delay_ms)
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            llm_max_retries: 3,
            llm_retry_delay_ms: 1000,
            submit_cooldown_ms: 2000,
            poll_base_delay_ms: 1000,
            poll_max_delay_ms: 15_000,
            poll_max_attempts: 8,
            content_ttl_secs: 24 * 60 * 60,
        }
    }
}
