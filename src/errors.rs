use serde::{Deserialize, Serialize};
use std::fmt;

/// Main result type for tutor runtime operations
pub type TutorResult<T> = Result<T, TutorError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ErrorCode {
    // General Errors
    Unknown,
    Timeout,
    Cancelled,
    ConfigError,

    // Validation Errors
    ValidationFailed,
    SchemaViolation,
    InvalidStepIndex,

    // Session & Flow Control
    SessionBusy,
    Throttled,
    RetryExhausted,
    SessionNotFound,

    // Tool Errors
    ToolNotFound,
    ToolInvalidParameters,
    ToolExecutionError,

    // Curriculum Errors
    ExerciseNotFound,
    NodeNotFound,
    HintLocked,

    // Submission Errors
    SubmissionNotFound,
    GradingError,

    // LLM Errors
    LLMError,
    LLMApiError,
    LLMInvalidResponse,
    LLMAuthentication,

    // Storage Errors
    DatabaseError,
    SerializationError,

    // Network Errors
    NetworkError,
    UpstreamServiceError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ErrorCategory {
    System,
    Configuration,
    Validation,
    Session,
    Tool,
    Curriculum,
    Grading,
    LLM,
    Cache,
    Network,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct TutorError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
}

impl TutorError {
    pub fn new(
        code: ErrorCode,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: &str,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for TutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.category, self.code, self.message)
    }
}

impl std::error::Error for TutorError {}

impl TutorError {
    /// Whether a retry with backoff is worthwhile for this error.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::LLMError
                | ErrorCode::LLMApiError
                | ErrorCode::NetworkError
                | ErrorCode::UpstreamServiceError
                | ErrorCode::Timeout
        )
    }

    /// Whether this error represents a silently absorbed duplicate request.
    pub fn is_throttle(&self) -> bool {
        matches!(self.code, ErrorCode::Throttled)
    }

    /// Whether this error was caused by malformed caller input. Never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ValidationFailed
                | ErrorCode::SchemaViolation
                | ErrorCode::InvalidStepIndex
                | ErrorCode::ToolInvalidParameters
        )
    }

    /// Whether the caller can simply try again later with state left intact.
    pub fn is_recoverable(&self) -> bool {
        match self.severity {
            ErrorSeverity::Low | ErrorSeverity::Medium => true,
            ErrorSeverity::High => matches!(
                self.code,
                ErrorCode::Timeout | ErrorCode::RetryExhausted | ErrorCode::SessionBusy
            ),
            ErrorSeverity::Critical => false,
        }
    }

    pub fn category(&self) -> &ErrorCategory {
        &self.category
    }

    pub fn severity(&self) -> &ErrorSeverity {
        &self.severity
    }

    /// Creates a validation error
    pub fn validation(message: &str) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            ErrorCategory::System,
            ErrorSeverity::Low,
            message,
        )
    }

    /// Creates a "session busy" error
    pub fn session_busy(session_id: &str) -> Self {
        Self::new(
            ErrorCode::SessionBusy,
            ErrorCategory::Session,
            ErrorSeverity::High,
            &format!("an orchestrator loop is already running for session {}", session_id),
        )
    }

    /// Creates a retry-exhaustion error
    pub fn retry_exhausted(message: &str) -> Self {
        Self::new(
            ErrorCode::RetryExhausted,
            ErrorCategory::System,
            ErrorSeverity::High,
            message,
        )
    }

    /// Creates a cancellation error
    pub fn cancelled(message: &str) -> Self {
        Self::new(
            ErrorCode::Cancelled,
            ErrorCategory::Session,
            ErrorSeverity::Low,
            message,
        )
    }

    /// Creates a database error
    pub fn database_error(message: &str) -> Self {
        Self::new(
            ErrorCode::DatabaseError,
            ErrorCategory::System,
            ErrorSeverity::High,
            message,
        )
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for TutorError {
    fn from(err: serde_json::Error) -> Self {
        TutorError::new(
            ErrorCode::SerializationError,
            ErrorCategory::System,
            ErrorSeverity::Medium,
            &format!("JSON serialization error: {}", err),
        )
    }
}

// Conversion from sqlx::Error
impl From<sqlx::Error> for TutorError {
    fn from(err: sqlx::Error) -> Self {
        TutorError::new(
            ErrorCode::DatabaseError,
            ErrorCategory::System,
            ErrorSeverity::High,
            &format!("database error: {}", err),
        )
    }
}
