use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Conversation context a session is bound to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Planning,
    About,
    Teacher,
    Exercise,
    LearningQa,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Planning => "planning",
            ContextType::About => "about",
            ContextType::Teacher => "teacher",
            ContextType::Exercise => "exercise",
            ContextType::LearningQa => "learning_qa",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(ContextType::Planning),
            "about" => Some(ContextType::About),
            "teacher" => Some(ContextType::Teacher),
            "exercise" => Some(ContextType::Exercise),
            "learning_qa" => Some(ContextType::LearningQa),
            _ => None,
        }
    }

    /// Contexts that always run the tool-enabled orchestrator loop,
    /// skipping intent classification.
    pub fn always_uses_tools(&self) -> bool {
        matches!(
            self,
            ContextType::Planning | ContextType::Teacher | ContextType::Exercise
        )
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies a (user, context) pair for one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub user_id: String,
    pub context_type: ContextType,
    pub context_id: String,
}

impl SessionContext {
    pub fn new(user_id: &str, context_type: ContextType, context_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            context_type,
            context_id: context_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// One immutable transcript entry. Ordering is by `sequence` within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Structured component payload for the frontend (rendered cards,
    /// simulated code output, interactive widgets).
    pub component: Option<serde_json::Value>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: &str) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            component: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_component(mut self, component: serde_json::Value) -> Self {
        self.component = Some(component);
        self
    }
}

/// Structured action emitted by a turn; the caller routes these to the
/// node selector, content cache, or grading pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatAction {
    NavigateToExercise {
        exercise_id: String,
        reason: String,
    },
    NavigateToNode {
        node_id: String,
        reason: String,
    },
    DisplayContent {
        content_id: String,
    },
    CompletePath {
        path_id: String,
    },
}

/// Result of one orchestrated user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    pub reply: String,
    pub actions: Vec<ChatAction>,
    /// Number of model round-trips the turn took.
    pub rounds: u32,
    /// Messages appended to the transcript by this turn.
    pub messages_appended: usize,
}

/// Result payload of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: &str) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// Extracts a structured action from the result payload, if the tool
    /// emitted one.
    pub fn action(&self) -> Option<ChatAction> {
        self.result
            .as_ref()
            .and_then(|v| v.get("action"))
            .and_then(|a| serde_json::from_value(a.clone()).ok())
    }
}

/// A single rung of an exercise's hint ladder. Hint k is revealable once the
/// caller's recorded attempt count meets `reveal_threshold`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hint {
    pub text: String,
    pub reveal_threshold: u32,
}

/// An authored exercise. Immutable once stored; submissions reference it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub exercise_id: String,
    pub node_id: String,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub exercise_type: String,
    pub difficulty: String,
    pub starter_code: String,
    pub solution: Option<String>,
    pub hints: Vec<Hint>,
    pub created_for_user: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitting,
    Grading,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitting => "submitting",
            SubmissionStatus::Grading => "grading",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitting" => Some(SubmissionStatus::Submitting),
            "grading" => Some(SubmissionStatus::Grading),
            "completed" => Some(SubmissionStatus::Completed),
            "failed" => Some(SubmissionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-criterion scores for a graded submission, each 0-100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradingBreakdown {
    pub correctness: u32,
    pub quality: u32,
    pub efficiency: u32,
    pub best_practices: u32,
}

impl GradingBreakdown {
    /// Per-criterion pass/fail at the same 70-point bar as the overall score.
    pub fn criteria_passed(&self) -> HashMap<&'static str, bool> {
        let mut map = HashMap::new();
        map.insert("correctness", self.correctness >= 70);
        map.insert("quality", self.quality >= 70);
        map.insert("efficiency", self.efficiency >= 70);
        map.insert("best_practices", self.best_practices >= 70);
        map
    }
}

/// Grading verdict. Never mutated once attached to a submission; a
/// re-submission produces a fresh submission row with its own verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub score: u32,
    pub passed: bool,
    pub breakdown: GradingBreakdown,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub next_steps: String,
    pub graded_by: String,
}

/// Classification of a completed submission, used to pick the next action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Perfect,
    PassedWithWeaknesses,
    NeedsRemediation,
    Failed,
}

impl SubmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionOutcome::Perfect => "perfect",
            SubmissionOutcome::PassedWithWeaknesses => "passed_with_weaknesses",
            SubmissionOutcome::NeedsRemediation => "needs_remediation",
            SubmissionOutcome::Failed => "failed",
        }
    }
}

/// Recommended follow-up after a graded submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextAction {
    NavigateToNode { node_id: String, reason: String },
    NavigateToExercise { exercise_id: String, reason: String },
    Retry { show_hint_button: bool },
    CompletePath,
}

/// Persistent submission record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub exercise_id: String,
    pub user_id: String,
    pub session_id: String,
    pub code: String,
    pub language: String,
    pub attempt_number: u32,
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    pub outcome: Option<SubmissionOutcome>,
    pub next_action: Option<NextAction>,
    pub created_at: i64,
    pub graded_at: Option<i64>,
}

/// Per (user, exercise) hint/attempt counters. Monotonic within a session;
/// reset only on explicit exercise restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HintState {
    pub user_id: String,
    pub exercise_id: String,
    pub attempts: u32,
    pub hints_used: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::NotStarted => "not_started",
            NodeStatus::InProgress => "in_progress",
            NodeStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(NodeStatus::NotStarted),
            "in_progress" => Some(NodeStatus::InProgress),
            "completed" => Some(NodeStatus::Completed),
            _ => None,
        }
    }
}

/// Per (user, node) progress pointer. Updated by navigation actions, never by
/// content fetches alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeProgress {
    pub user_id: String,
    pub node_id: String,
    pub status: NodeStatus,
    pub current_step: u32,
    pub completion_percentage: u32,
}

/// A curriculum topic node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningNode {
    pub node_id: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub estimated_duration_minutes: u32,
    pub prerequisites: Vec<String>,
    pub concepts: Vec<String>,
    pub learning_objectives: Vec<String>,
}

impl LearningNode {
    /// Nodes are grouped into paths by id prefix ("python-variables" belongs
    /// to path "python").
    pub fn path_id(&self) -> &str {
        path_id_of(&self.node_id)
    }
}

pub fn path_id_of(node_id: &str) -> &str {
    node_id.split('-').next().unwrap_or(node_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    pub path_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeakPoint {
    pub topic: String,
    pub occurrences: u32,
    pub last_seen: i64,
}

/// Learner profile used for prompt personalization and difficulty defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub experience_level: String,
    pub learning_style: String,
    pub learning_goals: Vec<String>,
    pub weak_points: Vec<WeakPoint>,
    pub total_exercises_completed: u32,
    pub total_exercises_failed: u32,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            experience_level: "beginner".to_string(),
            learning_style: "mixed".to_string(),
            learning_goals: Vec::new(),
            weak_points: Vec::new(),
            total_exercises_completed: 0,
            total_exercises_failed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    LectureSection,
    Exercise,
}

/// Ordered metadata for one curriculum step of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepMeta {
    pub step_number: u32,
    pub step_type: StepType,
    pub title: String,
}

/// Materialized content for one curriculum step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepContent {
    pub step_number: u32,
    pub title: String,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_type_round_trip() {
        for ct in [
            ContextType::Planning,
            ContextType::About,
            ContextType::Teacher,
            ContextType::Exercise,
            ContextType::LearningQa,
        ] {
            assert_eq!(ContextType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ContextType::parse("bogus"), None);
    }

    #[test]
    fn test_tool_result_action_extraction() {
        let result = ToolResult::ok(serde_json::json!({
            "action": {
                "type": "navigate_to_exercise",
                "exercise_id": "python-basics-ex1",
                "reason": "ready to practice"
            }
        }));
        assert_eq!(
            result.action(),
            Some(ChatAction::NavigateToExercise {
                exercise_id: "python-basics-ex1".to_string(),
                reason: "ready to practice".to_string(),
            })
        );
        assert_eq!(ToolResult::failure("boom").action(), None);
    }

    #[test]
    fn test_path_id_from_node_id() {
        assert_eq!(path_id_of("python-variables"), "python");
        assert_eq!(path_id_of("rust"), "rust");
    }

    #[test]
    fn test_breakdown_criteria_bar() {
        let breakdown = GradingBreakdown {
            correctness: 90,
            quality: 70,
            efficiency: 69,
            best_practices: 0,
        };
        let passed = breakdown.criteria_passed();
        assert!(passed["correctness"]);
        assert!(passed["quality"]);
        assert!(!passed["efficiency"]);
        assert!(!passed["best_practices"]);
    }
}
