// createLearningNode: add a topic node to a learning path.
//
// In the planning context, node creation is gated on the assistant having
// actually interviewed the learner first. The gate scans recent assistant
// messages for discovery questions and requires at least two before any
// node can be created.

use crate::database::{MessageOps, NodeOps};
use crate::engines::llm::types::ToolDefinition;
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::{ChatMessage, LearningNode, MessageRole, ToolResult};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

const RECENT_MESSAGE_WINDOW: u32 = 10;
const REQUIRED_DISCOVERY_QUESTIONS: usize = 2;

fn discovery_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)what.*\b(goal|learn|build|interest|topic)",
            r"(?i)how (much|many|long|often)\b",
            r"(?i)\b(experience|background|familiar|comfortable)\b",
            r"(?i)\b(beginner|intermediate|advanced)\b.*\?",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Count discovery questions among recent assistant messages.
fn count_discovery_questions(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .filter(|m| m.content.contains('?'))
        .filter(|m| discovery_patterns().iter().any(|p| p.is_match(&m.content)))
        .count()
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "create_learning_node".to_string(),
        description: "Add a topic node to a learning path. Only call this after interviewing \
                      the learner about their goals and background. Node ids must be prefixed \
                      with the path id, e.g. 'python-variables'."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "node_id": {
                    "type": "string",
                    "description": "Path-prefixed id, e.g. 'python-variables'"
                },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "difficulty": {
                    "type": "string",
                    "description": "beginner, intermediate, or advanced"
                },
                "estimated_duration_minutes": { "type": "number" },
                "prerequisites": {
                    "type": "array",
                    "description": "Node ids that should be completed first"
                },
                "concepts": { "type": "array" },
                "learning_objectives": { "type": "array" }
            },
            "required": ["node_id", "title", "description", "difficulty", "estimated_duration_minutes"]
        }),
    }
}

pub async fn execute(params: &Value, ctx: &ToolContext) -> TutorResult<ToolResult> {
    let node_id = params["node_id"].as_str().unwrap_or_default();

    let messages = MessageOps::new(ctx.db.pool().clone());
    let recent = messages.recent(&ctx.session_id, RECENT_MESSAGE_WINDOW).await?;
    let questions = count_discovery_questions(&recent);
    if questions < REQUIRED_DISCOVERY_QUESTIONS {
        tracing::debug!(node_id, questions, "node creation blocked, interview incomplete");
        return Ok(ToolResult::failure(
            "Interview the learner first. Ask about their goals, experience level, and \
             available time before creating curriculum nodes.",
        ));
    }

    let nodes = NodeOps::new(ctx.db.pool().clone());
    if nodes.exists(node_id).await? {
        return Ok(ToolResult::ok(json!({
            "node_id": node_id,
            "already_exists": true,
            "message": format!("Node '{}' already exists", node_id),
        })));
    }

    let string_list = |key: &str| -> Vec<String> {
        params[key]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let node = LearningNode {
        node_id: node_id.to_string(),
        title: params["title"].as_str().unwrap_or_default().to_string(),
        description: params["description"].as_str().unwrap_or_default().to_string(),
        difficulty: params["difficulty"].as_str().unwrap_or("beginner").to_string(),
        estimated_duration_minutes: params["estimated_duration_minutes"].as_u64().unwrap_or(30)
            as u32,
        prerequisites: string_list("prerequisites"),
        concepts: string_list("concepts"),
        learning_objectives: string_list("learning_objectives"),
    };
    nodes.create(&node, &ctx.user_id).await?;
    tracing::info!(node_id, user_id = %ctx.user_id, "created learning node");

    Ok(ToolResult::ok(json!({
        "node_id": node_id,
        "already_exists": false,
        "path_id": node.path_id(),
        "message": format!("Created node '{}'", node.title),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{SessionOps, TutorDatabase};
    use crate::types::{ContextType, SessionContext};

    async fn planning_context(db: &TutorDatabase) -> ToolContext {
        let sessions = SessionOps::new(db.pool().clone());
        let session = sessions
            .get_or_create(&SessionContext::new("u1", ContextType::Planning, "plan"))
            .await
            .unwrap();
        ToolContext {
            db: db.clone(),
            llm: None,
            user_id: "u1".to_string(),
            session_id: session.session_id,
            context_id: "plan".to_string(),
        }
    }

    fn node_params() -> Value {
        json!({
            "node_id": "python-variables",
            "title": "Variables",
            "description": "Assignment and naming",
            "difficulty": "beginner",
            "estimated_duration_minutes": 25
        })
    }

    #[tokio::test]
    async fn test_node_creation_requires_interview() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ctx = planning_context(&db).await;

        let blocked = execute(&node_params(), &ctx).await.unwrap();
        assert!(!blocked.success);
        assert!(blocked.error.unwrap().contains("Interview"));
    }

    #[tokio::test]
    async fn test_node_creation_after_discovery_questions() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ctx = planning_context(&db).await;
        let messages = MessageOps::new(db.pool().clone());
        messages
            .append_batch(
                &ctx.session_id,
                &[
                    ChatMessage::new(
                        MessageRole::Assistant,
                        "What would you like to learn, and what do you want to build?",
                    ),
                    ChatMessage::new(MessageRole::User, "Python, for data scripts."),
                    ChatMessage::new(
                        MessageRole::Assistant,
                        "How much time can you spend per week? Any prior experience?",
                    ),
                    ChatMessage::new(MessageRole::User, "Two hours, complete beginner."),
                ],
            )
            .await
            .unwrap();

        let created = execute(&node_params(), &ctx).await.unwrap();
        assert!(created.success);
        let result = created.result.unwrap();
        assert_eq!(result["path_id"], json!("python"));
        assert_eq!(result["already_exists"], json!(false));
    }

    #[test]
    fn test_question_counting_ignores_user_messages() {
        let messages = vec![
            ChatMessage::new(MessageRole::User, "What should I learn about goals?"),
            ChatMessage::new(MessageRole::Assistant, "What are your goals?"),
            ChatMessage::new(MessageRole::Assistant, "Great, let's start."),
        ];
        assert_eq!(count_discovery_questions(&messages), 1);
    }
}
