// updateUserProgress: upsert the learner's progress pointer for a node.

use crate::database::{NodeOps, ProgressOps};
use crate::engines::llm::types::ToolDefinition;
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::{NodeProgress, NodeStatus, ToolResult};
use serde_json::{json, Value};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "update_user_progress".to_string(),
        description: "Record the learner's progress on a node. Use when they finish a step, \
                      complete the node, or start working on it."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string" },
                "status": {
                    "type": "string",
                    "description": "not_started, in_progress, or completed"
                },
                "current_step": { "type": "number" },
                "completion_percentage": { "type": "number" }
            },
            "required": ["node_id", "status"]
        }),
    }
}

pub async fn execute(params: &Value, ctx: &ToolContext) -> TutorResult<ToolResult> {
    let node_id = params["node_id"].as_str().unwrap_or_default();
    let status_str = params["status"].as_str().unwrap_or_default();
    let Some(status) = NodeStatus::parse(status_str) else {
        return Ok(ToolResult::failure(&format!(
            "Unknown status '{}'. Use not_started, in_progress, or completed.",
            status_str
        )));
    };

    if !NodeOps::new(ctx.db.pool().clone()).exists(node_id).await? {
        return Ok(ToolResult::failure(&format!("Unknown node: {}", node_id)));
    }

    let completion_percentage = match status {
        NodeStatus::Completed => 100,
        _ => params["completion_percentage"].as_u64().unwrap_or(0) as u32,
    };
    let progress = NodeProgress {
        user_id: ctx.user_id.clone(),
        node_id: node_id.to_string(),
        status,
        current_step: params["current_step"].as_u64().unwrap_or(0) as u32,
        completion_percentage,
    };
    ProgressOps::new(ctx.db.pool().clone()).upsert(&progress).await?;
    tracing::info!(node_id, status = status.as_str(), "updated node progress");

    Ok(ToolResult::ok(json!({
        "node_id": node_id,
        "status": status.as_str(),
        "completion_percentage": completion_percentage,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;
    use crate::types::LearningNode;

    #[tokio::test]
    async fn test_completed_forces_full_percentage() {
        let db = TutorDatabase::in_memory().await.unwrap();
        NodeOps::new(db.pool().clone())
            .create(
                &LearningNode {
                    node_id: "python-loops".to_string(),
                    title: "Loops".to_string(),
                    description: "".to_string(),
                    difficulty: "beginner".to_string(),
                    estimated_duration_minutes: 30,
                    prerequisites: vec![],
                    concepts: vec![],
                    learning_objectives: vec![],
                },
                "u1",
            )
            .await
            .unwrap();
        let ctx = ToolContext {
            db: db.clone(),
            llm: None,
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            context_id: "python-loops".to_string(),
        };

        let result = execute(
            &json!({"node_id": "python-loops", "status": "completed", "completion_percentage": 40}),
            &ctx,
        )
        .await
        .unwrap();
        assert!(result.success);

        let progress = ProgressOps::new(db.pool().clone())
            .get("u1", "python-loops")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.status, NodeStatus::Completed);
        assert_eq!(progress.completion_percentage, 100);
    }

    #[tokio::test]
    async fn test_bad_status_is_rejected() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ctx = ToolContext {
            db,
            llm: None,
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            context_id: "x".to_string(),
        };
        let result = execute(
            &json!({"node_id": "n1", "status": "done"}),
            &ctx,
        )
        .await
        .unwrap();
        assert!(!result.success);
    }
}
