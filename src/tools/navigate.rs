// navigateToNextStep: emit a navigation action for the frontend.

use crate::database::{ExerciseOps, NodeOps};
use crate::engines::llm::types::ToolDefinition;
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::ToolResult;
use serde_json::{json, Value};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "navigate_to_next_step".to_string(),
        description: "Move the learner to their next step: a topic node or an exercise. \
                      The target must already exist."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "target_type": {
                    "type": "string",
                    "description": "'node' or 'exercise'"
                },
                "target_id": { "type": "string" },
                "reason": {
                    "type": "string",
                    "description": "Short explanation shown to the learner"
                }
            },
            "required": ["target_type", "target_id"]
        }),
    }
}

pub async fn execute(params: &Value, ctx: &ToolContext) -> TutorResult<ToolResult> {
    let target_type = params["target_type"].as_str().unwrap_or_default();
    let target_id = params["target_id"].as_str().unwrap_or_default();
    let reason = params["reason"].as_str().unwrap_or("Continue learning");

    let exists = match target_type {
        "node" => NodeOps::new(ctx.db.pool().clone()).exists(target_id).await?,
        "exercise" => ExerciseOps::new(ctx.db.pool().clone())
            .get(target_id)
            .await?
            .is_some(),
        other => {
            return Ok(ToolResult::failure(&format!(
                "Unknown target type '{}'. Use 'node' or 'exercise'.",
                other
            )))
        }
    };
    if !exists {
        return Ok(ToolResult::failure(&format!(
            "Cannot navigate to {} '{}': it does not exist",
            target_type, target_id
        )));
    }

    tracing::debug!(target_type, target_id, "navigation requested");
    let action = match target_type {
        "node" => json!({
            "type": "navigate_to_node",
            "node_id": target_id,
            "reason": reason,
        }),
        _ => json!({
            "type": "navigate_to_exercise",
            "exercise_id": target_id,
            "reason": reason,
        }),
    };

    Ok(ToolResult::ok(json!({
        "target_type": target_type,
        "target_id": target_id,
        "action": action,
    })))
}
