// createLearningPath: register a new learning path for the user.

use crate::database::PathOps;
use crate::engines::llm::types::ToolDefinition;
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::{LearningPath, ToolResult};
use serde_json::{json, Value};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "create_learning_path".to_string(),
        description: "Create a new learning path for the user. A path groups topic nodes \
                      under a shared id prefix. Call this once per subject, after the \
                      learner's goals are clear."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "path_id": {
                    "type": "string",
                    "description": "Short lowercase id, e.g. 'python'. Node ids are prefixed with this."
                },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "category": {
                    "type": "string",
                    "description": "Subject category, e.g. 'programming'"
                }
            },
            "required": ["path_id", "title", "description", "category"]
        }),
    }
}

pub async fn execute(params: &Value, ctx: &ToolContext) -> TutorResult<ToolResult> {
    let path_id = params["path_id"].as_str().unwrap_or_default();
    let paths = PathOps::new(ctx.db.pool().clone());

    // Creating the same path twice is a no-op; the model often retries
    // after a conversation detour.
    if paths.exists(path_id, &ctx.user_id).await? {
        tracing::debug!(path_id, "learning path already exists");
        return Ok(ToolResult::ok(json!({
            "path_id": path_id,
            "already_exists": true,
            "message": format!("Learning path '{}' already exists", path_id),
        })));
    }

    let path = LearningPath {
        path_id: path_id.to_string(),
        user_id: ctx.user_id.clone(),
        title: params["title"].as_str().unwrap_or_default().to_string(),
        description: params["description"].as_str().unwrap_or_default().to_string(),
        category: params["category"].as_str().unwrap_or_default().to_string(),
    };
    paths.create(&path).await?;
    tracing::info!(path_id, user_id = %ctx.user_id, "created learning path");

    Ok(ToolResult::ok(json!({
        "path_id": path_id,
        "already_exists": false,
        "message": format!("Created learning path '{}'", path.title),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;

    #[tokio::test]
    async fn test_duplicate_path_is_a_noop() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ctx = ToolContext {
            db,
            llm: None,
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            context_id: "planning".to_string(),
        };
        let params = json!({
            "path_id": "python",
            "title": "Python from scratch",
            "description": "Beginner Python",
            "category": "programming"
        });

        let first = execute(&params, &ctx).await.unwrap();
        assert!(first.success);
        assert_eq!(first.result.unwrap()["already_exists"], json!(false));

        let second = execute(&params, &ctx).await.unwrap();
        assert!(second.success);
        assert_eq!(second.result.unwrap()["already_exists"], json!(true));
    }
}
