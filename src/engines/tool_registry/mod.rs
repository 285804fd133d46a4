// Tool registry: validates parameters against each tool's schema, replays
// idempotent invocations, and dispatches to the handlers in `tools`.

use crate::database::InvocationOps;
use crate::engines::llm::types::ToolDefinition;
use crate::errors::TutorResult;
use crate::tools::{self, ToolContext};
use crate::types::ToolResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

#[async_trait]
pub trait ToolRegistryInterface: Send + Sync {
    /// Tool definitions to advertise to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one tool invocation. Tool-level failures (unknown tool, bad
    /// parameters, handler rejection) come back as a failed `ToolResult` so
    /// the model can read them and adjust; `Err` is reserved for
    /// infrastructure faults.
    async fn execute(
        &self,
        invocation_id: &str,
        tool_name: &str,
        parameters: &Value,
        context: &ToolContext,
    ) -> TutorResult<ToolResult>;
}

pub struct ToolRegistry {
    definitions: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let definitions = tools::all_definitions()
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self { definitions }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistryInterface for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        tools::all_definitions()
    }

    async fn execute(
        &self,
        invocation_id: &str,
        tool_name: &str,
        parameters: &Value,
        context: &ToolContext,
    ) -> TutorResult<ToolResult> {
        let Some(definition) = self.definitions.get(tool_name) else {
            tracing::warn!(tool_name, "unknown tool requested");
            return Ok(ToolResult::failure(&format!(
                "Unknown tool '{}'. Available tools: {}",
                tool_name,
                self.definitions
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };

        if let Err(message) = validate_parameters(&definition.input_schema, parameters) {
            tracing::debug!(tool_name, %message, "tool parameters rejected");
            return Ok(ToolResult::failure(&message));
        }

        // Replay previously recorded results instead of re-running side
        // effects. Failed invocations are not recorded, so a corrected retry
        // under a fresh id runs normally.
        let ledger = InvocationOps::new(context.db.pool().clone());
        if let Some(stored) = ledger.find(invocation_id).await? {
            tracing::debug!(tool_name, invocation_id, "replaying recorded tool result");
            return Ok(stored);
        }

        let result = match dispatch(tool_name, parameters, context).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool_name, error = %e, "tool handler failed");
                ToolResult::failure(&format!("Tool '{}' failed: {}", tool_name, e.message))
            }
        };

        if result.success {
            ledger
                .record(invocation_id, &context.session_id, tool_name, &result)
                .await?;
        }
        Ok(result)
    }
}

async fn dispatch(
    tool_name: &str,
    parameters: &Value,
    context: &ToolContext,
) -> TutorResult<ToolResult> {
    match tool_name {
        "save_user_profile" => tools::profile::execute(parameters, context).await,
        "create_learning_path" => tools::learning_path::execute(parameters, context).await,
        "create_learning_node" => tools::learning_node::execute(parameters, context).await,
        "display_learning_content" => tools::content::execute(parameters, context).await,
        "generate_exercise" => tools::exercise::execute(parameters, context).await,
        "navigate_to_next_step" => tools::navigate::execute(parameters, context).await,
        "update_user_progress" => tools::progress::execute(parameters, context).await,
        other => Ok(ToolResult::failure(&format!("Unknown tool '{}'", other))),
    }
}

/// Check parameters against a tool's input schema: every required key must be
/// present and every provided key of a known property must match its declared
/// primitive type.
fn validate_parameters(schema: &Value, parameters: &Value) -> Result<(), String> {
    let Some(params) = parameters.as_object() else {
        return Err("Tool parameters must be a JSON object".to_string());
    };

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !params.contains_key(key) {
                return Err(format!("Missing required parameter '{}'", key));
            }
        }
    }

    if let Some(properties) = schema["properties"].as_object() {
        for (key, value) in params {
            let Some(declared) = properties.get(key) else {
                continue;
            };
            let Some(expected) = declared["type"].as_str() else {
                continue;
            };
            let matches = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !matches {
                return Err(format!(
                    "Parameter '{}' must be of type {}",
                    key, expected
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;
    use serde_json::json;

    async fn ctx() -> ToolContext {
        ToolContext {
            db: TutorDatabase::in_memory().await.unwrap(),
            llm: None,
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            context_id: "planning".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_tool_failure() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("inv1", "delete_everything", &json!({}), &ctx().await)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_missing_required_parameter_is_rejected() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute(
                "inv1",
                "create_learning_path",
                &json!({"path_id": "python"}),
                &ctx().await,
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("title"));
    }

    #[tokio::test]
    async fn test_wrong_parameter_type_is_rejected() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute(
                "inv1",
                "create_learning_path",
                &json!({
                    "path_id": 42,
                    "title": "t",
                    "description": "d",
                    "category": "c"
                }),
                &ctx().await,
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("path_id"));
    }

    #[tokio::test]
    async fn test_replayed_invocation_does_not_rerun_handler() {
        let registry = ToolRegistry::new();
        let context = ctx().await;
        let params = json!({
            "path_id": "python",
            "title": "Python",
            "description": "d",
            "category": "programming"
        });

        let first = registry
            .execute("inv-same", "create_learning_path", &params, &context)
            .await
            .unwrap();
        assert_eq!(first.result.as_ref().unwrap()["already_exists"], json!(false));

        // Same invocation id replays the original result even though the
        // path now exists.
        let replay = registry
            .execute("inv-same", "create_learning_path", &params, &context)
            .await
            .unwrap();
        assert_eq!(replay.result.as_ref().unwrap()["already_exists"], json!(false));

        // A fresh id runs the handler again and sees the existing path.
        let fresh = registry
            .execute("inv-new", "create_learning_path", &params, &context)
            .await
            .unwrap();
        assert_eq!(fresh.result.as_ref().unwrap()["already_exists"], json!(true));
    }
}
