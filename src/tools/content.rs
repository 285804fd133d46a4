// displayLearningContent: generate and store lecture content for a node, then
// tell the frontend to render it.

use crate::database::curriculum::ContentRecord;
use crate::database::{ContentOps, NodeOps};
use crate::engines::llm::types::{extract_json_payload, LlmConfig, ToolDefinition};
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::{LearningNode, ToolResult};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "display_learning_content".to_string(),
        description: "Generate lecture content for a topic node and display it to the \
                      learner. Call this when the learner is ready to study a node, before \
                      offering any exercise on it."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string" },
                "focus": {
                    "type": "string",
                    "description": "Optional aspect of the topic to emphasize"
                }
            },
            "required": ["node_id"]
        }),
    }
}

pub async fn execute(params: &Value, ctx: &ToolContext) -> TutorResult<ToolResult> {
    let node_id = params["node_id"].as_str().unwrap_or_default();
    let nodes = NodeOps::new(ctx.db.pool().clone());
    let Some(node) = nodes.get(node_id).await? else {
        return Ok(ToolResult::failure(&format!("Unknown node: {}", node_id)));
    };

    let focus = params["focus"].as_str();
    let sections = generate_lecture(ctx, &node, focus).await;

    let record = ContentRecord {
        content_id: Uuid::new_v4().to_string(),
        user_id: ctx.user_id.clone(),
        node_id: node_id.to_string(),
        title: node.title.clone(),
        content_type: "lecture".to_string(),
        sections,
    };
    ContentOps::new(ctx.db.pool().clone()).create(&record).await?;
    tracing::info!(node_id, content_id = %record.content_id, "generated learning content");

    Ok(ToolResult::ok(json!({
        "content_id": record.content_id,
        "node_id": node_id,
        "title": record.title,
        "action": {
            "type": "display_content",
            "content_id": record.content_id,
        }
    })))
}

/// Produce the lecture body. Uses the model when available, with a template
/// fallback when the model is absent or returns unusable output.
async fn generate_lecture(
    ctx: &ToolContext,
    node: &LearningNode,
    focus: Option<&str>,
) -> Value {
    if let Some(llm) = &ctx.llm {
        let prompt = lecture_prompt(node, focus);
        match llm.inference(&prompt, LlmConfig::default()).await {
            Ok(text) => {
                if let Some(lecture) = extract_json_payload(&text).filter(is_valid_lecture) {
                    return lecture;
                }
                tracing::warn!(node_id = %node.node_id, "model lecture was malformed, using template");
            }
            Err(e) => {
                tracing::warn!(node_id = %node.node_id, error = %e, "lecture generation failed, using template");
            }
        }
    }
    template_lecture(node)
}

fn lecture_prompt(node: &LearningNode, focus: Option<&str>) -> String {
    let mut prompt = format!(
        "Write a short programming lecture about \"{}\".\nTopic description: {}\nDifficulty: {}\n",
        node.title, node.description, node.difficulty
    );
    if !node.concepts.is_empty() {
        prompt.push_str(&format!("Cover these concepts: {}\n", node.concepts.join(", ")));
    }
    if let Some(focus) = focus {
        prompt.push_str(&format!("Emphasize: {}\n", focus));
    }
    prompt.push_str(
        "Respond with a single JSON object:\n\
         {\"title\": str, \"introduction\": str, \
         \"sections\": [{\"heading\": str, \"body\": str, \"code_example\": str}], \
         \"summary\": str}\n\
         Use 2 to 4 sections. Keep code examples under 10 lines.",
    );
    prompt
}

fn is_valid_lecture(lecture: &Value) -> bool {
    lecture["title"].is_string()
        && lecture["introduction"].is_string()
        && lecture["sections"]
            .as_array()
            .is_some_and(|s| !s.is_empty())
        && lecture["summary"].is_string()
}

fn template_lecture(node: &LearningNode) -> Value {
    let sections: Vec<Value> = if node.concepts.is_empty() {
        vec![json!({
            "heading": node.title,
            "body": node.description,
            "code_example": "",
        })]
    } else {
        node.concepts
            .iter()
            .map(|concept| {
                json!({
                    "heading": concept,
                    "body": format!("An overview of {} in the context of {}.", concept, node.title),
                    "code_example": "",
                })
            })
            .collect()
    };
    json!({
        "title": node.title,
        "introduction": node.description,
        "sections": sections,
        "summary": format!("You covered the basics of {}.", node.title),
    })
}
