// generateExercise: author a practice exercise for a node the learner has
// already studied, then navigate them to it.

use crate::database::{ContentOps, ExerciseOps, NodeOps, ProfileOps};
use crate::engines::llm::types::{extract_json_payload, LlmConfig, ToolDefinition};
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::{Exercise, Hint, LearningNode, ToolResult};
use serde_json::{json, Value};
use uuid::Uuid;

const BEGINNER_SCAFFOLD: &str =
    "# Step 1: read the prompt carefully\n# Step 2: sketch your approach in comments\n# Step 3: write the code below\n";

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "generate_exercise".to_string(),
        description: "Create a practice exercise for a node the learner has already studied. \
                      Only call this after the node's content has been displayed. Difficulty \
                      defaults to the learner's experience level."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string" },
                "difficulty": {
                    "type": "string",
                    "description": "Override the learner's default difficulty"
                },
                "focus": {
                    "type": "string",
                    "description": "Optional concept to target, e.g. a known weak point"
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

    // Exercises come after study. Block generation until content for this
    // node has actually been shown to this learner.
    let content = ContentOps::new(ctx.db.pool().clone());
    if content.latest_for_node(&ctx.user_id, node_id).await?.is_none() {
        tracing::debug!(node_id, "exercise blocked, content not yet shown");
        return Ok(ToolResult::failure(
            "The learner has not seen this node's content yet. Display the learning \
             content first, then generate an exercise.",
        ));
    }

    let profile = ProfileOps::new(ctx.db.pool().clone()).get(&ctx.user_id).await?;
    let difficulty = params["difficulty"]
        .as_str()
        .unwrap_or(&profile.experience_level)
        .to_string();
    let focus = params["focus"].as_str();

    let mut exercise = author_exercise(ctx, &node, &difficulty, focus).await;
    if profile.experience_level == "beginner" {
        exercise.starter_code = format!("{}{}", BEGINNER_SCAFFOLD, exercise.starter_code);
    }

    ExerciseOps::new(ctx.db.pool().clone()).create(&exercise).await?;
    tracing::info!(
        node_id,
        exercise_id = %exercise.exercise_id,
        difficulty = %difficulty,
        "generated exercise"
    );

    Ok(ToolResult::ok(json!({
        "exercise_id": exercise.exercise_id,
        "node_id": node_id,
        "title": exercise.title,
        "difficulty": difficulty,
        "action": {
            "type": "navigate_to_exercise",
            "exercise_id": exercise.exercise_id,
            "reason": format!("Practice for {}", node.title),
        }
    })))
}

async fn author_exercise(
    ctx: &ToolContext,
    node: &LearningNode,
    difficulty: &str,
    focus: Option<&str>,
) -> Exercise {
    let exercise_id = format!("{}-ex-{}", node.node_id, &Uuid::new_v4().to_string()[..8]);

    if let Some(llm) = &ctx.llm {
        let prompt = exercise_prompt(node, difficulty, focus);
        match llm.inference(&prompt, LlmConfig::default()).await {
            Ok(text) => {
                if let Some(exercise) = parse_authored(&exercise_id, node, difficulty, &text, ctx) {
                    return exercise;
                }
                tracing::warn!(node_id = %node.node_id, "model exercise was malformed, using template");
            }
            Err(e) => {
                tracing::warn!(node_id = %node.node_id, error = %e, "exercise generation failed, using template");
            }
        }
    }
    template_exercise(&exercise_id, node, difficulty, ctx)
}

fn exercise_prompt(node: &LearningNode, difficulty: &str, focus: Option<&str>) -> String {
    let mut prompt = format!(
        "Author one {} coding exercise about \"{}\" ({}).\n",
        difficulty, node.title, node.description
    );
    if let Some(focus) = focus {
        prompt.push_str(&format!("Target this concept specifically: {}\n", focus));
    }
    prompt.push_str(
        "Respond with a single JSON object:\n\
         {\"title\": str, \"description\": str, \"prompt\": str, \"starter_code\": str, \
         \"hints\": [str, str, str]}\n\
         Order hints from gentle nudge to near-solution.",
    );
    prompt
}

fn parse_authored(
    exercise_id: &str,
    node: &LearningNode,
    difficulty: &str,
    text: &str,
    ctx: &ToolContext,
) -> Option<Exercise> {
    let payload = extract_json_payload(text)?;
    let title = payload["title"].as_str()?;
    let prompt = payload["prompt"].as_str()?;
    let hints: Vec<Hint> = payload["hints"]
        .as_array()?
        .iter()
        .enumerate()
        .filter_map(|(i, hint)| {
            hint.as_str().map(|text| Hint {
                text: text.to_string(),
                reveal_threshold: i as u32 + 1,
            })
        })
        .collect();
    if hints.is_empty() {
        return None;
    }
    Some(Exercise {
        exercise_id: exercise_id.to_string(),
        node_id: node.node_id.clone(),
        title: title.to_string(),
        description: payload["description"].as_str().unwrap_or_default().to_string(),
        prompt: prompt.to_string(),
        exercise_type: "coding".to_string(),
        difficulty: difficulty.to_string(),
        starter_code: payload["starter_code"].as_str().unwrap_or_default().to_string(),
        solution: None,
        hints,
        created_for_user: Some(ctx.user_id.clone()),
    })
}

fn template_exercise(
    exercise_id: &str,
    node: &LearningNode,
    difficulty: &str,
    ctx: &ToolContext,
) -> Exercise {
    Exercise {
        exercise_id: exercise_id.to_string(),
        node_id: node.node_id.clone(),
        title: format!("Practice: {}", node.title),
        description: format!("Apply what you learned about {}.", node.title),
        prompt: format!(
            "Write a short program that demonstrates {}. Use the concepts from the lesson.",
            node.title
        ),
        exercise_type: "coding".to_string(),
        difficulty: difficulty.to_string(),
        starter_code: String::new(),
        solution: None,
        hints: vec![
            Hint {
                text: format!("Re-read the section on {} in the lesson.", node.title),
                reveal_threshold: 1,
            },
            Hint {
                text: "Start from the lesson's code example and modify it.".to_string(),
                reveal_threshold: 2,
            },
        ],
        created_for_user: Some(ctx.user_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::curriculum::ContentRecord;
    use crate::database::TutorDatabase;
    use crate::types::UserProfile;

    fn sample_node() -> LearningNode {
        LearningNode {
            node_id: "python-loops".to_string(),
            title: "Loops".to_string(),
            description: "for and while loops".to_string(),
            difficulty: "beginner".to_string(),
            estimated_duration_minutes: 30,
            prerequisites: vec![],
            concepts: vec![],
            learning_objectives: vec![],
        }
    }

    async fn seeded_ctx() -> ToolContext {
        let db = TutorDatabase::in_memory().await.unwrap();
        NodeOps::new(db.pool().clone())
            .create(&sample_node(), "u1")
            .await
            .unwrap();
        ToolContext {
            db,
            llm: None,
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            context_id: "python-loops".to_string(),
        }
    }

    async fn show_content(ctx: &ToolContext) {
        ContentOps::new(ctx.db.pool().clone())
            .create(&ContentRecord {
                content_id: "c1".to_string(),
                user_id: "u1".to_string(),
                node_id: "python-loops".to_string(),
                title: "Loops".to_string(),
                content_type: "lecture".to_string(),
                sections: json!({"title": "Loops"}),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exercise_blocked_until_content_shown() {
        let ctx = seeded_ctx().await;
        let blocked = execute(&json!({"node_id": "python-loops"}), &ctx)
            .await
            .unwrap();
        assert!(!blocked.success);
        assert!(blocked.error.unwrap().contains("content"));

        show_content(&ctx).await;
        let result = execute(&json!({"node_id": "python-loops"}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.action().is_some());
    }

    #[tokio::test]
    async fn test_beginner_gets_scaffolded_starter_code() {
        let ctx = seeded_ctx().await;
        show_content(&ctx).await;

        let result = execute(&json!({"node_id": "python-loops"}), &ctx)
            .await
            .unwrap();
        let exercise_id = result.result.unwrap()["exercise_id"]
            .as_str()
            .unwrap()
            .to_string();
        let exercise = ExerciseOps::new(ctx.db.pool().clone())
            .require(&exercise_id)
            .await
            .unwrap();
        assert!(exercise.starter_code.starts_with("# Step 1"));
        // Default difficulty comes from the profile.
        assert_eq!(exercise.difficulty, "beginner");
    }

    #[tokio::test]
    async fn test_difficulty_override_and_no_scaffold_for_advanced() {
        let ctx = seeded_ctx().await;
        show_content(&ctx).await;
        ProfileOps::new(ctx.db.pool().clone())
            .upsert(&UserProfile {
                user_id: "u1".to_string(),
                experience_level: "advanced".to_string(),
                ..UserProfile::default()
            })
            .await
            .unwrap();

        let result = execute(
            &json!({"node_id": "python-loops", "difficulty": "intermediate"}),
            &ctx,
        )
        .await
        .unwrap();
        let exercise_id = result.result.unwrap()["exercise_id"]
            .as_str()
            .unwrap()
            .to_string();
        let exercise = ExerciseOps::new(ctx.db.pool().clone())
            .require(&exercise_id)
            .await
            .unwrap();
        assert_eq!(exercise.difficulty, "intermediate");
        assert!(!exercise.starter_code.starts_with("# Step 1"));
    }
}
