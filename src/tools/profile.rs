// saveUserProfile: persist the learner profile gathered during the planning
// interview. Grading counters and weak points accumulated so far are kept.

use crate::database::ProfileOps;
use crate::engines::llm::types::ToolDefinition;
use crate::errors::TutorResult;
use crate::tools::ToolContext;
use crate::types::ToolResult;
use serde_json::{json, Value};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "save_user_profile".to_string(),
        description: "Save the learner's profile after the planning interview: their \
                      experience level, what they want to learn, and how they like to \
                      learn. Call this before creating a learning path."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "experience_level": {
                    "type": "string",
                    "description": "beginner, intermediate, or advanced"
                },
                "learning_goals": {
                    "type": "array",
                    "description": "What the learner wants to achieve, in their own words"
                },
                "learning_style": {
                    "type": "string",
                    "description": "How they prefer to learn, e.g. 'hands-on', 'reading', 'mixed'"
                }
            },
            "required": ["experience_level", "learning_goals", "learning_style"]
        }),
    }
}

pub async fn execute(params: &Value, ctx: &ToolContext) -> TutorResult<ToolResult> {
    let experience_level = params["experience_level"].as_str().unwrap_or_default();
    let learning_style = params["learning_style"].as_str().unwrap_or_default();
    let learning_goals: Vec<String> = params["learning_goals"]
        .as_array()
        .map(|goals| {
            goals
                .iter()
                .filter_map(|g| g.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if experience_level.is_empty() || learning_style.is_empty() {
        return Ok(ToolResult::failure(
            "experience_level and learning_style must be non-empty strings",
        ));
    }

    // Overwrite only the interview fields; exercise history survives a
    // re-run of the planning conversation.
    let profiles = ProfileOps::new(ctx.db.pool().clone());
    let mut profile = profiles.get(&ctx.user_id).await?;
    profile.experience_level = experience_level.to_string();
    profile.learning_style = learning_style.to_string();
    profile.learning_goals = learning_goals.clone();
    profiles.upsert(&profile).await?;
    tracing::info!(user_id = %ctx.user_id, experience_level, "saved learner profile");

    Ok(ToolResult::ok(json!({
        "experience_level": experience_level,
        "learning_goals": learning_goals,
        "message": "Learning profile saved! Your personalized learning experience is ready.",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;

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
    async fn test_saved_profile_feeds_later_reads() {
        let ctx = ctx().await;
        let result = execute(
            &json!({
                "experience_level": "intermediate",
                "learning_goals": ["build a web scraper", "automate reports"],
                "learning_style": "hands-on"
            }),
            &ctx,
        )
        .await
        .unwrap();
        assert!(result.success);

        let profile = ProfileOps::new(ctx.db.pool().clone()).get("u1").await.unwrap();
        assert_eq!(profile.experience_level, "intermediate");
        assert_eq!(profile.learning_style, "hands-on");
        assert_eq!(profile.learning_goals.len(), 2);
    }

    #[tokio::test]
    async fn test_saving_preserves_exercise_history() {
        let ctx = ctx().await;
        let profiles = ProfileOps::new(ctx.db.pool().clone());
        let mut existing = profiles.get("u1").await.unwrap();
        existing.total_exercises_completed = 4;
        existing.total_exercises_failed = 1;
        profiles.upsert(&existing).await.unwrap();

        execute(
            &json!({
                "experience_level": "advanced",
                "learning_goals": ["contribute to open source"],
                "learning_style": "reading"
            }),
            &ctx,
        )
        .await
        .unwrap();

        let profile = profiles.get("u1").await.unwrap();
        assert_eq!(profile.experience_level, "advanced");
        assert_eq!(profile.total_exercises_completed, 4);
        assert_eq!(profile.total_exercises_failed, 1);
    }

    #[tokio::test]
    async fn test_empty_experience_level_is_rejected() {
        let ctx = ctx().await;
        let result = execute(
            &json!({
                "experience_level": "",
                "learning_goals": [],
                "learning_style": "mixed"
            }),
            &ctx,
        )
        .await
        .unwrap();
        assert!(!result.success);
    }
}
