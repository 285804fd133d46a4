// Idempotency ledger for tool invocations. Handlers with side effects store
// their result keyed by invocation id; a replay returns the stored result
// instead of re-running the handler.

use crate::errors::TutorResult;
use crate::types::ToolResult;
use sqlx::SqlitePool;

pub struct InvocationOps {
    pool: SqlitePool,
}

impl InvocationOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, invocation_id: &str) -> TutorResult<Option<ToolResult>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT result FROM tool_invocations WHERE invocation_id = ?",
        )
        .bind(invocation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(result,)| Ok(serde_json::from_str(&result)?))
            .transpose()
    }

    pub async fn record(
        &self,
        invocation_id: &str,
        session_id: &str,
        tool_name: &str,
        result: &ToolResult,
    ) -> TutorResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO tool_invocations
             (invocation_id, session_id, tool_name, result, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(invocation_id)
        .bind(session_id)
        .bind(tool_name)
        .bind(serde_json::to_string(result)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;

    #[tokio::test]
    async fn test_replay_returns_stored_result() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ops = InvocationOps::new(db.pool().clone());

        assert!(ops.find("inv1").await.unwrap().is_none());

        let result = ToolResult::ok(serde_json::json!({"path_id": "python"}));
        ops.record("inv1", "s1", "create_learning_path", &result)
            .await
            .unwrap();

        let replayed = ops.find("inv1").await.unwrap().unwrap();
        assert!(replayed.success);
        assert_eq!(
            replayed.result.unwrap()["path_id"],
            serde_json::json!("python")
        );

        // A second record with the same id keeps the first result.
        let other = ToolResult::failure("should not replace");
        ops.record("inv1", "s1", "create_learning_path", &other)
            .await
            .unwrap();
        assert!(ops.find("inv1").await.unwrap().unwrap().success);
    }
}
