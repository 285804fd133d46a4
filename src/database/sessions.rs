// Session and transcript persistence.

use crate::errors::{TutorError, TutorResult};
use crate::types::{ChatMessage, ContextType, MessageRole, SessionContext};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Stored session row.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub context_type: ContextType,
    pub context_id: String,
    pub created_at: i64,
}

pub struct SessionOps {
    pool: SqlitePool,
}

impl SessionOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the session for a (user, context) pair, creating it on first use.
    pub async fn get_or_create(&self, context: &SessionContext) -> TutorResult<SessionRecord> {
        if let Some(existing) = self.find(context).await? {
            return Ok(existing);
        }

        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            user_id: context.user_id.clone(),
            context_type: context.context_type,
            context_id: context.context_id.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };

        // Another caller may have inserted concurrently; the unique constraint
        // resolves the race and we re-read the winner.
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO sessions (session_id, user_id, context_type, context_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.session_id)
        .bind(&record.user_id)
        .bind(record.context_type.as_str())
        .bind(&record.context_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            tracing::info!(
                session_id = %record.session_id,
                context_type = %record.context_type,
                "created session"
            );
            return Ok(record);
        }
        self.find(context)
            .await?
            .ok_or_else(|| TutorError::database_error("session insert race left no row"))
    }

    pub async fn find(&self, context: &SessionContext) -> TutorResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64)>(
            "SELECT session_id, user_id, context_type, context_id, created_at
             FROM sessions WHERE user_id = ? AND context_type = ? AND context_id = ?",
        )
        .bind(&context.user_id)
        .bind(context.context_type.as_str())
        .bind(&context.context_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_session).transpose()
    }

    pub async fn get(&self, session_id: &str) -> TutorResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64)>(
            "SELECT session_id, user_id, context_type, context_id, created_at
             FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_session).transpose()
    }
}

fn row_to_session(row: (String, String, String, String, i64)) -> TutorResult<SessionRecord> {
    let context_type = ContextType::parse(&row.2)
        .ok_or_else(|| TutorError::database_error(&format!("unknown context type: {}", row.2)))?;
    Ok(SessionRecord {
        session_id: row.0,
        user_id: row.1,
        context_type,
        context_id: row.3,
        created_at: row.4,
    })
}

pub struct MessageOps {
    pool: SqlitePool,
}

impl MessageOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a batch of messages as one atomic unit. Either every message in
    /// the turn lands in the transcript or none of them do.
    pub async fn append_batch(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> TutorResult<()> {
        let mut tx = self.pool.begin().await?;

        let next: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(sequence), -1) + 1 FROM messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;

        for (offset, message) in messages.iter().enumerate() {
            let component = message
                .component
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                "INSERT INTO messages (message_id, session_id, sequence, role, content, component, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&message.message_id)
            .bind(session_id)
            .bind(next.0 + offset as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(component)
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Transcript for a session, oldest first.
    pub async fn list(&self, session_id: &str) -> TutorResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>, i64)>(
            "SELECT message_id, role, content, component, timestamp
             FROM messages WHERE session_id = ? ORDER BY sequence ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(message_id, role, content, component, timestamp)| {
                let role = MessageRole::parse(&role).ok_or_else(|| {
                    TutorError::database_error(&format!("unknown message role: {}", role))
                })?;
                let component = component
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?;
                Ok(ChatMessage {
                    message_id,
                    role,
                    content,
                    component,
                    timestamp,
                })
            })
            .collect()
    }

    /// The most recent `limit` messages, oldest first.
    pub async fn recent(&self, session_id: &str, limit: u32) -> TutorResult<Vec<ChatMessage>> {
        let mut messages = self.list(session_id).await?;
        let keep = limit as usize;
        if messages.len() > keep {
            messages.drain(..messages.len() - keep);
        }
        Ok(messages)
    }

    pub async fn count(&self, session_id: &str) -> TutorResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ops = SessionOps::new(db.pool().clone());
        let context = SessionContext::new("u1", ContextType::Teacher, "python-variables");

        let first = ops.get_or_create(&context).await.unwrap();
        let second = ops.get_or_create(&context).await.unwrap();
        assert_eq!(first.session_id, second.session_id);

        let other = SessionContext::new("u1", ContextType::Exercise, "python-variables");
        let third = ops.get_or_create(&other).await.unwrap();
        assert_ne!(first.session_id, third.session_id);
    }

    #[tokio::test]
    async fn test_append_batch_preserves_order() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let sessions = SessionOps::new(db.pool().clone());
        let messages = MessageOps::new(db.pool().clone());
        let context = SessionContext::new("u1", ContextType::Teacher, "n1");
        let session = sessions.get_or_create(&context).await.unwrap();

        messages
            .append_batch(
                &session.session_id,
                &[
                    ChatMessage::new(MessageRole::User, "first"),
                    ChatMessage::new(MessageRole::Tool, "second"),
                    ChatMessage::new(MessageRole::Assistant, "third"),
                ],
            )
            .await
            .unwrap();

        let listed = messages.list(&session.session_id).await.unwrap();
        let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);

        let recent = messages.recent(&session.session_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "second");
    }
}
