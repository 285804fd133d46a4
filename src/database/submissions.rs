// Submission persistence plus the status-transition event trail.

use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult};
use crate::types::{NextAction, SubmissionOutcome, SubmissionRecord, SubmissionStatus, Verdict};
use sqlx::SqlitePool;

pub struct SubmissionOps {
    pool: SqlitePool,
}

impl SubmissionOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, record: &SubmissionRecord) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO submissions
             (submission_id, exercise_id, user_id, session_id, code, language,
              attempt_number, status, verdict, outcome, next_action, created_at, graded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.submission_id)
        .bind(&record.exercise_id)
        .bind(&record.user_id)
        .bind(&record.session_id)
        .bind(&record.code)
        .bind(&record.language)
        .bind(record.attempt_number as i64)
        .bind(record.status.as_str())
        .bind(record.verdict.as_ref().map(serde_json::to_string).transpose()?)
        .bind(record.outcome.map(|o| o.as_str()))
        .bind(record.next_action.as_ref().map(serde_json::to_string).transpose()?)
        .bind(record.created_at)
        .bind(record.graded_at)
        .execute(&self.pool)
        .await?;

        self.record_event(&record.submission_id, record.status).await?;
        Ok(())
    }

    pub async fn get(&self, submission_id: &str) -> TutorResult<Option<SubmissionRecord>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                String,
                String,
                i64,
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                i64,
                Option<i64>,
            ),
        >(
            "SELECT submission_id, exercise_id, user_id, session_id, code, language,
                    attempt_number, status, verdict, outcome, next_action, created_at, graded_at
             FROM submissions WHERE submission_id = ?",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    pub async fn require(&self, submission_id: &str) -> TutorResult<SubmissionRecord> {
        self.get(submission_id).await?.ok_or_else(|| {
            TutorError::new(
                ErrorCode::SubmissionNotFound,
                ErrorCategory::Validation,
                ErrorSeverity::Medium,
                &format!("submission not found: {}", submission_id),
            )
        })
    }

    /// Advance a submission's status. Terminal statuses never regress: once a
    /// row is completed or failed, further transitions are ignored.
    pub async fn transition(
        &self,
        submission_id: &str,
        status: SubmissionStatus,
    ) -> TutorResult<bool> {
        let updated = sqlx::query(
            "UPDATE submissions SET status = ?
             WHERE submission_id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(status.as_str())
        .bind(submission_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }
        self.record_event(submission_id, status).await?;
        Ok(true)
    }

    /// Attach a verdict and mark the submission completed in one step.
    pub async fn complete(
        &self,
        submission_id: &str,
        verdict: &Verdict,
        outcome: SubmissionOutcome,
        next_action: &NextAction,
    ) -> TutorResult<bool> {
        let updated = sqlx::query(
            "UPDATE submissions
             SET status = 'completed', verdict = ?, outcome = ?, next_action = ?, graded_at = ?
             WHERE submission_id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(serde_json::to_string(verdict)?)
        .bind(outcome.as_str())
        .bind(serde_json::to_string(next_action)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(submission_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }
        self.record_event(submission_id, SubmissionStatus::Completed)
            .await?;
        Ok(true)
    }

    pub async fn next_attempt_number(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> TutorResult<u32> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM submissions WHERE user_id = ? AND exercise_id = ?",
        )
        .bind(user_id)
        .bind(exercise_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u32 + 1)
    }

    /// Record one status observation in the event trail. Repeated in-flight
    /// statuses are recorded each time they are observed.
    pub async fn record_event(
        &self,
        submission_id: &str,
        status: SubmissionStatus,
    ) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO submission_events (submission_id, status, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(submission_id)
        .bind(status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full status history for a submission, in observation order.
    pub async fn events(&self, submission_id: &str) -> TutorResult<Vec<SubmissionStatus>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT status FROM submission_events WHERE submission_id = ? ORDER BY event_id ASC",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status,)| {
                SubmissionStatus::parse(&status).ok_or_else(|| {
                    TutorError::database_error(&format!("unknown submission status: {}", status))
                })
            })
            .collect()
    }
}

fn row_to_record(
    row: (
        String,
        String,
        String,
        String,
        String,
        String,
        i64,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
        Option<i64>,
    ),
) -> TutorResult<SubmissionRecord> {
    let status = SubmissionStatus::parse(&row.7)
        .ok_or_else(|| TutorError::database_error(&format!("unknown submission status: {}", row.7)))?;
    let outcome = match row.9.as_deref() {
        Some("perfect") => Some(SubmissionOutcome::Perfect),
        Some("passed_with_weaknesses") => Some(SubmissionOutcome::PassedWithWeaknesses),
        Some("needs_remediation") => Some(SubmissionOutcome::NeedsRemediation),
        Some("failed") => Some(SubmissionOutcome::Failed),
        Some(other) => {
            return Err(TutorError::database_error(&format!(
                "unknown submission outcome: {}",
                other
            )))
        }
        None => None,
    };
    Ok(SubmissionRecord {
        submission_id: row.0,
        exercise_id: row.1,
        user_id: row.2,
        session_id: row.3,
        code: row.4,
        language: row.5,
        attempt_number: row.6 as u32,
        status,
        verdict: row.8.as_deref().map(serde_json::from_str).transpose()?,
        outcome,
        next_action: row.10.as_deref().map(serde_json::from_str).transpose()?,
        created_at: row.11,
        graded_at: row.12,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TutorDatabase;
    use crate::types::GradingBreakdown;

    fn pending_submission(id: &str) -> SubmissionRecord {
        SubmissionRecord {
            submission_id: id.to_string(),
            exercise_id: "ex1".to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            code: "print('hi')".to_string(),
            language: "python".to_string(),
            attempt_number: 1,
            status: SubmissionStatus::Submitting,
            verdict: None,
            outcome: None,
            next_action: None,
            created_at: chrono::Utc::now().timestamp(),
            graded_at: None,
        }
    }

    fn verdict() -> Verdict {
        Verdict {
            score: 85,
            passed: true,
            breakdown: GradingBreakdown {
                correctness: 90,
                quality: 80,
                efficiency: 85,
                best_practices: 80,
            },
            summary: "Solid work".to_string(),
            strengths: vec!["clear naming".to_string()],
            improvements: vec![],
            next_steps: "Move on".to_string(),
            graded_by: "model".to_string(),
        }
    }

    #[tokio::test]
    async fn test_terminal_status_never_regresses() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ops = SubmissionOps::new(db.pool().clone());
        ops.create(&pending_submission("sub1")).await.unwrap();

        assert!(ops.transition("sub1", SubmissionStatus::Grading).await.unwrap());
        assert!(ops
            .complete(
                "sub1",
                &verdict(),
                SubmissionOutcome::PassedWithWeaknesses,
                &NextAction::Retry {
                    show_hint_button: false
                },
            )
            .await
            .unwrap());

        // A late poll tick must not drag the row back to grading.
        assert!(!ops.transition("sub1", SubmissionStatus::Grading).await.unwrap());
        let record = ops.require("sub1").await.unwrap();
        assert_eq!(record.status, SubmissionStatus::Completed);
        assert!(record.verdict.is_some());
    }

    #[tokio::test]
    async fn test_event_trail_records_every_observation() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ops = SubmissionOps::new(db.pool().clone());
        ops.create(&pending_submission("sub2")).await.unwrap();

        ops.transition("sub2", SubmissionStatus::Grading).await.unwrap();
        ops.record_event("sub2", SubmissionStatus::Grading).await.unwrap();
        ops.complete(
            "sub2",
            &verdict(),
            SubmissionOutcome::Perfect,
            &NextAction::CompletePath,
        )
        .await
        .unwrap();

        let events = ops.events("sub2").await.unwrap();
        assert_eq!(
            events,
            vec![
                SubmissionStatus::Submitting,
                SubmissionStatus::Grading,
                SubmissionStatus::Grading,
                SubmissionStatus::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_attempt_numbers_count_per_exercise() {
        let db = TutorDatabase::in_memory().await.unwrap();
        let ops = SubmissionOps::new(db.pool().clone());

        assert_eq!(ops.next_attempt_number("u1", "ex1").await.unwrap(), 1);
        ops.create(&pending_submission("sub3")).await.unwrap();
        assert_eq!(ops.next_attempt_number("u1", "ex1").await.unwrap(), 2);
        assert_eq!(ops.next_attempt_number("u1", "ex2").await.unwrap(), 1);
    }
}
