// Hint ladder: progressive hints gated on recorded attempts.
//
// Hint levels are 1-based. Level k unlocks once the learner has made at
// least that hint's `reveal_threshold` attempts. hints_used only ever goes
// up; re-reading an earlier hint changes nothing.

use crate::database::{ExerciseOps, HintStateOps, TutorDatabase};
use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult};
use crate::types::{Hint, HintState};

/// Ladder position for one (user, exercise) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HintLadderStatus {
    pub total_hints: u32,
    pub unlocked_hints: u32,
    pub hints_used: u32,
    pub attempts: u32,
}

pub struct HintLadder {
    db: TutorDatabase,
}

impl HintLadder {
    pub fn new(db: TutorDatabase) -> Self {
        Self { db }
    }

    /// Reveal hint `level` (1-based). Fails with `HintLocked` when the
    /// learner has not made enough attempts, and with a validation error for
    /// levels outside the ladder.
    pub async fn request_hint(
        &self,
        user_id: &str,
        exercise_id: &str,
        level: u32,
    ) -> TutorResult<Hint> {
        let exercise = ExerciseOps::new(self.db.pool().clone())
            .require(exercise_id)
            .await?;
        if level == 0 || level as usize > exercise.hints.len() {
            return Err(TutorError::new(
                ErrorCode::InvalidStepIndex,
                ErrorCategory::Validation,
                ErrorSeverity::Medium,
                &format!(
                    "hint level {} out of range; exercise has {} hints",
                    level,
                    exercise.hints.len()
                ),
            ));
        }

        let hint = exercise.hints[level as usize - 1].clone();
        let states = HintStateOps::new(self.db.pool().clone());
        let state = states.get(user_id, exercise_id).await?;
        if state.attempts < hint.reveal_threshold {
            let remaining = hint.reveal_threshold - state.attempts;
            tracing::debug!(exercise_id, level, remaining, "hint still locked");
            return Err(TutorError::new(
                ErrorCode::HintLocked,
                ErrorCategory::Validation,
                ErrorSeverity::Low,
                &format!(
                    "hint {} unlocks after {} more attempt{}",
                    level,
                    remaining,
                    if remaining == 1 { "" } else { "s" }
                ),
            ));
        }

        states.record_hint_reveal(user_id, exercise_id, level).await?;
        tracing::info!(exercise_id, level, user_id, "hint revealed");
        Ok(hint)
    }

    /// Record one solve attempt, unlocking whatever the new count allows.
    pub async fn record_attempt(&self, user_id: &str, exercise_id: &str) -> TutorResult<HintState> {
        HintStateOps::new(self.db.pool().clone())
            .record_attempt(user_id, exercise_id)
            .await
    }

    /// Explicit restart: clears attempts and hint usage for the exercise.
    pub async fn restart_exercise(&self, user_id: &str, exercise_id: &str) -> TutorResult<()> {
        tracing::info!(exercise_id, user_id, "exercise restarted");
        HintStateOps::new(self.db.pool().clone())
            .reset(user_id, exercise_id)
            .await
    }

    pub async fn status(&self, user_id: &str, exercise_id: &str) -> TutorResult<HintLadderStatus> {
        let exercise = ExerciseOps::new(self.db.pool().clone())
            .require(exercise_id)
            .await?;
        let state = HintStateOps::new(self.db.pool().clone())
            .get(user_id, exercise_id)
            .await?;
        let unlocked = exercise
            .hints
            .iter()
            .filter(|h| state.attempts >= h.reveal_threshold)
            .count() as u32;
        Ok(HintLadderStatus {
            total_hints: exercise.hints.len() as u32,
            unlocked_hints: unlocked,
            hints_used: state.hints_used,
            attempts: state.attempts,
        })
    }
}
