// Learner state: node progress, hint/attempt counters, and profiles.

use crate::errors::{TutorError, TutorResult};
use crate::types::{HintState, NodeProgress, NodeStatus, UserProfile, WeakPoint};
use sqlx::SqlitePool;

pub struct ProgressOps {
    pool: SqlitePool,
}

impl ProgressOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert the progress pointer for a (user, node) pair.
    pub async fn upsert(&self, progress: &NodeProgress) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO node_progress
             (user_id, node_id, status, current_step, completion_percentage, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, node_id) DO UPDATE SET
               status = excluded.status,
               current_step = excluded.current_step,
               completion_percentage = excluded.completion_percentage,
               updated_at = excluded.updated_at",
        )
        .bind(&progress.user_id)
        .bind(&progress.node_id)
        .bind(progress.status.as_str())
        .bind(progress.current_step as i64)
        .bind(progress.completion_percentage.min(100) as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str, node_id: &str) -> TutorResult<Option<NodeProgress>> {
        let row = sqlx::query_as::<_, (String, String, String, i64, i64)>(
            "SELECT user_id, node_id, status, current_step, completion_percentage
             FROM node_progress WHERE user_id = ? AND node_id = ?",
        )
        .bind(user_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(user_id, node_id, status, current_step, completion_percentage)| {
            let status = NodeStatus::parse(&status).ok_or_else(|| {
                TutorError::database_error(&format!("unknown node status: {}", status))
            })?;
            Ok(NodeProgress {
                user_id,
                node_id,
                status,
                current_step: current_step as u32,
                completion_percentage: completion_percentage as u32,
            })
        })
        .transpose()
    }

    /// Node ids the user has completed, used for prerequisite checks.
    pub async fn completed_nodes(&self, user_id: &str) -> TutorResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT node_id FROM node_progress WHERE user_id = ? AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

pub struct HintStateOps {
    pool: SqlitePool,
}

impl HintStateOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str, exercise_id: &str) -> TutorResult<HintState> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT attempts, hints_used FROM hint_state WHERE user_id = ? AND exercise_id = ?",
        )
        .bind(user_id)
        .bind(exercise_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((attempts, hints_used)) => HintState {
                user_id: user_id.to_string(),
                exercise_id: exercise_id.to_string(),
                attempts: attempts as u32,
                hints_used: hints_used as u32,
            },
            None => HintState {
                user_id: user_id.to_string(),
                exercise_id: exercise_id.to_string(),
                attempts: 0,
                hints_used: 0,
            },
        })
    }

    pub async fn record_attempt(&self, user_id: &str, exercise_id: &str) -> TutorResult<HintState> {
        sqlx::query(
            "INSERT INTO hint_state (user_id, exercise_id, attempts, hints_used, updated_at)
             VALUES (?, ?, 1, 0, ?)
             ON CONFLICT (user_id, exercise_id) DO UPDATE SET
               attempts = attempts + 1,
               updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(exercise_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        self.get(user_id, exercise_id).await
    }

    /// Raise hints_used to `level` if it is higher than the stored value.
    /// Re-reading an already revealed hint leaves the counter alone.
    pub async fn record_hint_reveal(
        &self,
        user_id: &str,
        exercise_id: &str,
        level: u32,
    ) -> TutorResult<HintState> {
        sqlx::query(
            "INSERT INTO hint_state (user_id, exercise_id, attempts, hints_used, updated_at)
             VALUES (?, ?, 0, ?, ?)
             ON CONFLICT (user_id, exercise_id) DO UPDATE SET
               hints_used = MAX(hints_used, excluded.hints_used),
               updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(exercise_id)
        .bind(level as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        self.get(user_id, exercise_id).await
    }

    /// Reset counters on an explicit exercise restart.
    pub async fn reset(&self, user_id: &str, exercise_id: &str) -> TutorResult<()> {
        sqlx::query("DELETE FROM hint_state WHERE user_id = ? AND exercise_id = ?")
            .bind(user_id)
            .bind(exercise_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct ProfileOps {
    pool: SqlitePool,
}

impl ProfileOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Profile for a user, falling back to defaults for unseen users.
    pub async fn get(&self, user_id: &str) -> TutorResult<UserProfile> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64, i64)>(
            "SELECT experience_level, learning_style, learning_goals, weak_points,
                    total_exercises_completed, total_exercises_failed
             FROM user_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let weak_points: Vec<WeakPoint> = serde_json::from_str(&row.3)?;
                Ok(UserProfile {
                    user_id: user_id.to_string(),
                    experience_level: row.0,
                    learning_style: row.1,
                    learning_goals: serde_json::from_str(&row.2)?,
                    weak_points,
                    total_exercises_completed: row.4 as u32,
                    total_exercises_failed: row.5 as u32,
                })
            }
            None => Ok(UserProfile {
                user_id: user_id.to_string(),
                ..UserProfile::default()
            }),
        }
    }

    pub async fn upsert(&self, profile: &UserProfile) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO user_profiles
             (user_id, experience_level, learning_style, learning_goals, weak_points,
              total_exercises_completed, total_exercises_failed, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
               experience_level = excluded.experience_level,
               learning_style = excluded.learning_style,
               learning_goals = excluded.learning_goals,
               weak_points = excluded.weak_points,
               total_exercises_completed = excluded.total_exercises_completed,
               total_exercises_failed = excluded.total_exercises_failed,
               updated_at = excluded.updated_at",
        )
        .bind(&profile.user_id)
        .bind(&profile.experience_level)
        .bind(&profile.learning_style)
        .bind(serde_json::to_string(&profile.learning_goals)?)
        .bind(serde_json::to_string(&profile.weak_points)?)
        .bind(profile.total_exercises_completed as i64)
        .bind(profile.total_exercises_failed as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
