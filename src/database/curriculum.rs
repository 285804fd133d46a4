// Curriculum storage: paths, nodes, exercises, and generated content.
// List-valued fields are stored as JSON text columns.

use crate::errors::{TutorError, TutorResult};
use crate::types::{Exercise, Hint, LearningNode, LearningPath};
use sqlx::SqlitePool;

pub struct PathOps {
    pool: SqlitePool,
}

impl PathOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, path: &LearningPath) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO learning_paths (path_id, user_id, title, description, category, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&path.path_id)
        .bind(&path.user_id)
        .bind(&path.title)
        .bind(&path.description)
        .bind(&path.category)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, path_id: &str, user_id: &str) -> TutorResult<Option<LearningPath>> {
        let row = sqlx::query_as::<_, (String, String, String, String, String)>(
            "SELECT path_id, user_id, title, description, category
             FROM learning_paths WHERE path_id = ? AND user_id = ?",
        )
        .bind(path_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(path_id, user_id, title, description, category)| LearningPath {
            path_id,
            user_id,
            title,
            description,
            category,
        }))
    }

    pub async fn exists(&self, path_id: &str, user_id: &str) -> TutorResult<bool> {
        Ok(self.get(path_id, user_id).await?.is_some())
    }
}

pub struct NodeOps {
    pool: SqlitePool,
}

impl NodeOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, node: &LearningNode, created_for_user: &str) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO learning_nodes
             (node_id, title, description, difficulty, estimated_duration_minutes,
              prerequisites, concepts, learning_objectives, created_for_user, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&node.node_id)
        .bind(&node.title)
        .bind(&node.description)
        .bind(&node.difficulty)
        .bind(node.estimated_duration_minutes as i64)
        .bind(serde_json::to_string(&node.prerequisites)?)
        .bind(serde_json::to_string(&node.concepts)?)
        .bind(serde_json::to_string(&node.learning_objectives)?)
        .bind(created_for_user)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, node_id: &str) -> TutorResult<Option<LearningNode>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64, String, String, String)>(
            "SELECT node_id, title, description, difficulty, estimated_duration_minutes,
                    prerequisites, concepts, learning_objectives
             FROM learning_nodes WHERE node_id = ?",
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(LearningNode {
                node_id: row.0,
                title: row.1,
                description: row.2,
                difficulty: row.3,
                estimated_duration_minutes: row.4 as u32,
                prerequisites: serde_json::from_str(&row.5)?,
                concepts: serde_json::from_str(&row.6)?,
                learning_objectives: serde_json::from_str(&row.7)?,
            })
        })
        .transpose()
    }

    pub async fn exists(&self, node_id: &str) -> TutorResult<bool> {
        Ok(self.get(node_id).await?.is_some())
    }

    /// Node ids belonging to a path, in creation order. Membership is by id
    /// prefix, so 'python' matches 'python-variables' but not 'pythonic-x'.
    pub async fn list_for_path(&self, path_id: &str) -> TutorResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT node_id FROM learning_nodes WHERE node_id LIKE ? ORDER BY created_at ASC, node_id ASC",
        )
        .bind(format!("{}-%", path_id))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

pub struct ExerciseOps {
    pool: SqlitePool,
}

impl ExerciseOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, exercise: &Exercise) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO exercises
             (exercise_id, node_id, title, description, prompt, exercise_type, difficulty,
              starter_code, solution, hints, created_for_user, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&exercise.exercise_id)
        .bind(&exercise.node_id)
        .bind(&exercise.title)
        .bind(&exercise.description)
        .bind(&exercise.prompt)
        .bind(&exercise.exercise_type)
        .bind(&exercise.difficulty)
        .bind(&exercise.starter_code)
        .bind(&exercise.solution)
        .bind(serde_json::to_string(&exercise.hints)?)
        .bind(&exercise.created_for_user)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, exercise_id: &str) -> TutorResult<Option<Exercise>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                String,
                String,
                String,
                String,
                Option<String>,
                String,
                Option<String>,
            ),
        >(
            "SELECT exercise_id, node_id, title, description, prompt, exercise_type,
                    difficulty, starter_code, solution, hints, created_for_user
             FROM exercises WHERE exercise_id = ?",
        )
        .bind(exercise_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let hints: Vec<Hint> = serde_json::from_str(&row.9)?;
            Ok(Exercise {
                exercise_id: row.0,
                node_id: row.1,
                title: row.2,
                description: row.3,
                prompt: row.4,
                exercise_type: row.5,
                difficulty: row.6,
                starter_code: row.7,
                solution: row.8,
                hints,
                created_for_user: row.10,
            })
        })
        .transpose()
    }

    pub async fn require(&self, exercise_id: &str) -> TutorResult<Exercise> {
        self.get(exercise_id).await?.ok_or_else(|| {
            TutorError::new(
                crate::errors::ErrorCode::ExerciseNotFound,
                crate::errors::ErrorCategory::Validation,
                crate::errors::ErrorSeverity::Medium,
                &format!("exercise not found: {}", exercise_id),
            )
        })
    }

    pub async fn list_for_node(&self, node_id: &str) -> TutorResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT exercise_id FROM exercises WHERE node_id = ? ORDER BY created_at ASC",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Stored generated lecture content for a node.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub content_id: String,
    pub user_id: String,
    pub node_id: String,
    pub title: String,
    pub content_type: String,
    pub sections: serde_json::Value,
}

pub struct ContentOps {
    pool: SqlitePool,
}

impl ContentOps {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, record: &ContentRecord) -> TutorResult<()> {
        sqlx::query(
            "INSERT INTO learning_content
             (content_id, user_id, node_id, title, content_type, sections, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.content_id)
        .bind(&record.user_id)
        .bind(&record.node_id)
        .bind(&record.title)
        .bind(&record.content_type)
        .bind(serde_json::to_string(&record.sections)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, content_id: &str) -> TutorResult<Option<ContentRecord>> {
        let row = sqlx::query_as::<_, (String, String, String, String, String, String)>(
            "SELECT content_id, user_id, node_id, title, content_type, sections
             FROM learning_content WHERE content_id = ?",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ContentRecord {
                content_id: row.0,
                user_id: row.1,
                node_id: row.2,
                title: row.3,
                content_type: row.4,
                sections: serde_json::from_str(&row.5)?,
            })
        })
        .transpose()
    }

    /// Most recent content generated for a (user, node) pair.
    pub async fn latest_for_node(
        &self,
        user_id: &str,
        node_id: &str,
    ) -> TutorResult<Option<ContentRecord>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT content_id FROM learning_content
             WHERE user_id = ? AND node_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((content_id,)) => self.get(&content_id).await,
            None => Ok(None),
        }
    }
}
