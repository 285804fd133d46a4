// Database layer for the tutor runtime.
// SQLite via sqlx; create/read/update-by-id only, no cross-entity transactions.

pub mod curriculum;
pub mod invocations;
pub mod progress;
pub mod schema;
pub mod sessions;
pub mod submissions;

use crate::errors::TutorResult;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub use curriculum::{ContentOps, ExerciseOps, NodeOps, PathOps};
pub use invocations::InvocationOps;
pub use progress::{HintStateOps, ProfileOps, ProgressOps};
pub use sessions::{MessageOps, SessionOps};
pub use submissions::SubmissionOps;

/// Shared handle to the runtime's SQLite store.
#[derive(Clone)]
pub struct TutorDatabase {
    pool: SqlitePool,
}

impl TutorDatabase {
    /// Connect to a SQLite database at the given URL and apply the schema.
    pub async fn connect(url: &str) -> TutorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// In-memory database, used by tests and demos. A single connection keeps
    /// every handle on the same store.
    pub async fn in_memory() -> TutorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Apply the schema. Statements are idempotent, so this is safe to run on
    /// every startup.
    pub async fn initialize(&self) -> TutorResult<()> {
        for statement in schema::CREATE_TABLES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("database schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> TutorResult<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}
