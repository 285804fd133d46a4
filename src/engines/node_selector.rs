// Node selector: activates curriculum nodes for a user, memoizing loads and
// collapsing duplicate selections.

use crate::database::{ProgressOps, TutorDatabase};
use crate::errors::TutorResult;
use crate::types::{LearningNode, NodeProgress, NodeStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Source of node definitions. Backed by the database in production; tests
/// substitute counting loaders.
#[async_trait]
pub trait NodeLoader: Send + Sync {
    async fn load(&self, node_id: &str) -> TutorResult<LearningNode>;
}

/// Default loader reading from the curriculum store.
pub struct DatabaseNodeLoader {
    db: TutorDatabase,
}

impl DatabaseNodeLoader {
    pub fn new(db: TutorDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NodeLoader for DatabaseNodeLoader {
    async fn load(&self, node_id: &str) -> TutorResult<LearningNode> {
        crate::database::NodeOps::new(self.db.pool().clone())
            .get(node_id)
            .await?
            .ok_or_else(|| {
                crate::errors::TutorError::new(
                    crate::errors::ErrorCode::NodeNotFound,
                    crate::errors::ErrorCategory::Validation,
                    crate::errors::ErrorSeverity::Medium,
                    &format!("node not found: {}", node_id),
                )
            })
    }
}

/// Result of a selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    /// The node became the user's active node.
    Activated(LearningNode),
    /// The node was already active; nothing changed.
    AlreadyActive(LearningNode),
}

impl SelectOutcome {
    pub fn node(&self) -> &LearningNode {
        match self {
            SelectOutcome::Activated(node) | SelectOutcome::AlreadyActive(node) => node,
        }
    }
}

pub struct NodeSelector {
    loader: Arc<dyn NodeLoader>,
    db: TutorDatabase,
    /// Memoized node loads with single-flight initialization.
    loaded: Mutex<HashMap<String, Arc<OnceCell<LearningNode>>>>,
    /// Active node per user.
    active: Mutex<HashMap<String, String>>,
}

impl NodeSelector {
    pub fn new(loader: Arc<dyn NodeLoader>, db: TutorDatabase) -> Self {
        Self {
            loader,
            db,
            loaded: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Make `node_id` the user's active node. Re-selecting the current node
    /// is a no-op that does not touch progress.
    pub async fn select(&self, user_id: &str, node_id: &str) -> TutorResult<SelectOutcome> {
        let node = self.load(node_id).await?;

        {
            let mut active = self.active.lock().expect("active map poisoned");
            if active.get(user_id).map(String::as_str) == Some(node_id) {
                tracing::debug!(user_id, node_id, "node already active");
                return Ok(SelectOutcome::AlreadyActive(node));
            }
            active.insert(user_id.to_string(), node_id.to_string());
        }

        // Activation starts the node unless it was already completed.
        let progress_ops = ProgressOps::new(self.db.pool().clone());
        let existing = progress_ops.get(user_id, node_id).await?;
        if existing
            .as_ref()
            .map(|p| p.status != NodeStatus::Completed)
            .unwrap_or(true)
        {
            progress_ops
                .upsert(&NodeProgress {
                    user_id: user_id.to_string(),
                    node_id: node_id.to_string(),
                    status: NodeStatus::InProgress,
                    current_step: existing.as_ref().map(|p| p.current_step).unwrap_or(0),
                    completion_percentage: existing
                        .as_ref()
                        .map(|p| p.completion_percentage)
                        .unwrap_or(0),
                })
                .await?;
        }

        tracing::info!(user_id, node_id, "node activated");
        Ok(SelectOutcome::Activated(node))
    }

    pub fn active_node(&self, user_id: &str) -> Option<String> {
        self.active
            .lock()
            .expect("active map poisoned")
            .get(user_id)
            .cloned()
    }

    /// Memoized node load. Concurrent loads of the same node share one
    /// loader call; failures leave the slot empty for retry.
    async fn load(&self, node_id: &str) -> TutorResult<LearningNode> {
        let cell = {
            let mut loaded = self.loaded.lock().expect("load map poisoned");
            loaded
                .entry(node_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let node = cell
            .get_or_try_init(|| async {
                tracing::debug!(node_id, "loading node");
                self.loader.load(node_id).await
            })
            .await?;
        Ok(node.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingLoader {
        loads: AtomicU32,
    }

    #[async_trait]
    impl NodeLoader for CountingLoader {
        async fn load(&self, node_id: &str) -> TutorResult<LearningNode> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(LearningNode {
                node_id: node_id.to_string(),
                title: node_id.to_string(),
                description: String::new(),
                difficulty: "beginner".to_string(),
                estimated_duration_minutes: 30,
                prerequisites: vec![],
                concepts: vec![],
                learning_objectives: vec![],
            })
        }
    }

    async fn selector() -> (Arc<NodeSelector>, Arc<CountingLoader>, TutorDatabase) {
        let db = TutorDatabase::in_memory().await.unwrap();
        let loader = Arc::new(CountingLoader {
            loads: AtomicU32::new(0),
        });
        (
            Arc::new(NodeSelector::new(loader.clone(), db.clone())),
            loader,
            db,
        )
    }

    #[tokio::test]
    async fn test_reselecting_active_node_is_a_noop() {
        let (selector, loader, db) = selector().await;

        let first = selector.select("u1", "python-loops").await.unwrap();
        assert!(matches!(first, SelectOutcome::Activated(_)));
        let second = selector.select("u1", "python-loops").await.unwrap();
        assert_eq!(second, SelectOutcome::AlreadyActive(first.node().clone()));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        // Activation marked the node in progress once.
        let progress = ProgressOps::new(db.pool().clone())
            .get("u1", "python-loops")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.status, NodeStatus::InProgress);
    }

    #[tokio::test]
    async fn test_switching_nodes_updates_active_pointer() {
        let (selector, _loader, _db) = selector().await;

        selector.select("u1", "python-loops").await.unwrap();
        selector.select("u1", "python-oop").await.unwrap();
        assert_eq!(selector.active_node("u1"), Some("python-oop".to_string()));

        // Coming back reactivates rather than no-ops.
        let back = selector.select("u1", "python-loops").await.unwrap();
        assert!(matches!(back, SelectOutcome::Activated(_)));
    }

    #[tokio::test]
    async fn test_concurrent_selections_share_one_load() {
        let (selector, loader, _db) = selector().await;

        let mut handles = Vec::new();
        for user in ["u1", "u2", "u3", "u4"] {
            let selector = selector.clone();
            handles.push(tokio::spawn(async move {
                selector.select(user, "python-loops").await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_node_is_not_reopened() {
        let (selector, _loader, db) = selector().await;
        ProgressOps::new(db.pool().clone())
            .upsert(&NodeProgress {
                user_id: "u1".to_string(),
                node_id: "python-loops".to_string(),
                status: NodeStatus::Completed,
                current_step: 5,
                completion_percentage: 100,
            })
            .await
            .unwrap();

        selector.select("u1", "python-loops").await.unwrap();
        let progress = ProgressOps::new(db.pool().clone())
            .get("u1", "python-loops")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.status, NodeStatus::Completed);
    }
}
