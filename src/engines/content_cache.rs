// Content cache: per-node curriculum outlines and step bodies, cached with a
// wall-clock TTL and single-flight fetching.
//
// Expiry is wholesale: when a node's entry ages out, its outline and every
// cached step are discarded together, so a reader never sees a fresh outline
// paired with stale steps. Cached values are never overwritten in place; a
// value lives until its node entry is evicted.

use crate::database::{ContentOps, ExerciseOps, TutorDatabase};
use crate::errors::{ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult};
use crate::types::{StepContent, StepMeta, StepType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Source of curriculum content, typically model-backed.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Ordered step outline for a node.
    async fn fetch_outline(&self, node_id: &str) -> TutorResult<Vec<StepMeta>>;

    /// Full content for one step of a node.
    async fn fetch_step(&self, node_id: &str, step_number: u32) -> TutorResult<StepContent>;
}

struct NodeEntry {
    created_at: Instant,
    outline: OnceCell<Vec<StepMeta>>,
    steps: Mutex<HashMap<u32, Arc<OnceCell<StepContent>>>>,
}

impl NodeEntry {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
            outline: OnceCell::new(),
            steps: Mutex::new(HashMap::new()),
        }
    }
}

pub struct ContentCache {
    fetcher: Arc<dyn ContentFetcher>,
    ttl: Duration,
    entries: Mutex<HashMap<String, Arc<NodeEntry>>>,
}

impl ContentCache {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Outline for a node. Concurrent callers for the same node share one
    /// fetch; a failed fetch leaves the slot empty so the next caller retries.
    pub async fn get_outline(&self, node_id: &str) -> TutorResult<Vec<StepMeta>> {
        let entry = self.entry(node_id);
        let outline = entry
            .outline
            .get_or_try_init(|| async {
                tracing::debug!(node_id, "fetching outline");
                self.fetcher.fetch_outline(node_id).await
            })
            .await?;
        Ok(outline.clone())
    }

    /// Content for one step. The step number must exist in the node's
    /// outline; steps are 1-based.
    pub async fn get_step(&self, node_id: &str, step_number: u32) -> TutorResult<StepContent> {
        let outline = self.get_outline(node_id).await?;
        if !outline.iter().any(|s| s.step_number == step_number) {
            return Err(TutorError::new(
                ErrorCode::InvalidStepIndex,
                ErrorCategory::Validation,
                ErrorSeverity::Medium,
                &format!(
                    "step {} does not exist in node {} ({} steps)",
                    step_number,
                    node_id,
                    outline.len()
                ),
            ));
        }

        let entry = self.entry(node_id);
        let cell = {
            let mut steps = entry.steps.lock().expect("step map poisoned");
            steps
                .entry(step_number)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let step = cell
            .get_or_try_init(|| async {
                tracing::debug!(node_id, step_number, "fetching step content");
                self.fetcher.fetch_step(node_id, step_number).await
            })
            .await?;
        Ok(step.clone())
    }

    /// Drop a node's cached outline and steps.
    pub fn invalidate(&self, node_id: &str) {
        self.entries
            .lock()
            .expect("cache map poisoned")
            .remove(node_id);
        tracing::debug!(node_id, "cache entry invalidated");
    }

    /// Live entry for a node, evicting it first if it has aged out.
    fn entry(&self, node_id: &str) -> Arc<NodeEntry> {
        let mut entries = self.entries.lock().expect("cache map poisoned");
        if let Some(existing) = entries.get(node_id) {
            if existing.created_at.elapsed() < self.ttl {
                return existing.clone();
            }
            tracing::debug!(node_id, "cache entry expired");
            entries.remove(node_id);
        }
        let fresh = Arc::new(NodeEntry::new());
        entries.insert(node_id.to_string(), fresh.clone());
        fresh
    }
}

/// Fetcher backed by the curriculum store. Cache keys are `user_id/node_id`;
/// a node's steps are its generated lecture sections followed by one step per
/// authored exercise.
pub struct StoredContentFetcher {
    db: TutorDatabase,
}

impl StoredContentFetcher {
    pub fn new(db: TutorDatabase) -> Self {
        Self { db }
    }

    fn parse_key(key: &str) -> TutorResult<(&str, &str)> {
        key.split_once('/').ok_or_else(|| {
            TutorError::validation(&format!("content key must be user_id/node_id, got '{}'", key))
        })
    }

    async fn load_steps(&self, key: &str) -> TutorResult<Vec<(StepMeta, serde_json::Value)>> {
        let (user_id, node_id) = Self::parse_key(key)?;
        let content = ContentOps::new(self.db.pool().clone())
            .latest_for_node(user_id, node_id)
            .await?
            .ok_or_else(|| {
                TutorError::validation(&format!(
                    "no content generated yet for node {}",
                    node_id
                ))
            })?;

        let mut steps = Vec::new();
        if let Some(sections) = content.sections["sections"].as_array() {
            for section in sections {
                let title = section["heading"]
                    .as_str()
                    .unwrap_or(&content.title)
                    .to_string();
                steps.push((
                    StepMeta {
                        step_number: steps.len() as u32 + 1,
                        step_type: StepType::LectureSection,
                        title,
                    },
                    section.clone(),
                ));
            }
        }
        for exercise_id in ExerciseOps::new(self.db.pool().clone())
            .list_for_node(node_id)
            .await?
        {
            steps.push((
                StepMeta {
                    step_number: steps.len() as u32 + 1,
                    step_type: StepType::Exercise,
                    title: "Practice exercise".to_string(),
                },
                serde_json::json!({ "exercise_id": exercise_id }),
            ));
        }
        Ok(steps)
    }
}

#[async_trait]
impl ContentFetcher for StoredContentFetcher {
    async fn fetch_outline(&self, key: &str) -> TutorResult<Vec<StepMeta>> {
        Ok(self
            .load_steps(key)
            .await?
            .into_iter()
            .map(|(meta, _)| meta)
            .collect())
    }

    async fn fetch_step(&self, key: &str, step_number: u32) -> TutorResult<StepContent> {
        let steps = self.load_steps(key).await?;
        let (meta, body) = steps
            .into_iter()
            .find(|(meta, _)| meta.step_number == step_number)
            .ok_or_else(|| {
                TutorError::new(
                    ErrorCode::InvalidStepIndex,
                    ErrorCategory::Validation,
                    ErrorSeverity::Medium,
                    &format!("step {} not found for {}", step_number, key),
                )
            })?;
        Ok(StepContent {
            step_number,
            title: meta.title,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFetcher {
        outline_fetches: AtomicU32,
        step_fetches: AtomicU32,
        /// Artificial latency so concurrent callers overlap.
        delay: Duration,
    }

    impl CountingFetcher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outline_fetches: AtomicU32::new(0),
                step_fetches: AtomicU32::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl ContentFetcher for CountingFetcher {
        async fn fetch_outline(&self, _node_id: &str) -> TutorResult<Vec<StepMeta>> {
            tokio::time::sleep(self.delay).await;
            let fetch = self.outline_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(vec![
                StepMeta {
                    step_number: 1,
                    step_type: StepType::LectureSection,
                    title: format!("Intro (fetch {})", fetch),
                },
                StepMeta {
                    step_number: 2,
                    step_type: StepType::Exercise,
                    title: "Practice".to_string(),
                },
            ])
        }

        async fn fetch_step(&self, node_id: &str, step_number: u32) -> TutorResult<StepContent> {
            tokio::time::sleep(self.delay).await;
            self.step_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(StepContent {
                step_number,
                title: format!("{} step {}", node_id, step_number),
                body: json!({"text": "content"}),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_share_one_fetch() {
        let fetcher = CountingFetcher::new(Duration::from_millis(50));
        let cache = Arc::new(ContentCache::new(fetcher.clone(), Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.get_outline("python-loops").await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(fetcher.outline_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_discards_outline_and_steps_together() {
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let ttl = Duration::from_secs(24 * 60 * 60);
        let cache = ContentCache::new(fetcher.clone(), ttl);

        cache.get_outline("python-loops").await.unwrap();
        cache.get_step("python-loops", 1).await.unwrap();
        assert_eq!(fetcher.outline_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.step_fetches.load(Ordering::SeqCst), 1);

        // Within the TTL everything is served from cache.
        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        cache.get_outline("python-loops").await.unwrap();
        cache.get_step("python-loops", 1).await.unwrap();
        assert_eq!(fetcher.outline_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.step_fetches.load(Ordering::SeqCst), 1);

        // Past the TTL the whole node entry is refetched.
        tokio::time::advance(Duration::from_secs(25 * 60 * 60)).await;
        cache.get_outline("python-loops").await.unwrap();
        cache.get_step("python-loops", 1).await.unwrap();
        assert_eq!(fetcher.outline_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.step_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_values_are_never_overwritten() {
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let cache = ContentCache::new(fetcher.clone(), Duration::from_secs(60));

        let first = cache.get_outline("python-loops").await.unwrap();
        let second = cache.get_outline("python-loops").await.unwrap();
        // The fetcher embeds its call count in the title; both reads see the
        // first fetch's data.
        assert_eq!(first[0].title, "Intro (fetch 1)");
        assert_eq!(second[0].title, "Intro (fetch 1)");
    }

    #[tokio::test]
    async fn test_unknown_step_is_rejected() {
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let cache = ContentCache::new(fetcher.clone(), Duration::from_secs(60));

        let err = cache.get_step("python-loops", 9).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStepIndex);
        // The outline was fetched to validate, but no step fetch happened.
        assert_eq!(fetcher.step_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_fetcher_orders_lecture_then_exercise_steps() {
        let db = TutorDatabase::in_memory().await.unwrap();
        ContentOps::new(db.pool().clone())
            .create(&crate::database::curriculum::ContentRecord {
                content_id: "c1".to_string(),
                user_id: "u1".to_string(),
                node_id: "python-loops".to_string(),
                title: "Loops".to_string(),
                content_type: "lecture".to_string(),
                sections: json!({
                    "title": "Loops",
                    "sections": [
                        {"heading": "for loops", "body": "..."},
                        {"heading": "while loops", "body": "..."}
                    ]
                }),
            })
            .await
            .unwrap();
        ExerciseOps::new(db.pool().clone())
            .create(&crate::types::Exercise {
                exercise_id: "ex1".to_string(),
                node_id: "python-loops".to_string(),
                title: "Sum".to_string(),
                description: String::new(),
                prompt: "Sum a list".to_string(),
                exercise_type: "coding".to_string(),
                difficulty: "beginner".to_string(),
                starter_code: String::new(),
                solution: None,
                hints: vec![],
                created_for_user: None,
            })
            .await
            .unwrap();

        let fetcher = StoredContentFetcher::new(db);
        let outline = fetcher.fetch_outline("u1/python-loops").await.unwrap();
        assert_eq!(outline.len(), 3);
        assert_eq!(outline[0].step_type, StepType::LectureSection);
        assert_eq!(outline[2].step_type, StepType::Exercise);

        let step = fetcher.fetch_step("u1/python-loops", 3).await.unwrap();
        assert_eq!(step.body["exercise_id"], json!("ex1"));

        let err = fetcher.fetch_outline("u2/python-loops").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let fetcher = CountingFetcher::new(Duration::ZERO);
        let cache = ContentCache::new(fetcher.clone(), Duration::from_secs(60));

        cache.get_outline("python-loops").await.unwrap();
        cache.invalidate("python-loops");
        cache.get_outline("python-loops").await.unwrap();
        assert_eq!(fetcher.outline_fetches.load(Ordering::SeqCst), 2);
    }
}
