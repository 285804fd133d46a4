// Engine layer: the orchestrator, grading pipeline, hint ladder, caches, and
// their shared model/tool plumbing.

pub mod content_cache;
pub mod grading;
pub mod hints;
pub mod llm;
pub mod node_selector;
pub mod orchestrator;
pub mod system_prompt;
pub mod tool_registry;

use crate::config::RuntimeConfig;
use crate::database::TutorDatabase;
use crate::errors::TutorResult;
use content_cache::{ContentCache, StoredContentFetcher};
use grading::{LlmGradingBackend, SubmissionPipeline};
use hints::HintLadder;
use llm::LlmHandler;
use node_selector::{DatabaseNodeLoader, NodeSelector};
use orchestrator::ConversationOrchestrator;
use std::collections::HashMap;
use std::sync::Arc;
use tool_registry::ToolRegistry;

/// All runtime engines, wired against one database and one model handler.
pub struct TutorEngines {
    pub llm: Arc<LlmHandler>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub grading: Arc<SubmissionPipeline>,
    pub hints: Arc<HintLadder>,
    pub content_cache: Arc<ContentCache>,
    pub node_selector: Arc<NodeSelector>,
    pub database: TutorDatabase,
}

impl TutorEngines {
    pub fn new(database: TutorDatabase, llm: Arc<LlmHandler>, config: RuntimeConfig) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            llm.clone(),
            registry,
            database.clone(),
            config.clone(),
        ));
        let grading = Arc::new(SubmissionPipeline::new(
            database.clone(),
            Arc::new(LlmGradingBackend::new(llm.clone())),
            config.clone(),
        ));
        let hints = Arc::new(HintLadder::new(database.clone()));
        let content_cache = Arc::new(ContentCache::new(
            Arc::new(StoredContentFetcher::new(database.clone())),
            config.content_ttl(),
        ));
        let node_selector = Arc::new(NodeSelector::new(
            Arc::new(DatabaseNodeLoader::new(database.clone())),
            database.clone(),
        ));

        Self {
            llm,
            orchestrator,
            grading,
            hints,
            content_cache,
            node_selector,
            database,
        }
    }

    /// Component health, keyed by component name.
    pub async fn health_check(&self) -> TutorResult<HashMap<String, bool>> {
        let mut health = HashMap::new();
        health.insert(
            "database".to_string(),
            self.database.health_check().await.unwrap_or(false),
        );
        health.insert(
            "llm".to_string(),
            self.llm.health_check().await.unwrap_or(false),
        );
        Ok(health)
    }

    /// Stop background polling. Safe to call more than once.
    pub fn shutdown(&self) {
        tracing::info!("tutor engines shutting down");
        self.grading.shutdown();
    }
}
