// Curriculum tool handlers exposed to the model through the tool registry.
// Each tool lives in its own module with a definition and an execute function.

pub mod content;
pub mod exercise;
pub mod learning_node;
pub mod learning_path;
pub mod navigate;
pub mod profile;
pub mod progress;

use crate::database::TutorDatabase;
use crate::engines::llm::types::ToolDefinition;
use crate::engines::llm::LlmHandler;
use std::sync::Arc;

/// Per-invocation context handed to every tool handler.
#[derive(Clone)]
pub struct ToolContext {
    pub db: TutorDatabase,
    /// Model handler for content-generating tools. Absent in tests, where
    /// handlers fall back to template content.
    pub llm: Option<Arc<LlmHandler>>,
    pub user_id: String,
    pub session_id: String,
    /// Context id of the owning session (node id, exercise id, or path id).
    pub context_id: String,
}

/// Definitions for every registered tool, in a stable order.
pub fn all_definitions() -> Vec<ToolDefinition> {
    vec![
        profile::definition(),
        learning_path::definition(),
        learning_node::definition(),
        content::definition(),
        exercise::definition(),
        navigate::definition(),
        progress::definition(),
    ]
}
