// Conversation orchestrator: runs one user turn through the model/tool loop.
//
// Turn lifecycle:
//   1. Resolve the session and take the per-session busy gate.
//   2. Decide whether the turn runs with tools (context rule or classifier).
//   3. Loop: call the model; execute any requested tool calls in order and
//      feed each result back; stop on the first text-only response.
//   4. Commit the buffered transcript messages in one batch.
//
// Nothing is persisted until step 4, so a turn that exhausts its round
// budget or fails leaves the transcript exactly as it found it.

use crate::config::RuntimeConfig;
use crate::database::{MessageOps, ProfileOps, SessionOps, TutorDatabase};
use crate::engines::llm::types::{LlmConfig, LlmMessage, LlmRequest};
use crate::engines::llm::LlmHandler;
use crate::engines::system_prompt::SystemPromptService;
use crate::engines::tool_registry::ToolRegistryInterface;
use crate::errors::{TutorError, TutorResult};
use crate::tools::ToolContext;
use crate::types::{ChatAction, ChatMessage, MessageRole, SessionContext, TurnOutcome};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Transcript window handed to the model as conversation history.
const HISTORY_WINDOW: u32 = 30;

const CLASSIFIER_MODEL: &str = "claude-3-5-haiku-20241022";

pub struct ConversationOrchestrator {
    llm: Arc<LlmHandler>,
    registry: Arc<dyn ToolRegistryInterface>,
    prompts: SystemPromptService,
    db: TutorDatabase,
    config: RuntimeConfig,
    active_sessions: Arc<Mutex<HashSet<String>>>,
}

/// Releases the busy gate for a session when the turn ends, on any path.
struct TurnGuard {
    active_sessions: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.active_sessions
            .lock()
            .expect("session gate poisoned")
            .remove(&self.session_id);
    }
}

impl ConversationOrchestrator {
    pub fn new(
        llm: Arc<LlmHandler>,
        registry: Arc<dyn ToolRegistryInterface>,
        db: TutorDatabase,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            prompts: SystemPromptService::new(),
            db,
            config,
            active_sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run one user turn. Rejects immediately with `SessionBusy` if another
    /// turn is already in flight for the same session.
    pub async fn run_turn(
        &self,
        context: &SessionContext,
        user_text: &str,
        context_data: &HashMap<String, String>,
    ) -> TutorResult<TurnOutcome> {
        let sessions = SessionOps::new(self.db.pool().clone());
        let session = sessions.get_or_create(context).await?;

        let _guard = self.acquire(&session.session_id)?;
        tracing::info!(
            session_id = %session.session_id,
            context_type = %context.context_type,
            "turn started"
        );

        let messages = MessageOps::new(self.db.pool().clone());
        let history = messages.recent(&session.session_id, HISTORY_WINDOW).await?;
        let use_tools = self.should_use_tools(context, user_text).await;

        let profile = ProfileOps::new(self.db.pool().clone())
            .get(&context.user_id)
            .await?;
        let system = self
            .prompts
            .build(context.context_type, &profile, context_data, use_tools);

        let tool_ctx = ToolContext {
            db: self.db.clone(),
            llm: Some(self.llm.clone()),
            user_id: context.user_id.clone(),
            session_id: session.session_id.clone(),
            context_id: context.context_id.clone(),
        };

        // Model-visible history. Persisted tool messages are omitted; the
        // assistant replies that follow them already carry their substance.
        let mut llm_messages: Vec<LlmMessage> = history
            .iter()
            .filter(|m| m.role != MessageRole::Tool)
            .map(|m| match m.role {
                MessageRole::User => LlmMessage::user(&m.content),
                _ => LlmMessage::assistant(&m.content),
            })
            .collect();
        llm_messages.push(LlmMessage::user(user_text));

        // Buffered transcript for this turn, committed only on success.
        let mut buffered = vec![ChatMessage::new(MessageRole::User, user_text)];
        let mut actions: Vec<ChatAction> = Vec::new();

        for round in 1..=self.config.max_tool_rounds {
            let request = LlmRequest {
                system: Some(system.clone()),
                messages: llm_messages.clone(),
                tools: if use_tools {
                    Some(self.registry.definitions())
                } else {
                    None
                },
                config: LlmConfig::default(),
            };
            let response = self.llm.complete(request).await?;

            let tool_calls = response.requested_tool_calls().to_vec();
            if tool_calls.is_empty() {
                buffered.push(ChatMessage::new(MessageRole::Assistant, &response.content));
                let appended = buffered.len();
                messages.append_batch(&session.session_id, &buffered).await?;
                tracing::info!(
                    session_id = %session.session_id,
                    rounds = round,
                    messages = appended,
                    "turn committed"
                );
                return Ok(TurnOutcome {
                    session_id: session.session_id,
                    reply: response.content,
                    actions,
                    rounds: round,
                    messages_appended: appended,
                });
            }

            // The assistant's tool request lives only in model history; the
            // persisted transcript keeps the tool results and the final reply.
            llm_messages.push(LlmMessage::assistant_tool_use(
                &response.content,
                tool_calls.clone(),
            ));

            for call in &tool_calls {
                let result = self
                    .registry
                    .execute(&call.id, &call.name, &call.arguments, &tool_ctx)
                    .await?;
                if let Some(action) = result.action() {
                    actions.push(action);
                }
                let serialized = serde_json::to_string(&result)?;
                llm_messages.push(LlmMessage::tool_result(&call.id, &serialized));
                buffered.push(
                    ChatMessage::new(MessageRole::Tool, &serialized)
                        .with_component(serde_json::to_value(&result)?),
                );
            }
        }

        tracing::warn!(
            session_id = %session.session_id,
            max_rounds = self.config.max_tool_rounds,
            "turn exceeded tool round budget, discarding"
        );
        Err(TutorError::retry_exhausted(&format!(
            "conversation exceeded {} tool rounds without a final reply",
            self.config.max_tool_rounds
        )))
    }

    fn acquire(&self, session_id: &str) -> TutorResult<TurnGuard> {
        let mut active = self
            .active_sessions
            .lock()
            .expect("session gate poisoned");
        if !active.insert(session_id.to_string()) {
            tracing::debug!(session_id, "turn rejected, session busy");
            return Err(TutorError::session_busy(session_id));
        }
        Ok(TurnGuard {
            active_sessions: self.active_sessions.clone(),
            session_id: session_id.to_string(),
        })
    }

    /// Decide whether this turn runs the tool loop. Planning, teacher, and
    /// exercise contexts always do; the rest ask a small classifier model and
    /// default to tools when classification fails.
    async fn should_use_tools(&self, context: &SessionContext, user_text: &str) -> bool {
        if context.context_type.always_uses_tools() {
            return true;
        }
        let prompt = format!(
            "{}\n\nMessage: {}",
            self.prompts.build_intent_classifier_prompt(),
            user_text
        );
        let config = LlmConfig {
            model: Some(CLASSIFIER_MODEL.to_string()),
            temperature: 0.0,
            max_tokens: 8,
        };
        match self.llm.inference(&prompt, config).await {
            Ok(answer) => !answer.to_uppercase().contains("CHAT"),
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed, defaulting to tools");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::llm::types::{LlmResponse, ToolCall};
    use crate::engines::llm::{LlmProvider, LlmRetryConfig};
    use crate::engines::tool_registry::ToolRegistry;
    use crate::errors::ErrorCode;
    use crate::types::ContextType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<LlmResponse>>,
        calls: AtomicU32,
        /// Captured `tools` presence per call, for asserting tool exposure.
        tools_offered: Mutex<Vec<bool>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
                tools_offered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: LlmRequest) -> TutorResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tools_offered
                .lock()
                .unwrap()
                .push(request.tools.is_some());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TutorError::validation("script exhausted"))
        }
    }

    fn text_response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            model: "test".to_string(),
            provider: "scripted".to_string(),
            stop_reason: "end_turn".to_string(),
            tool_calls: None,
            token_usage: None,
        }
    }

    fn tool_response(calls: Vec<ToolCall>) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            model: "test".to_string(),
            provider: "scripted".to_string(),
            stop_reason: "tool_use".to_string(),
            tool_calls: Some(calls),
            token_usage: None,
        }
    }

    async fn orchestrator_with(
        provider: Arc<ScriptedProvider>,
        config: RuntimeConfig,
    ) -> (ConversationOrchestrator, TutorDatabase) {
        let db = TutorDatabase::in_memory().await.unwrap();
        let llm = Arc::new(LlmHandler::new(
            provider,
            LlmRetryConfig {
                max_retries: 0,
                retry_delay_ms: 1,
            },
        ));
        let orchestrator = ConversationOrchestrator::new(
            llm,
            Arc::new(ToolRegistry::new()),
            db.clone(),
            config,
        );
        (orchestrator, db)
    }

    async fn seed_node(db: &TutorDatabase) {
        crate::database::NodeOps::new(db.pool().clone())
            .create(
                &crate::types::LearningNode {
                    node_id: "python-loops".to_string(),
                    title: "Loops".to_string(),
                    description: "for and while".to_string(),
                    difficulty: "beginner".to_string(),
                    estimated_duration_minutes: 30,
                    prerequisites: vec![],
                    concepts: vec![],
                    learning_objectives: vec![],
                },
                "u1",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_tool_turn_commits_three_messages() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall {
                id: "call-1".to_string(),
                name: "update_user_progress".to_string(),
                arguments: json!({"node_id": "python-loops", "status": "in_progress"}),
            }]),
            text_response("Great, you're working on loops now."),
        ]));
        let (orchestrator, db) =
            orchestrator_with(provider.clone(), RuntimeConfig::default()).await;
        seed_node(&db).await;

        let context = SessionContext::new("u1", ContextType::Teacher, "python-loops");
        let outcome = orchestrator
            .run_turn(&context, "let's get started", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Great, you're working on loops now.");
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.messages_appended, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let transcript = MessageOps::new(db.pool().clone())
            .list(&outcome.session_id)
            .await
            .unwrap();
        let roles: Vec<MessageRole> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Tool, MessageRole::Assistant]
        );
    }

    #[tokio::test]
    async fn test_round_budget_exceeded_leaves_transcript_untouched() {
        let looping_call = || {
            tool_response(vec![ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: "update_user_progress".to_string(),
                arguments: json!({"node_id": "python-loops", "status": "in_progress"}),
            }])
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            looping_call(),
            looping_call(),
            looping_call(),
        ]));
        let config = RuntimeConfig {
            max_tool_rounds: 2,
            ..RuntimeConfig::default()
        };
        let (orchestrator, db) = orchestrator_with(provider, config).await;
        seed_node(&db).await;

        let context = SessionContext::new("u1", ContextType::Teacher, "python-loops");
        let err = orchestrator
            .run_turn(&context, "go", &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RetryExhausted);

        let session = SessionOps::new(db.pool().clone())
            .find(&context)
            .await
            .unwrap()
            .unwrap();
        let count = MessageOps::new(db.pool().clone())
            .count(&session.session_id)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_turn_on_same_session_is_rejected() {
        struct BlockingProvider {
            entered: Arc<Notify>,
            release: Arc<Notify>,
        }

        #[async_trait]
        impl LlmProvider for BlockingProvider {
            fn name(&self) -> &str {
                "blocking"
            }

            async fn complete(&self, _request: LlmRequest) -> TutorResult<LlmResponse> {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(text_response("done"))
            }
        }

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let db = TutorDatabase::in_memory().await.unwrap();
        let llm = Arc::new(LlmHandler::new(
            Arc::new(BlockingProvider {
                entered: entered.clone(),
                release: release.clone(),
            }),
            LlmRetryConfig::default(),
        ));
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            llm,
            Arc::new(ToolRegistry::new()),
            db,
            RuntimeConfig::default(),
        ));

        let context = SessionContext::new("u1", ContextType::Teacher, "python-loops");
        let first = {
            let orchestrator = orchestrator.clone();
            let context = context.clone();
            tokio::spawn(async move {
                orchestrator.run_turn(&context, "first", &HashMap::new()).await
            })
        };
        entered.notified().await;

        let rejected = orchestrator
            .run_turn(&context, "second", &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(rejected.code, ErrorCode::SessionBusy);

        release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.reply, "done");

        // The gate is released after the first turn finishes. A stored
        // permit lets the provider return immediately this time.
        release.notify_one();
        let again = orchestrator
            .run_turn(&context, "third", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(again.reply, "done");
    }

    #[tokio::test]
    async fn test_chat_classified_turn_runs_without_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            // Classifier verdict, then the reply.
            text_response("CHAT"),
            text_response("The platform grades exercises automatically."),
        ]));
        let (orchestrator, db) =
            orchestrator_with(provider.clone(), RuntimeConfig::default()).await;

        let context = SessionContext::new("u1", ContextType::About, "about");
        let outcome = orchestrator
            .run_turn(&context, "how does grading work?", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.messages_appended, 2);
        assert!(outcome.actions.is_empty());
        // Neither the classifier call nor the reply call advertised tools.
        let offered = provider.tools_offered.lock().unwrap().clone();
        assert_eq!(offered, vec![false, false]);

        let transcript = MessageOps::new(db.pool().clone())
            .list(&outcome.session_id)
            .await
            .unwrap();
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back_and_loop_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall {
                id: "call-1".to_string(),
                name: "update_user_progress".to_string(),
                // Unknown node, so the handler rejects it.
                arguments: json!({"node_id": "missing", "status": "in_progress"}),
            }]),
            text_response("That topic doesn't exist yet, let's pick another."),
        ]));
        let (orchestrator, _db) =
            orchestrator_with(provider.clone(), RuntimeConfig::default()).await;

        let context = SessionContext::new("u1", ContextType::Teacher, "python-loops");
        let outcome = orchestrator
            .run_turn(&context, "mark missing as started", &HashMap::new())
            .await
            .unwrap();

        // The failed tool result still lands in the transcript and the model
        // still gets to produce a final reply.
        assert_eq!(outcome.messages_appended, 3);
        assert!(outcome.actions.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
