use crate::types::{ContextType, UserProfile};
use std::collections::HashMap;

/// Production-grade system prompt service that generates context-aware tutor
/// prompts for each conversation context, with learner-profile personalization.
pub struct SystemPromptService {
    /// Base templates keyed by context type
    base_templates: HashMap<ContextType, String>,
    /// Tool protocol guidance appended when the orchestrator runs with tools
    tool_guidance: String,
}

impl SystemPromptService {
    pub fn new() -> Self {
        let mut service = Self {
            base_templates: HashMap::new(),
            tool_guidance: String::new(),
        };

        service.initialize_templates();
        service
    }

    /// Initialize all prompt templates
    fn initialize_templates(&mut self) {
        self.base_templates.insert(ContextType::Planning,
            "You are a curriculum planner for a personalized programming tutor.\n\
            Interview the learner about their goals, background, and available time before \
            committing to a plan. Once you understand their needs, save their learning \
            profile, then create a learning path and its topic nodes using your tools. Ask \
            focused questions, one or two at a time."
                .to_string(),
        );

        self.base_templates.insert(ContextType::Teacher,
            "You are a patient programming teacher guiding a learner through a topic.\n\
            Explain one concept at a time, ground explanations in short concrete examples, and \
            check understanding before moving on. When the learner has seen the material and is \
            ready to practice, generate an exercise with your tools. Never generate an exercise \
            before the relevant content has been shown."
                .to_string(),
        );

        self.base_templates.insert(ContextType::Exercise,
            "You are a programming tutor helping a learner work through an exercise.\n\
            Do not hand over the solution. Nudge the learner toward it with questions and \
            targeted pointers, and let them do the writing. If they are stuck after several \
            attempts, suggest they reveal a hint."
                .to_string(),
        );

        self.base_templates.insert(ContextType::LearningQa,
            "You are a programming tutor answering a quick question about the material the \
            learner is currently studying.\n\
            Answer directly and concisely, then relate the answer back to the current lesson."
                .to_string(),
        );

        self.base_templates.insert(ContextType::About,
            "You are the assistant for a personalized programming tutor. Answer questions \
            about how the platform works: learning paths, lessons, exercises, grading, and \
            hints. Keep answers short and concrete."
                .to_string(),
        );

        self.tool_guidance =
            "\n\n--- TOOL PROTOCOL ---\n\
            You have tools for managing the learner's curriculum. Use them instead of \
            describing what you would do:\n\
            1. Call a tool when the conversation calls for a durable change (creating a path \
            or node, generating an exercise or content, navigating, recording progress).\n\
            2. After each tool call you receive its result. Use it before deciding on the \
            next step.\n\
            3. When no further tool work is needed, reply to the learner in plain prose."
                .to_string();
    }

    /// Generate the system prompt for one orchestrated turn.
    pub fn build(
        &self,
        context_type: ContextType,
        profile: &UserProfile,
        context_data: &HashMap<String, String>,
        has_tools: bool,
    ) -> String {
        let mut prompt = self
            .base_templates
            .get(&context_type)
            .cloned()
            .unwrap_or_else(|| self.base_templates[&ContextType::About].clone());

        prompt.push_str(&format!(
            "\n\nLEARNER PROFILE:\n- experience level: {}\n- learning style: {}",
            profile.experience_level, profile.learning_style
        ));
        if !profile.learning_goals.is_empty() {
            prompt.push_str(&format!(
                "\n- goals: {}",
                profile.learning_goals.join(", ")
            ));
        }
        if !profile.weak_points.is_empty() {
            prompt.push_str("\n- known weak points (work these into explanations and exercises):");
            for weak_point in &profile.weak_points {
                prompt.push_str(&format!(
                    "\n  - {} (seen {} times)",
                    weak_point.topic, weak_point.occurrences
                ));
            }
        }

        if !context_data.is_empty() {
            prompt.push_str("\n\nCURRENT CONTEXT:");
            let mut keys: Vec<&String> = context_data.keys().collect();
            keys.sort();
            for key in keys {
                prompt.push_str(&format!("\n- {}: {}", key, context_data[key]));
            }
        }

        if has_tools {
            prompt.push_str(&self.tool_guidance);
        }

        prompt
    }

    /// Prompt for the lightweight intent classifier that decides whether a
    /// turn needs the tool loop at all.
    pub fn build_intent_classifier_prompt(&self) -> String {
        "You classify whether a tutoring chat message needs curriculum tools.\n\
        Tools are needed when the message asks to create or change a learning plan, start or \
        generate an exercise, show lesson content, move to the next step, or record progress.\n\
        Respond with exactly one word: TOOLS or CHAT."
            .to_string()
    }
}

impl Default for SystemPromptService {
    fn default() -> Self {
        Self::new()
    }
}
