// Model-backed grading. Builds a rubric prompt, parses the model's JSON
// verdict, and falls back to a conservative heuristic grade when the model
// is unavailable or returns something unusable.

use crate::engines::grading::{GradingBackend, GradingPoll, GradingStart};
use crate::engines::llm::types::{extract_json_payload, LlmConfig};
use crate::engines::llm::LlmHandler;
use crate::errors::{TutorError, TutorResult};
use crate::types::{Exercise, GradingBreakdown, SubmissionRecord, Verdict};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Rubric weights, in percent. Correctness dominates.
const WEIGHT_CORRECTNESS: u32 = 40;
const WEIGHT_QUALITY: u32 = 30;
const WEIGHT_EFFICIENCY: u32 = 20;
const WEIGHT_BEST_PRACTICES: u32 = 10;

pub const PASSING_SCORE: u32 = 70;

pub struct LlmGradingBackend {
    llm: Arc<LlmHandler>,
}

impl LlmGradingBackend {
    pub fn new(llm: Arc<LlmHandler>) -> Self {
        Self { llm }
    }

    fn rubric_prompt(exercise: &Exercise, submission: &SubmissionRecord) -> String {
        format!(
            "Grade this {} submission against the exercise.\n\n\
             EXERCISE: {}\n{}\n\n\
             SUBMITTED CODE:\n```{}\n{}\n```\n\n\
             Score each criterion 0-100. Weights: correctness {}%, code quality {}%, \
             efficiency {}%, best practices {}%.\n\
             Respond with a single JSON object:\n\
             {{\"correctness\": int, \"quality\": int, \"efficiency\": int, \
             \"best_practices\": int, \"summary\": str, \"strengths\": [str], \
             \"improvements\": [str], \"next_steps\": str}}",
            submission.language,
            exercise.title,
            exercise.prompt,
            submission.language,
            submission.code,
            WEIGHT_CORRECTNESS,
            WEIGHT_QUALITY,
            WEIGHT_EFFICIENCY,
            WEIGHT_BEST_PRACTICES,
        )
    }
}

#[async_trait]
impl GradingBackend for LlmGradingBackend {
    fn name(&self) -> &str {
        "llm"
    }

    async fn start(
        &self,
        exercise: &Exercise,
        submission: &SubmissionRecord,
    ) -> TutorResult<GradingStart> {
        let prompt = Self::rubric_prompt(exercise, submission);
        let config = LlmConfig {
            temperature: 0.2,
            ..LlmConfig::default()
        };
        match self.llm.inference(&prompt, config).await {
            Ok(text) => match extract_json_payload(&text).and_then(parse_verdict) {
                Some(verdict) => Ok(GradingStart::Ready(verdict)),
                None => {
                    tracing::warn!(
                        submission_id = %submission.submission_id,
                        "model verdict was malformed, using heuristic grade"
                    );
                    Ok(GradingStart::Ready(heuristic_verdict(&submission.code)))
                }
            },
            Err(e) if e.is_retriable() => {
                tracing::warn!(
                    submission_id = %submission.submission_id,
                    error = %e,
                    "grading model unavailable, using heuristic grade"
                );
                Ok(GradingStart::Ready(heuristic_verdict(&submission.code)))
            }
            Err(e) => Err(e),
        }
    }

    async fn poll(&self, job_id: &str) -> TutorResult<GradingPoll> {
        // This backend always resolves at start time.
        Err(TutorError::validation(&format!(
            "llm grading backend has no pending job '{}'",
            job_id
        )))
    }
}

/// Weighted overall score, rounded to the nearest point.
pub fn weighted_score(breakdown: &GradingBreakdown) -> u32 {
    let weighted = breakdown.correctness * WEIGHT_CORRECTNESS
        + breakdown.quality * WEIGHT_QUALITY
        + breakdown.efficiency * WEIGHT_EFFICIENCY
        + breakdown.best_practices * WEIGHT_BEST_PRACTICES;
    (weighted + 50) / 100
}

fn clamp_score(value: &Value) -> u32 {
    value.as_u64().map(|v| v.min(100) as u32).unwrap_or(0)
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Normalize a raw model verdict. Scores outside 0-100 are clamped; the
/// overall score and pass flag are always recomputed from the breakdown.
fn parse_verdict(payload: Value) -> Option<Verdict> {
    if !payload["correctness"].is_number() {
        return None;
    }
    let breakdown = GradingBreakdown {
        correctness: clamp_score(&payload["correctness"]),
        quality: clamp_score(&payload["quality"]),
        efficiency: clamp_score(&payload["efficiency"]),
        best_practices: clamp_score(&payload["best_practices"]),
    };
    let score = weighted_score(&breakdown);
    Some(Verdict {
        score,
        passed: score >= PASSING_SCORE,
        breakdown,
        summary: payload["summary"].as_str().unwrap_or("Graded.").to_string(),
        strengths: string_list(&payload["strengths"]),
        improvements: string_list(&payload["improvements"]),
        next_steps: payload["next_steps"]
            .as_str()
            .unwrap_or("Keep practicing.")
            .to_string(),
        graded_by: "model".to_string(),
    })
}

/// Keyword-based fallback grade. Deliberately conservative: it can pass a
/// submission that clearly contains structure, but never awards a high score.
pub fn heuristic_verdict(code: &str) -> Verdict {
    let trimmed = code.trim();
    let structural_keywords = ["def ", "function ", "fn ", "return", "if ", "for ", "while "];
    let hits = structural_keywords
        .iter()
        .filter(|kw| trimmed.contains(*kw))
        .count() as u32;

    let base = if trimmed.is_empty() {
        0
    } else if trimmed.len() < 20 {
        30
    } else {
        55
    };
    let correctness = (base + hits * 5).min(75);
    let breakdown = GradingBreakdown {
        correctness,
        quality: correctness.saturating_sub(5),
        efficiency: correctness.saturating_sub(5),
        best_practices: correctness.saturating_sub(10),
    };
    let score = weighted_score(&breakdown);
    Verdict {
        score,
        passed: score >= PASSING_SCORE,
        breakdown,
        summary: "Automatic review was unavailable; this is a provisional structural check."
            .to_string(),
        strengths: Vec::new(),
        improvements: vec!["Resubmit later for a full review.".to_string()],
        next_steps: "Resubmit when grading is back, or continue to the next step.".to_string(),
        graded_by: "heuristic".to_string(),
    }
}
