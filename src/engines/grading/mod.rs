// Submission grading pipeline.
//
// Submit path: throttle duplicate submits per (user, exercise), persist the
// submission as `submitting`, then hand it to the grading backend. A backend
// that resolves immediately completes the submission in the same call; a
// pending backend moves it to `grading` and the caller polls.
//
// Poll path: bounded exponential backoff until the backend resolves, the
// attempt budget runs out, or the pipeline is shut down. Status transitions
// are monotonic; a completed submission can never regress.

pub mod llm_backend;

use crate::config::RuntimeConfig;
use crate::database::{
    ExerciseOps, HintStateOps, NodeOps, ProfileOps, SubmissionOps, TutorDatabase,
};
use crate::errors::{
    ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult,
};
use crate::types::{
    path_id_of, Exercise, NextAction, SubmissionOutcome, SubmissionRecord, SubmissionStatus,
    Verdict, WeakPoint,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub use llm_backend::{heuristic_verdict, weighted_score, LlmGradingBackend, PASSING_SCORE};

/// Result of starting a grading run.
pub enum GradingStart {
    /// Grading finished synchronously.
    Ready(Verdict),
    /// Grading continues out of band; poll with the job id.
    Pending { job_id: String },
}

/// Result of one poll of a pending grading job.
pub enum GradingPoll {
    Pending,
    Ready(Verdict),
    Failed(String),
}

#[async_trait]
pub trait GradingBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn start(
        &self,
        exercise: &Exercise,
        submission: &SubmissionRecord,
    ) -> TutorResult<GradingStart>;
    async fn poll(&self, job_id: &str) -> TutorResult<GradingPoll>;
}

/// Outcome of a submit call.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Grading resolved synchronously; the record is terminal.
    Completed(SubmissionRecord),
    /// Grading is in flight; poll `run_to_completion` or `poll_once`.
    Grading(SubmissionRecord),
    /// Duplicate submit inside the cooldown window. Nothing was recorded.
    Throttled { retry_after: Duration },
}

/// Outcome of a single poll tick.
#[derive(Debug)]
pub enum PollStep {
    Pending,
    Completed(SubmissionRecord),
}

pub struct SubmissionPipeline {
    db: TutorDatabase,
    backend: Arc<dyn GradingBackend>,
    config: RuntimeConfig,
    /// Last submit time per (user, exercise), for the cooldown window.
    cooldowns: Mutex<HashMap<(String, String), Instant>>,
    /// submission id -> backend job id for in-flight grading.
    pending_jobs: Mutex<HashMap<String, String>>,
    live: AtomicBool,
}

impl SubmissionPipeline {
    pub fn new(db: TutorDatabase, backend: Arc<dyn GradingBackend>, config: RuntimeConfig) -> Self {
        Self {
            db,
            backend,
            config,
            cooldowns: Mutex::new(HashMap::new()),
            pending_jobs: Mutex::new(HashMap::new()),
            live: AtomicBool::new(true),
        }
    }

    /// Stop polling loops. In-flight `run_to_completion` calls return
    /// `Cancelled` at their next tick.
    pub fn shutdown(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Submit code for grading.
    pub async fn submit(
        &self,
        user_id: &str,
        session_id: &str,
        exercise_id: &str,
        code: &str,
        language: &str,
    ) -> TutorResult<SubmitOutcome> {
        if let Some(retry_after) = self.check_cooldown(user_id, exercise_id) {
            tracing::debug!(user_id, exercise_id, "submit throttled");
            return Ok(SubmitOutcome::Throttled { retry_after });
        }

        let exercises = ExerciseOps::new(self.db.pool().clone());
        let exercise = match exercises.require(exercise_id).await {
            Ok(exercise) => exercise,
            Err(e) => {
                // A rejected submit must not prime the throttle window; the
                // corrected retry goes through immediately.
                self.clear_cooldown(user_id, exercise_id);
                return Err(e);
            }
        };

        let submissions = SubmissionOps::new(self.db.pool().clone());
        let attempt_number = submissions.next_attempt_number(user_id, exercise_id).await?;
        let record = SubmissionRecord {
            submission_id: Uuid::new_v4().to_string(),
            exercise_id: exercise_id.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            code: code.to_string(),
            language: language.to_string(),
            attempt_number,
            status: SubmissionStatus::Submitting,
            verdict: None,
            outcome: None,
            next_action: None,
            created_at: chrono::Utc::now().timestamp(),
            graded_at: None,
        };
        submissions.create(&record).await?;
        HintStateOps::new(self.db.pool().clone())
            .record_attempt(user_id, exercise_id)
            .await?;
        tracing::info!(
            submission_id = %record.submission_id,
            exercise_id,
            attempt_number,
            "submission accepted"
        );

        match self.backend.start(&exercise, &record).await {
            Ok(GradingStart::Ready(verdict)) => {
                let record = self.finalize(&record.submission_id, &exercise, verdict).await?;
                Ok(SubmitOutcome::Completed(record))
            }
            Ok(GradingStart::Pending { job_id }) => {
                submissions
                    .transition(&record.submission_id, SubmissionStatus::Grading)
                    .await?;
                self.pending_jobs
                    .lock()
                    .expect("pending jobs poisoned")
                    .insert(record.submission_id.clone(), job_id);
                let record = submissions.require(&record.submission_id).await?;
                Ok(SubmitOutcome::Grading(record))
            }
            Err(e) => {
                submissions
                    .transition(&record.submission_id, SubmissionStatus::Failed)
                    .await?;
                tracing::error!(
                    submission_id = %record.submission_id,
                    error = %e,
                    "grading failed at start"
                );
                Err(e)
            }
        }
    }

    /// One poll tick for an in-flight submission.
    pub async fn poll_once(&self, submission_id: &str) -> TutorResult<PollStep> {
        let submissions = SubmissionOps::new(self.db.pool().clone());
        let record = submissions.require(submission_id).await?;
        if record.status.is_terminal() {
            return match record.status {
                SubmissionStatus::Completed => Ok(PollStep::Completed(record)),
                _ => Err(TutorError::new(
                    ErrorCode::GradingError,
                    ErrorCategory::Grading,
                    ErrorSeverity::High,
                    &format!("submission {} failed grading", submission_id),
                )),
            };
        }

        let job_id = self
            .pending_jobs
            .lock()
            .expect("pending jobs poisoned")
            .get(submission_id)
            .cloned()
            .ok_or_else(|| {
                TutorError::new(
                    ErrorCode::GradingError,
                    ErrorCategory::Grading,
                    ErrorSeverity::High,
                    &format!("no grading job for submission {}", submission_id),
                )
            })?;

        match self.backend.poll(&job_id).await? {
            GradingPoll::Pending => {
                // Record the observation so the status history shows how long
                // grading actually took.
                submissions
                    .record_event(submission_id, SubmissionStatus::Grading)
                    .await?;
                Ok(PollStep::Pending)
            }
            GradingPoll::Ready(verdict) => {
                let exercise = ExerciseOps::new(self.db.pool().clone())
                    .require(&record.exercise_id)
                    .await?;
                let record = self.finalize(submission_id, &exercise, verdict).await?;
                self.pending_jobs
                    .lock()
                    .expect("pending jobs poisoned")
                    .remove(submission_id);
                Ok(PollStep::Completed(record))
            }
            GradingPoll::Failed(message) => {
                submissions
                    .transition(submission_id, SubmissionStatus::Failed)
                    .await?;
                self.pending_jobs
                    .lock()
                    .expect("pending jobs poisoned")
                    .remove(submission_id);
                tracing::error!(submission_id, %message, "grading job failed");
                Err(TutorError::new(
                    ErrorCode::GradingError,
                    ErrorCategory::Grading,
                    ErrorSeverity::High,
                    &message,
                ))
            }
        }
    }

    /// Poll an in-flight submission to completion with bounded exponential
    /// backoff. Gives up with `RetryExhausted` after the configured attempt
    /// budget; the submission stays `grading` and can be polled again later.
    pub async fn run_to_completion(&self, submission_id: &str) -> TutorResult<SubmissionRecord> {
        for attempt in 1..=self.config.poll_max_attempts {
            if !self.live.load(Ordering::SeqCst) {
                return Err(TutorError::cancelled("grading pipeline is shutting down"));
            }
            tokio::time::sleep(self.poll_delay(attempt)).await;
            match self.poll_once(submission_id).await? {
                PollStep::Completed(record) => return Ok(record),
                PollStep::Pending => {
                    tracing::debug!(submission_id, attempt, "grading still pending");
                }
            }
        }
        Err(TutorError::retry_exhausted(&format!(
            "grading for {} did not resolve within {} polls",
            submission_id, self.config.poll_max_attempts
        )))
    }

    /// Delay before poll `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn poll_delay(&self, attempt: u32) -> Duration {
        let base = self.config.poll_base_delay();
        let shifted = base
            .checked_mul(1u32 << (attempt - 1).min(16))
            .unwrap_or(self.config.poll_max_delay());
        shifted.min(self.config.poll_max_delay())
    }

    fn check_cooldown(&self, user_id: &str, exercise_id: &str) -> Option<Duration> {
        let mut cooldowns = self.cooldowns.lock().expect("cooldowns poisoned");
        let key = (user_id.to_string(), exercise_id.to_string());
        let now = Instant::now();
        if let Some(last) = cooldowns.get(&key) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.config.submit_cooldown() {
                return Some(self.config.submit_cooldown() - elapsed);
            }
        }
        cooldowns.insert(key, now);
        None
    }

    fn clear_cooldown(&self, user_id: &str, exercise_id: &str) {
        self.cooldowns
            .lock()
            .expect("cooldowns poisoned")
            .remove(&(user_id.to_string(), exercise_id.to_string()));
    }

    /// Attach the verdict, classify the outcome, pick the next action, and
    /// fold the result into the learner's profile.
    async fn finalize(
        &self,
        submission_id: &str,
        exercise: &Exercise,
        verdict: Verdict,
    ) -> TutorResult<SubmissionRecord> {
        let submissions = SubmissionOps::new(self.db.pool().clone());
        let record = submissions.require(submission_id).await?;

        let weak_points = detect_weak_points(&verdict);
        let outcome = categorize_outcome(&verdict, &weak_points);
        let next_action = self.decide_next_action(exercise, outcome).await?;

        let transitioned = submissions
            .complete(submission_id, &verdict, outcome, &next_action)
            .await?;
        if !transitioned {
            // Lost a race against another finalizer; the stored verdict wins.
            return submissions.require(submission_id).await;
        }

        self.update_profile(&record.user_id, &verdict, &weak_points)
            .await?;
        tracing::info!(
            submission_id,
            score = verdict.score,
            outcome = outcome.as_str(),
            "submission graded"
        );
        submissions.require(submission_id).await
    }

    async fn decide_next_action(
        &self,
        exercise: &Exercise,
        outcome: SubmissionOutcome,
    ) -> TutorResult<NextAction> {
        match outcome {
            SubmissionOutcome::Perfect | SubmissionOutcome::PassedWithWeaknesses => {
                let nodes = NodeOps::new(self.db.pool().clone());
                let path_id = path_id_of(&exercise.node_id);
                let siblings = nodes.list_for_path(path_id).await?;
                let next = siblings
                    .iter()
                    .skip_while(|id| id.as_str() != exercise.node_id)
                    .nth(1)
                    .cloned();
                Ok(match next {
                    Some(node_id) => NextAction::NavigateToNode {
                        node_id,
                        reason: "You passed, on to the next topic".to_string(),
                    },
                    None => NextAction::CompletePath,
                })
            }
            SubmissionOutcome::NeedsRemediation => Ok(NextAction::Retry {
                show_hint_button: true,
            }),
            SubmissionOutcome::Failed => Ok(NextAction::Retry {
                show_hint_button: true,
            }),
        }
    }

    async fn update_profile(
        &self,
        user_id: &str,
        verdict: &Verdict,
        weak_points: &[String],
    ) -> TutorResult<()> {
        let profiles = ProfileOps::new(self.db.pool().clone());
        let mut profile = profiles.get(user_id).await?;
        if verdict.passed {
            profile.total_exercises_completed += 1;
        } else {
            profile.total_exercises_failed += 1;
        }
        merge_weak_points(&mut profile.weak_points, weak_points);
        profiles.upsert(&profile).await
    }
}

/// Classify a graded submission.
///
/// perfect: score >= 90 with no detected weak points
/// passed_with_weaknesses: score >= 70
/// needs_remediation: score >= 50, or more than two weak points
/// failed: everything else
pub fn categorize_outcome(verdict: &Verdict, weak_points: &[String]) -> SubmissionOutcome {
    if verdict.score >= 90 && weak_points.is_empty() {
        SubmissionOutcome::Perfect
    } else if verdict.score >= PASSING_SCORE {
        SubmissionOutcome::PassedWithWeaknesses
    } else if verdict.score >= 50 || weak_points.len() > 2 {
        SubmissionOutcome::NeedsRemediation
    } else {
        SubmissionOutcome::Failed
    }
}

/// Weak points are the rubric criteria that scored below the passing bar.
pub fn detect_weak_points(verdict: &Verdict) -> Vec<String> {
    let mut weak = Vec::new();
    for (criterion, passed) in [
        ("correctness", verdict.breakdown.correctness >= PASSING_SCORE),
        ("code quality", verdict.breakdown.quality >= PASSING_SCORE),
        ("efficiency", verdict.breakdown.efficiency >= PASSING_SCORE),
        (
            "best practices",
            verdict.breakdown.best_practices >= PASSING_SCORE,
        ),
    ] {
        if !passed {
            weak.push(criterion.to_string());
        }
    }
    weak
}

/// Merge newly detected weak points into a profile's running list.
pub fn merge_weak_points(existing: &mut Vec<WeakPoint>, detected: &[String]) {
    let now = chrono::Utc::now().timestamp();
    for topic in detected {
        match existing.iter_mut().find(|w| &w.topic == topic) {
            Some(weak) => {
                weak.occurrences += 1;
                weak.last_seen = now;
            }
            None => existing.push(WeakPoint {
                topic: topic.clone(),
                occurrences: 1,
                last_seen: now,
            }),
        }
    }
}
