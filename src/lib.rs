//! Tutor Runtime
//!
//! Session-orchestration core for a personalized programming tutor: a
//! tool-calling conversation orchestrator, an async submission grading
//! pipeline, a progressive hint ladder, and cached curriculum content, all
//! backed by SQLite.
//!
//! The typical embedding creates one [`TutorEngines`] per process:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutor_runtime::{RuntimeConfig, TutorDatabase, TutorEngines};
//! use tutor_runtime::engines::llm::LlmHandler;
//!
//! # async fn run() -> tutor_runtime::TutorResult<()> {
//! let config = RuntimeConfig::default();
//! let database = TutorDatabase::connect("sqlite://tutor.db?mode=rwc").await?;
//! let llm = Arc::new(LlmHandler::from_env(config.llm_retry())?);
//! let engines = TutorEngines::new(database, llm, config);
//! # let _ = engines;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod engines;
pub mod errors;
pub mod tools;
pub mod types;

pub use config::RuntimeConfig;
pub use database::TutorDatabase;
pub use engines::TutorEngines;
pub use errors::{ErrorCategory, ErrorCode, ErrorSeverity, TutorError, TutorResult};

pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global tracing subscriber, honoring `RUST_LOG` with an
/// info-level default. Call once at process startup.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
