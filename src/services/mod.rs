//! External service collaborators of the interview engine.
//!
//! This module provides:
//! * [`QuestionBank`]: fetches the ordered question list for a session.
//! * [`AnswerEvaluator`]: scores one answer and returns feedback.
//! * [`ResultStore`]: persists the final [`ScoreRecord`].
//! * [`RecordingSink`]: exports or uploads the composite recording.
//! * [`HttpBackend`]: REST implementation of all four.
//! * [`FallbackEvaluator`]: wraps any evaluator; substitutes a neutral
//!   evaluation when the backend is down.
//! * [`FileExporter`]: writes recordings to a local directory.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use interview_proctor::config::AppConfig;
//! use interview_proctor::services::{AnswerEvaluator, FallbackEvaluator, HttpBackend, Question};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let backend = HttpBackend::from_config(&config.services);
//!     let evaluator = FallbackEvaluator::new(backend, config.services.fallback_score);
//!
//!     let question = Question {
//!         id: "q1".into(),
//!         prompt: "What is a React hook?".into(),
//!         expected_topics: vec!["state".into()],
//!     };
//!     let evaluation = evaluator.evaluate(&question, "useState...").await.unwrap();
//!     println!("{} / 10", evaluation.score);
//! }
//! ```

pub mod export;
pub mod fallback;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::RecordingBlob;
use crate::scoring::ScoreRecord;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use export::FileExporter;
pub use fallback::FallbackEvaluator;
pub use http::HttpBackend;

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Errors returned by backend collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP transport or connection error.
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("backend returned status {0}")]
    Status(u16),

    /// The response body could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The backend answered with nothing usable.
    #[error("backend returned an empty response")]
    EmptyResponse,

    /// Local I/O failure (file export).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if let Some(status) = e.status() {
            ServiceError::Status(status.as_u16())
        } else {
            ServiceError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// One interview question.  Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub expected_topics: Vec<String>,
}

/// Feedback for a single answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0–10.
    pub score: f32,
    pub feedback: String,
    #[serde(default)]
    pub status: String,
}

/// Descriptive metadata sent along with a recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub session_id: String,
    pub subject: String,
    pub file_name: String,
    pub mime_type: String,
}

/// Where an exported recording ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "location")]
pub enum RecordingLocation {
    File(std::path::PathBuf),
    Url(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn fetch_questions(&self, subject: &str) -> Result<Vec<Question>, ServiceError>;

    async fn generate_from_resume(&self) -> Result<Vec<Question>, ServiceError>;
}

#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    async fn evaluate(&self, question: &Question, answer: &str)
        -> Result<Evaluation, ServiceError>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_interview_result(&self, record: &ScoreRecord) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait RecordingSink: Send + Sync {
    async fn export(
        &self,
        blob: &RecordingBlob,
        metadata: &RecordingMetadata,
    ) -> Result<RecordingLocation, ServiceError>;
}
