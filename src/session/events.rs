//! Commands in, events out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::dialogue::{DialogueEvent, RecognitionMode};
use crate::media::AcquisitionError;
use crate::monitor::{DetectionSignal, IntegritySummary};
use crate::scoring::{Answer, ScoreRecord};
use crate::services::{Question, RecordingLocation, ServiceError};
use crate::session::SessionState;

/// Where the session's questions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSource {
    /// Question bank for a named subject.
    Subject(String),
    /// Questions generated from the candidate's resume.
    Resume,
}

impl QuestionSource {
    /// Subject label recorded with the score.
    pub fn subject(&self) -> &str {
        match self {
            QuestionSource::Subject(s) => s,
            QuestionSource::Resume => "Resume",
        }
    }
}

/// User/host actions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Start(QuestionSource),
    /// Submit the current answer.  `None` uses the recognised transcript.
    Submit { answer: Option<String> },
    End,
    VisibilityChanged { hidden: bool },
}

/// Everything the controller reacts to, including its own timers and
/// background tasks.
#[derive(Debug, Clone)]
pub(crate) enum SessionInput {
    Command(SessionCommand),
    Signal(DetectionSignal),
    Dialogue(DialogueEvent),
    CountdownTick,
    QuestionTick { index: usize, elapsed_secs: u64 },
}

/// Notifications for the host UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Countdown {
        remaining: u32,
    },
    QuestionDelivered {
        index: usize,
        total: usize,
        question: Question,
    },
    /// Subtitle line; finals are part of the answer transcript.
    Transcript {
        text: String,
        is_final: bool,
    },
    Signal(DetectionSignal),
    ViolationRecorded {
        count: u32,
    },
    AnswerRecorded {
        index: usize,
        answer: Answer,
    },
    /// Advisory elapsed time on the current question.
    QuestionElapsed {
        index: usize,
        elapsed_secs: u64,
        limit_secs: u64,
    },
    RecognitionMode(RecognitionMode),
    Error(String),
    Finished(Box<SessionReport>),
}

/// Everything a reviewer needs after the session ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub record: ScoreRecord,
    pub integrity: IntegritySummary,
    pub recording: Option<RecordingLocation>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not load questions: {0}")]
    QuestionFetch(#[from] ServiceError),

    #[error("no questions available for this session")]
    NoQuestions,

    #[error("media acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("session controller is no longer running")]
    ControllerGone,
}
