//! Session lifecycle state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::Question;

/// States of an interview session.
///
/// ```text
/// Idle ──start──▶ Countdown(3,2,1) ──0──▶ Acquiring ──granted──▶ Active{0}
///                     │                       │                    │ submit
///                     │                       └──denied──▶ Idle    ▼
///                     │                                       Active{i+1}
///                     └──────────end──────────┐                    │ last submit / end
///                                             ▼                    ▼
///                                         Finishing ──teardown──▶ Terminated
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Countdown {
        remaining: u32,
    },
    Acquiring,
    #[serde(rename_all = "camelCase")]
    Active {
        question_index: usize,
    },
    Finishing,
    Terminated,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Countdown { .. } => "Countdown",
            SessionState::Acquiring => "Acquiring",
            SessionState::Active { .. } => "Active",
            SessionState::Finishing => "Finishing",
            SessionState::Terminated => "Terminated",
        }
    }

    /// `Terminated` absorbs every further input.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    /// States from which an explicit End routes to `Finishing`.
    pub fn accepts_end(&self) -> bool {
        matches!(
            self,
            SessionState::Countdown { .. } | SessionState::Active { .. }
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Countdown { remaining } => write!(f, "Countdown({remaining})"),
            SessionState::Active { question_index } => write!(f, "Active(q{question_index})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One interview attempt.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    /// Subject label persisted with the score.
    pub subject: String,
    /// Fixed once the session leaves `Idle`.
    pub questions: Vec<Question>,
    /// Set on entering `Active`.
    pub started_at: Option<DateTime<Utc>>,
    pub violation_count: u32,
}

impl Session {
    pub fn new(subject: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            subject: subject.into(),
            questions,
            started_at: None,
            violation_count: 0,
        }
    }

    /// The question being asked, when `Active`.
    pub fn current_question(&self) -> Option<&Question> {
        match self.state {
            SessionState::Active { question_index } => self.questions.get(question_index),
            _ => None,
        }
    }

    pub fn is_last_question(&self, index: usize) -> bool {
        index + 1 >= self.questions.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("", Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str) -> Question {
        Question {
            id: id.into(),
            prompt: format!("prompt {id}"),
            expected_topics: vec![],
        }
    }

    #[test]
    fn end_is_accepted_only_from_countdown_and_active() {
        assert!(SessionState::Countdown { remaining: 2 }.accepts_end());
        assert!(SessionState::Active { question_index: 0 }.accepts_end());
        assert!(!SessionState::Idle.accepts_end());
        assert!(!SessionState::Acquiring.accepts_end());
        assert!(!SessionState::Finishing.accepts_end());
        assert!(!SessionState::Terminated.accepts_end());
    }

    #[test]
    fn current_question_follows_active_index() {
        let mut s = Session::new("React", vec![q("a"), q("b")]);
        assert!(s.current_question().is_none());

        s.state = SessionState::Active { question_index: 1 };
        assert_eq!(s.current_question().map(|q| q.id.as_str()), Some("b"));
        assert!(s.is_last_question(1));
        assert!(!s.is_last_question(0));
    }

    #[test]
    fn new_state_and_session_start_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(Session::default().state, SessionState::Idle);
    }

    #[test]
    fn each_session_gets_a_fresh_id() {
        assert_ne!(Session::default().id, Session::default().id);
    }

    #[test]
    fn display_includes_payload() {
        assert_eq!(SessionState::Countdown { remaining: 3 }.to_string(), "Countdown(3)");
        assert_eq!(
            SessionState::Active { question_index: 4 }.to_string(),
            "Active(q4)"
        );
        assert_eq!(SessionState::Terminated.to_string(), "Terminated");
    }
}
