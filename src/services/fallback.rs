//! Fallback evaluator: wraps any [`AnswerEvaluator`] and substitutes a
//! neutral evaluation on error.
//!
//! When the feedback backend fails for any reason (`Request`, `Timeout`,
//! `Status`, `Parse`, `EmptyResponse`) the candidate still gets a score and
//! the session keeps moving; a backend outage never blocks the interview.

use async_trait::async_trait;

use crate::services::{AnswerEvaluator, Evaluation, Question, ServiceError};

pub const FALLBACK_FEEDBACK: &str =
    "Automatic feedback is unavailable right now; a reviewer will assess this answer.";

pub const FALLBACK_STATUS: &str = "pending-review";

/// A transparent wrapper that never returns an error.
pub struct FallbackEvaluator<E: AnswerEvaluator> {
    inner: E,
    neutral_score: f32,
}

impl<E: AnswerEvaluator> FallbackEvaluator<E> {
    /// Wrap `inner`; `neutral_score` (0–10) is used when it fails.
    pub fn new(inner: E, neutral_score: f32) -> Self {
        Self {
            inner,
            neutral_score: neutral_score.clamp(0.0, 10.0),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// The evaluation substituted on failure.
    pub fn neutral(&self) -> Evaluation {
        Evaluation {
            score: self.neutral_score,
            feedback: FALLBACK_FEEDBACK.into(),
            status: FALLBACK_STATUS.into(),
        }
    }
}

#[async_trait]
impl<E: AnswerEvaluator> AnswerEvaluator for FallbackEvaluator<E> {
    async fn evaluate(
        &self,
        question: &Question,
        answer: &str,
    ) -> Result<Evaluation, ServiceError> {
        match self.inner.evaluate(question, answer).await {
            Ok(evaluation) => Ok(evaluation),
            Err(err) => {
                log::warn!(
                    "feedback for question {} failed ({err}); using neutral score {}",
                    question.id,
                    self.neutral_score
                );
                Ok(self.neutral())
            }
        }
    }
}
