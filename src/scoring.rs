//! Answer collection and final score computation.
//!
//! `final_score = round(mean(answer.score) × 10)`, so per-answer scores of
//! 0–10 map onto 0–100.  Status thresholds:
//!
//! | final score | status        |
//! |-------------|---------------|
//! | ≥ 90        | `Outstanding` |
//! | ≥ 75        | `Excellent`   |
//! | ≥ 60        | `Good`        |
//! | otherwise   | `Average`     |

use std::collections::BTreeMap;

use serde::Serialize;

/// One evaluated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub transcript: String,
    pub feedback: String,
    /// 0–10.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScoreStatus {
    Outstanding,
    Excellent,
    Good,
    Average,
}

impl ScoreStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => ScoreStatus::Outstanding,
            75..=89 => ScoreStatus::Excellent,
            60..=74 => ScoreStatus::Good,
            _ => ScoreStatus::Average,
        }
    }
}

impl std::fmt::Display for ScoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoreStatus::Outstanding => "Outstanding",
            ScoreStatus::Excellent => "Excellent",
            ScoreStatus::Good => "Good",
            ScoreStatus::Average => "Average",
        };
        f.write_str(s)
    }
}

/// Final result handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub subject: String,
    /// 0–100.
    pub final_score: u8,
    pub status: ScoreStatus,
    /// Answers in question order.
    pub breakdown: Vec<Answer>,
}

/// Answers keyed by question order.
#[derive(Debug, Default)]
pub struct ScoringAggregator {
    answers: BTreeMap<usize, Answer>,
}

impl ScoringAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the answer to question `order`.  A second answer for the same
    /// question is ignored; answers are immutable once recorded.
    pub fn append(&mut self, order: usize, answer: Answer) -> bool {
        if self.answers.contains_key(&order) {
            log::warn!("scoring: question {order} already answered; ignoring");
            return false;
        }
        self.answers.insert(order, answer);
        true
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Score whatever has been collected.  No answers scores 0.
    pub fn finalize(&self, subject: &str) -> ScoreRecord {
        let breakdown: Vec<Answer> = self.answers.values().cloned().collect();

        let final_score = if breakdown.is_empty() {
            0
        } else {
            let mean = breakdown
                .iter()
                .map(|a| f64::from(a.score.clamp(0.0, 10.0)))
                .sum::<f64>()
                / breakdown.len() as f64;
            (mean * 10.0).round().clamp(0.0, 100.0) as u8
        };

        ScoreRecord {
            subject: subject.to_string(),
            final_score,
            status: ScoreStatus::from_score(final_score),
            breakdown,
        }
    }
}
