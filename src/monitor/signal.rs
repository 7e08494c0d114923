//! Detector outputs and the rolling signal log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Frame-difference classification of one motion sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionLevel {
    High,
    Static,
    Normal,
}

/// One observation emitted by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DetectionSignal {
    /// The interview surface was hidden (`lost`) or came back.
    Visibility { lost: bool },
    Motion { level: MotionLevel },
    /// Sustained low-level speech started (`true`) or subsided.
    AudioActivity { whispering: bool },
    /// Share of recent gaze samples that landed on screen, 0–100.
    GazeAttention { score: u8 },
}

impl DetectionSignal {
    /// Signals worth surfacing as a warning to the candidate.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            DetectionSignal::Visibility { lost: true }
                | DetectionSignal::Motion {
                    level: MotionLevel::High | MotionLevel::Static
                }
                | DetectionSignal::AudioActivity { whispering: true }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub at: DateTime<Utc>,
    pub signal: DetectionSignal,
}

/// Bounded, oldest-first history of recent signals.
#[derive(Debug, Clone)]
pub struct SignalLog {
    records: VecDeque<SignalRecord>,
    capacity: usize,
}

impl SignalLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, signal: DetectionSignal) {
        self.push_at(Utc::now(), signal);
    }

    pub fn push_at(&mut self, at: DateTime<Utc>, signal: DetectionSignal) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(SignalRecord { at, signal });
    }

    pub fn records(&self) -> impl Iterator<Item = &SignalRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Integrity figures attached to the final session report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySummary {
    /// Visibility losses while the session was active.
    pub violation_count: u32,
    pub high_motion_events: u32,
    pub static_events: u32,
    pub whisper_alerts: u32,
    /// Lowest gaze attention score seen, if gaze tracking ran.
    pub lowest_attention: Option<u8>,
}

impl IntegritySummary {
    /// Fold one signal into the running totals.  Visibility losses are
    /// counted by the session itself since only those during an active
    /// session are violations.
    pub fn record(&mut self, signal: &DetectionSignal) {
        match *signal {
            DetectionSignal::Motion {
                level: MotionLevel::High,
            } => self.high_motion_events += 1,
            DetectionSignal::Motion {
                level: MotionLevel::Static,
            } => self.static_events += 1,
            DetectionSignal::AudioActivity { whispering: true } => self.whisper_alerts += 1,
            DetectionSignal::GazeAttention { score } => {
                self.lowest_attention = Some(self.lowest_attention.map_or(score, |l| l.min(score)));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_drops_oldest_beyond_capacity() {
        let mut log = SignalLog::new(2);
        log.push(DetectionSignal::Visibility { lost: true });
        log.push(DetectionSignal::Visibility { lost: false });
        log.push(DetectionSignal::GazeAttention { score: 10 });

        let kept: Vec<_> = log.records().map(|r| r.signal).collect();
        assert_eq!(
            kept,
            vec![
                DetectionSignal::Visibility { lost: false },
                DetectionSignal::GazeAttention { score: 10 },
            ]
        );
    }

    #[test]
    fn summary_tracks_lowest_attention_and_alerts() {
        let mut summary = IntegritySummary::default();
        for s in [
            DetectionSignal::GazeAttention { score: 80 },
            DetectionSignal::GazeAttention { score: 35 },
            DetectionSignal::GazeAttention { score: 90 },
            DetectionSignal::Motion {
                level: MotionLevel::High,
            },
            DetectionSignal::Motion {
                level: MotionLevel::Normal,
            },
            DetectionSignal::AudioActivity { whispering: true },
            DetectionSignal::AudioActivity { whispering: false },
        ] {
            summary.record(&s);
        }
        assert_eq!(summary.lowest_attention, Some(35));
        assert_eq!(summary.high_motion_events, 1);
        assert_eq!(summary.static_events, 0);
        assert_eq!(summary.whisper_alerts, 1);
    }

    #[test]
    fn alerts_exclude_recoveries() {
        assert!(DetectionSignal::Visibility { lost: true }.is_alert());
        assert!(!DetectionSignal::Visibility { lost: false }.is_alert());
        assert!(!DetectionSignal::AudioActivity { whispering: false }.is_alert());
        assert!(!DetectionSignal::GazeAttention { score: 0 }.is_alert());
    }

    #[test]
    fn signal_serialises_with_kind_tag() {
        let json = serde_json::to_value(DetectionSignal::Motion {
            level: MotionLevel::Static,
        })
        .unwrap();
        assert_eq!(json["kind"], "motion");
        assert_eq!(json["level"], "static");
    }
}
