//! Visibility detector: tracks whether the interview surface is hidden.

use crate::monitor::DetectionSignal;

/// Edge detector over host visibility notifications.
///
/// A hide while the session is active emits `Visibility { lost: true }`
/// every time (each one is a separate violation).  A show emits
/// `Visibility { lost: false }` only after a loss was reported.
#[derive(Debug, Default)]
pub struct VisibilityDetector {
    lost: bool,
}

impl VisibilityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, hidden: bool, session_active: bool) -> Option<DetectionSignal> {
        match (hidden, session_active) {
            (true, true) => {
                self.lost = true;
                Some(DetectionSignal::Visibility { lost: true })
            }
            (false, _) if self.lost => {
                self.lost = false;
                Some(DetectionSignal::Visibility { lost: false })
            }
            _ => None,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn reset(&mut self) {
        self.lost = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hide_while_active_is_reported_each_time() {
        let mut d = VisibilityDetector::new();
        assert_eq!(
            d.observe(true, true),
            Some(DetectionSignal::Visibility { lost: true })
        );
        assert_eq!(
            d.observe(true, true),
            Some(DetectionSignal::Visibility { lost: true })
        );
    }

    #[test]
    fn hide_while_inactive_is_ignored() {
        let mut d = VisibilityDetector::new();
        assert_eq!(d.observe(true, false), None);
        assert_eq!(d.observe(false, false), None);
    }

    #[test]
    fn show_after_loss_reports_recovery_once() {
        let mut d = VisibilityDetector::new();
        d.observe(true, true);
        assert_eq!(
            d.observe(false, true),
            Some(DetectionSignal::Visibility { lost: false })
        );
        assert_eq!(d.observe(false, true), None);
        assert!(!d.is_lost());
    }
}
