//! Shared "system voice is active" flag.
//!
//! Written only by [`DialogueEngine`](crate::dialogue::DialogueEngine), read
//! by the whisper detector on every tick.  Each utterance gets a generation
//! number so the completion of a cancelled utterance cannot clear the flag
//! raised by the one that replaced it.
//!
//! Generation and flag share one atomic word (`generation << 1 | speaking`)
//! so a completion can compare-and-clear without racing a new `begin`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const SPEAKING: u64 = 1;

#[derive(Debug, Clone, Default)]
pub struct SpeakingFlag {
    state: Arc<AtomicU64>,
}

impl SpeakingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_speaking(&self) -> bool {
        self.state.load(Ordering::Acquire) & SPEAKING != 0
    }

    pub fn generation(&self) -> u64 {
        self.state.load(Ordering::Acquire) >> 1
    }

    fn bump(&self, speaking: bool) -> u64 {
        let flag = u64::from(speaking);
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some((((v >> 1) + 1) << 1) | flag)
            })
            .unwrap_or_else(|v| v);
        (previous >> 1) + 1
    }

    /// Raise the flag for a new utterance and return its generation.
    pub(crate) fn begin(&self) -> u64 {
        self.bump(true)
    }

    /// Lower the flag if `generation` is still the latest utterance.
    pub(crate) fn finish(&self, generation: u64) -> bool {
        self.state
            .compare_exchange(
                (generation << 1) | SPEAKING,
                generation << 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Lower the flag unconditionally and invalidate any in-flight utterance.
    pub(crate) fn clear(&self) {
        self.bump(false);
    }
}
