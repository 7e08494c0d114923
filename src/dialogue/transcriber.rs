//! Offline transcription of closed audio segments.
//!
//! [`Transcriber`] is the blocking audio → text step behind the continuous
//! recognizer.  It is object-safe and `Send + Sync` so one loaded model can
//! sit behind an `Arc<dyn Transcriber>` and be called from
//! `spawn_blocking`.
//!
//! [`WhisperTranscriber`] wraps a `whisper_rs::WhisperContext`.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::capability::CapabilityError;

/// Minimum segment: 0.5 s × 16 000 Hz.
pub const MIN_SEGMENT_SAMPLES: usize = 8_000;
/// Maximum segment: 60 s × 16 000 Hz.
pub const MAX_SEGMENT_SAMPLES: usize = 960_000;

#[derive(Debug, Clone, Error)]
pub enum RecognizerError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("audio too short (minimum 0.5 s at 16 kHz)")]
    AudioTooShort,

    #[error("audio too long (maximum 60 s at 16 kHz)")]
    AudioTooLong,
}

impl From<RecognizerError> for CapabilityError {
    fn from(e: RecognizerError) -> Self {
        match e {
            RecognizerError::ModelNotFound(_) | RecognizerError::ContextInit(_) => {
                CapabilityError::Unavailable(e.to_string())
            }
            other => CapabilityError::Failed(other.to_string()),
        }
    }
}

/// Blocking speech-to-text over 16 kHz mono `f32` audio.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, RecognizerError>;
}

fn check_length(audio: &[f32]) -> Result<(), RecognizerError> {
    if audio.len() < MIN_SEGMENT_SAMPLES {
        return Err(RecognizerError::AudioTooShort);
    }
    if audio.len() > MAX_SEGMENT_SAMPLES {
        return Err(RecognizerError::AudioTooLong);
    }
    Ok(())
}

fn inference_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// WhisperTranscriber
// ---------------------------------------------------------------------------

pub struct WhisperTranscriber {
    ctx: WhisperContext,
    /// ISO-639-1 code, or `"auto"`.
    language: String,
    n_threads: i32,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("language", &self.language)
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading and every call creates its own state.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    pub fn load(model_path: impl AsRef<Path>, language: &str) -> Result<Self, RecognizerError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(RecognizerError::ModelNotFound(path.display().to_string()));
        }
        let path_str = path.to_str().ok_or_else(|| {
            RecognizerError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| RecognizerError::ContextInit(e.to_string()))?;

        log::info!("whisper model loaded from {}", path.display());
        Ok(Self {
            ctx,
            language: language.to_string(),
            n_threads: inference_threads(),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[f32]) -> Result<String, RecognizerError> {
        check_length(audio)?;

        let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang = (self.language != "auto").then_some(self.language.as_str());
        fp.set_language(lang);
        fp.set_n_threads(self.n_threads);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| RecognizerError::ContextInit(e.to_string()))?;
        state
            .full(fp, audio)
            .map_err(|e| RecognizerError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| RecognizerError::Transcription(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| RecognizerError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }
        Ok(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// Returns a fixed response; enforces the same length contract.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, RecognizerError>,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
        }
    }

    pub fn err(error: RecognizerError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &[f32]) -> Result<String, RecognizerError> {
        check_length(audio)?;
        self.response.clone()
    }
}
