//! Platform capability interfaces consumed by the session engine.
//!
//! The engine never talks to capture hardware, speech engines or gaze
//! trackers directly.  Everything goes through the traits below so a host
//! (desktop shell, rehearsal CLI, test harness) can plug in its own
//! implementation.
//!
//! | Trait                | Platform concept                          | Optional |
//! |----------------------|-------------------------------------------|----------|
//! | [`CameraCapture`]    | camera + microphone permission prompt     | no       |
//! | [`ScreenCapture`]    | screen-share picker                       | no       |
//! | [`SpeechSynthesizer`]| text-to-speech with start/end events      | no       |
//! | [`SpeechRecognizer`] | continuous speech recognition             | yes      |
//! | [`GazeEstimator`]    | webcam gaze estimation                    | yes      |

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::{MediaStream, TrackRef};

// ---------------------------------------------------------------------------
// CapabilityError
// ---------------------------------------------------------------------------

/// Failure reported by a platform capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    /// The user (or OS policy) refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The platform does not offer this capability at all.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The capability exists but the call failed.
    #[error("capability failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Media constraints passed with a camera request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub video: bool,
    pub audio: bool,
}

impl CaptureConstraints {
    /// Camera requests always need both a video and an audio track.
    pub const CAMERA_WITH_MICROPHONE: Self = Self {
        video: true,
        audio: true,
    };
}

/// Camera + microphone acquisition.
#[async_trait]
pub trait CameraCapture: Send + Sync {
    async fn request_camera_audio(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<MediaStream, CapabilityError>;
}

/// Screen-share acquisition.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn request_screen_share(&self) -> Result<MediaStream, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

/// Text-to-speech output.
///
/// `speak` resolves when the utterance ends (the platform's `onEnd`), either
/// naturally or because [`cancel`](Self::cancel) was called.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str, voice_id: Option<&str>) -> Result<(), CapabilityError>;

    /// Cut off whatever is currently being spoken.  Must be a no-op when
    /// nothing is playing.
    fn cancel(&self);
}

/// One recognition hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    /// `false` for interim hypotheses that may still change.
    pub is_final: bool,
}

/// Continuous speech recognition over a live audio track.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Start recognising `audio` until [`stop`](Self::stop) is called.
    ///
    /// Results (interim and final) are delivered on the returned channel.
    async fn start_continuous(
        &self,
        audio: TrackRef,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionResult>, CapabilityError>;

    fn stop(&self) -> Result<(), CapabilityError>;
}

// ---------------------------------------------------------------------------
// Gaze
// ---------------------------------------------------------------------------

/// Estimated on-screen gaze position in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazePoint {
    pub x: f32,
    pub y: f32,
}

/// Optional gaze estimation.
pub trait GazeEstimator: Send + Sync {
    /// Begin pushing gaze samples to `tx`.
    fn subscribe(&self, tx: mpsc::UnboundedSender<GazePoint>) -> Result<(), CapabilityError>;

    /// Stop pushing samples and release the tracker.
    fn unsubscribe(&self) -> Result<(), CapabilityError>;

    /// Visible viewport `(width, height)` the estimates are relative to.
    fn viewport(&self) -> (f32, f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_constraints_require_audio_and_video() {
        let c = CaptureConstraints::CAMERA_WITH_MICROPHONE;
        assert!(c.video && c.audio);
    }

    #[test]
    fn error_display_names_the_cause() {
        let e = CapabilityError::PermissionDenied("camera".into());
        assert_eq!(e.to_string(), "permission denied: camera");
    }
}
