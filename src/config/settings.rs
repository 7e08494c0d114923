//! Engine settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the
//! background tasks by value.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing of the interview session itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds shown in the pre-session countdown (3 → 2 → 1).
    pub countdown_secs: u32,
    /// Display limit for a single question in seconds.
    pub question_time_limit_secs: u64,
    /// Submit the current transcript automatically when the limit expires.
    ///
    /// Off by default: the timer is advisory and only drives the display.
    pub auto_submit_on_timeout: bool,
    /// Number of detection signals kept in the rolling review log.
    pub signal_log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            question_time_limit_secs: 120,
            auto_submit_on_timeout: false,
            signal_log_capacity: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Picture-in-picture compositing and recording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Compositor frame rate.
    pub fps: u32,
    /// Output canvas width in pixels.
    pub canvas_width: u32,
    /// Output canvas height in pixels.
    pub canvas_height: u32,
    /// Width of the camera inset drawn in the bottom-right corner.
    pub inset_width: u32,
    /// Height of the camera inset.
    pub inset_height: u32,
    /// Gap between the inset and the canvas edges.
    pub inset_margin: u32,
    /// Number of composite frames grouped into one recorder chunk.
    pub frames_per_chunk: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            canvas_width: 1280,
            canvas_height: 720,
            inset_width: 240,
            inset_height: 180,
            inset_margin: 20,
            frames_per_chunk: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Tuning constants for the integrity detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Motion sampling period in milliseconds.
    pub motion_interval_ms: u64,
    /// Downsampled motion grid width.
    pub motion_grid_width: u32,
    /// Downsampled motion grid height.
    pub motion_grid_height: u32,
    /// Per-pixel luminance delta (0–255) that counts as "changed".
    pub motion_delta_threshold: u8,
    /// Changed-pixel fraction above which motion is `High`.
    pub motion_high_ratio: f32,
    /// Changed-pixel fraction below which the frame is `Static`.
    pub motion_static_ratio: f32,

    /// FFT size used for the microphone spectrum (power of two).
    pub audio_fft_size: usize,
    /// Audio analysis rate in ticks per second.
    pub audio_tick_hz: u32,
    /// Lower bound (inclusive) of the "low but non-silent" band, 0–255 scale.
    pub whisper_band_low: f32,
    /// Upper bound (inclusive) of the band.
    pub whisper_band_high: f32,
    /// Counter value the whisper counter must exceed before firing.
    pub whisper_sustain_ticks: u32,

    /// Enable the gaze tracker (needs an estimator capability).
    pub gaze_enabled: bool,
    /// Rolling gaze buffer capacity.
    pub gaze_buffer_capacity: usize,
    /// Recompute the attention score every N gaze samples.
    pub gaze_recompute_every: usize,
    /// Heat-trail fade period in milliseconds.
    pub heat_fade_interval_ms: u64,
    /// Alpha removed from every overlay cell per fade tick.
    pub heat_fade_alpha: f32,
    /// Radius of the radial gradient painted per gaze sample.
    pub heat_radius: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            motion_interval_ms: 1000,
            motion_grid_width: 64,
            motion_grid_height: 48,
            motion_delta_threshold: 50,
            motion_high_ratio: 0.20,
            motion_static_ratio: 0.01,
            audio_fft_size: 256,
            audio_tick_hz: 60,
            whisper_band_low: 8.0,
            whisper_band_high: 35.0,
            whisper_sustain_ticks: 100,
            gaze_enabled: false,
            gaze_buffer_capacity: 50,
            gaze_recompute_every: 10,
            heat_fade_interval_ms: 50,
            heat_fade_alpha: 0.05,
            heat_radius: 40.0,
        }
    }
}

// ---------------------------------------------------------------------------
// DialogueConfig
// ---------------------------------------------------------------------------

/// Speech synthesis and recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Synthesizer voice identifier: `None` means the platform default.
    pub voice_id: Option<String>,
    /// Recognition language as an ISO-639-1 code, or `"auto"`.
    pub language: String,
    /// Disable recognition entirely (text-only answers).
    pub recognition_enabled: bool,
    /// GGML model file stem under the models directory.
    pub model: String,
    /// Longest audio segment handed to the recognizer in one pass.
    pub max_segment_secs: f32,
    /// Trailing silence that closes a segment early.
    pub silence_close_secs: f32,
    /// RMS threshold used to classify recognizer frames as voice.
    pub vad_threshold: f32,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            voice_id: None,
            language: "en".into(),
            recognition_enabled: true,
            model: "ggml-base.en".into(),
            max_segment_secs: 8.0,
            silence_close_secs: 0.8,
            vad_threshold: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Connection details for the recruitment backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the REST backend (no trailing slash).
    pub base_url: String,
    /// Bearer token: `None` for unauthenticated local backends.
    pub api_key: Option<String>,
    /// Maximum seconds to wait for a backend response.
    pub timeout_secs: u64,
    /// Score (0–10) substituted when the feedback service is unreachable.
    pub fallback_score: f32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            api_key: None,
            timeout_secs: 15,
            fallback_score: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingConfig
// ---------------------------------------------------------------------------

/// Where the composite recording goes when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Upload to the backend instead of writing a local file.
    pub upload: bool,
    /// Local export directory: `None` means [`AppPaths::recordings_dir`].
    pub export_dir: Option<std::path::PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            upload: false,
            export_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use interview_proctor::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert_eq!(config.session.countdown_secs, 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    pub monitor: MonitorConfig,
    pub dialogue: DialogueConfig,
    pub services: ServiceConfig,
    pub recording: RecordingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory the local recording exporter writes into.
    pub fn export_dir(&self) -> std::path::PathBuf {
        self.recording
            .export_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().recordings_dir)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
