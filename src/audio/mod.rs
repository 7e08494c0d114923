//! Audio plumbing: microphone capture, buffering, conversion and analysis.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback ─┬─▶ RingBuffer (recent mono window) → SpectrumAnalyser → whisper detector
//!                             └─▶ AudioChunk (broadcast) ─┬─▶ recorder
//!                                                         └─▶ downmix → resample(16k) → VadDetector → recognizer
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use interview_proctor::audio::{MicrophoneTrack, SpectrumAnalyser, mean_level};
//! use interview_proctor::media::MediaTrack;
//!
//! let mic = MicrophoneTrack::open(4096).unwrap();
//! let mut analyser = SpectrumAnalyser::new(256);
//! let bins = analyser.byte_frequency_data(&mic.recent_samples(256));
//! println!("level {}", mean_level(&bins));
//! mic.stop();
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;
pub mod spectrum;
pub mod vad;

pub use buffer::RingBuffer;
pub use capture::{AudioChunk, CaptureError, MicrophoneTrack};
pub use resample::{downmix, resample, RECOGNIZER_RATE};
pub use spectrum::{mean_level, SpectrumAnalyser};
pub use vad::VadDetector;
