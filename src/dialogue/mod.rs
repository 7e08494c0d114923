//! Dialogue: question playback and spoken-answer capture.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      DialogueEngine                       │
//! │                                                           │
//! │  deliver(q) ──▶ SpeechSynthesizer ──▶ SpeakingFlag ◀── monitor
//! │                                                           │
//! │  listen(mic) ─▶ SpeechRecognizer ──▶ transcript buffer    │
//! │                   │                                       │
//! │                   └─ ContinuousRecognizer                 │
//! │                        └─ Transcriber (Whisper)           │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod recognizer;
pub mod speaking;
pub mod transcriber;

pub use engine::{DialogueEngine, DialogueEvent, DialogueSink, RecognitionMode};
pub use recognizer::ContinuousRecognizer;
pub use speaking::SpeakingFlag;
pub use transcriber::{RecognizerError, Transcriber, WhisperTranscriber};
