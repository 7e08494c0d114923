//! Dialogue engine: speaks questions and collects the spoken answer.
//!
//! * [`deliver`](DialogueEngine::deliver) cancels any in-flight utterance,
//!   raises the [`SpeakingFlag`], and speaks the prompt on a background
//!   task; completion lowers the flag only if no newer utterance replaced it.
//! * [`listen`](DialogueEngine::listen) starts continuous recognition for
//!   the whole active session.  Final results are appended to the running
//!   transcript, which the session drains with
//!   [`take_transcript`](DialogueEngine::take_transcript) at submit time.
//!
//! Without a recognizer (or when it fails to start) the engine reports
//! [`RecognitionMode::TextOnly`] and the caller supplies answers directly.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::capability::{CapabilityError, SpeechRecognizer, SpeechSynthesizer};
use crate::dialogue::SpeakingFlag;
use crate::media::TrackRef;
use crate::services::Question;

/// Events the engine reports back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueEvent {
    /// A recognition hypothesis; finals are already in the transcript.
    Transcript { text: String, is_final: bool },
    /// An utterance ended, naturally or cancelled.  `error` carries a
    /// synthesis failure.
    SpeechFinished {
        generation: u64,
        error: Option<String>,
    },
}

/// Callback receiving every dialogue event.
pub type DialogueSink = Arc<dyn Fn(DialogueEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionMode {
    Speech,
    TextOnly,
}

pub struct DialogueEngine {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    voice_id: Option<String>,
    speaking: SpeakingFlag,
    transcript: Arc<Mutex<String>>,
    utterance: Option<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,
    mode: Option<RecognitionMode>,
}

impl DialogueEngine {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        voice_id: Option<String>,
    ) -> Self {
        Self {
            synthesizer,
            recognizer,
            voice_id,
            speaking: SpeakingFlag::new(),
            transcript: Arc::new(Mutex::new(String::new())),
            utterance: None,
            forwarder: None,
            mode: None,
        }
    }

    /// Reader handle for detectors.
    pub fn speaking_flag(&self) -> SpeakingFlag {
        self.speaking.clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.is_speaking()
    }

    /// `None` until [`listen`](Self::listen) has run.
    pub fn mode(&self) -> Option<RecognitionMode> {
        self.mode
    }

    // -----------------------------------------------------------------------
    // deliver
    // -----------------------------------------------------------------------

    /// Speak `question`'s prompt.  Returns the utterance generation.
    pub fn deliver(&mut self, question: &Question, sink: DialogueSink) -> u64 {
        self.cancel_speech();

        let generation = self.speaking.begin();
        let synthesizer = Arc::clone(&self.synthesizer);
        let speaking = self.speaking.clone();
        let prompt = question.prompt.clone();
        let voice = self.voice_id.clone();

        log::info!("dialogue: delivering question {} (utterance {generation})", question.id);
        self.utterance = Some(tokio::spawn(async move {
            let outcome = synthesizer.speak(&prompt, voice.as_deref()).await;
            speaking.finish(generation);

            let error = outcome.err().map(|e| {
                log::warn!("dialogue: synthesis failed: {e}");
                e.to_string()
            });
            sink(DialogueEvent::SpeechFinished { generation, error });
        }));
        generation
    }

    /// Cut off the current utterance, if any, and lower the flag.
    pub fn cancel_speech(&mut self) {
        if let Some(task) = self.utterance.take() {
            task.abort();
        }
        self.synthesizer.cancel();
        self.speaking.clear();
    }

    // -----------------------------------------------------------------------
    // listen
    // -----------------------------------------------------------------------

    /// Start continuous recognition on `audio`.
    ///
    /// Never fails: a missing recognizer, a missing audio track or a start
    /// error all degrade to [`RecognitionMode::TextOnly`].
    pub async fn listen(&mut self, audio: Option<TrackRef>, sink: DialogueSink) -> RecognitionMode {
        let mode = self.start_recognition(audio, sink).await;
        self.mode = Some(mode);
        mode
    }

    async fn start_recognition(
        &mut self,
        audio: Option<TrackRef>,
        sink: DialogueSink,
    ) -> RecognitionMode {
        let (Some(recognizer), Some(audio)) = (self.recognizer.clone(), audio) else {
            log::info!("dialogue: no recognizer or microphone; text-only answers");
            return RecognitionMode::TextOnly;
        };

        let mut results = match recognizer.start_continuous(audio).await {
            Ok(rx) => rx,
            Err(e) => {
                log::warn!("dialogue: recognition unavailable ({e}); text-only answers");
                return RecognitionMode::TextOnly;
            }
        };

        if let Some(previous) = self.forwarder.take() {
            previous.abort();
        }
        let transcript = Arc::clone(&self.transcript);
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                if result.is_final {
                    let mut buffer = transcript.lock().unwrap_or_else(PoisonError::into_inner);
                    append_final(&mut buffer, &result.text);
                }
                sink(DialogueEvent::Transcript {
                    text: result.text,
                    is_final: result.is_final,
                });
            }
        }));
        RecognitionMode::Speech
    }

    /// Drain the accumulated transcript for the current answer.
    pub fn take_transcript(&self) -> String {
        std::mem::take(&mut *self.transcript.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Stop recognition and the forwarding task.  Idempotent.
    pub fn stop_recognition(&mut self) -> Result<(), CapabilityError> {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        match (&self.recognizer, self.mode.take()) {
            (Some(recognizer), Some(RecognitionMode::Speech)) => recognizer.stop(),
            _ => Ok(()),
        }
    }
}

impl Drop for DialogueEngine {
    fn drop(&mut self) {
        if let Some(task) = self.utterance.take() {
            task.abort();
        }
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

fn append_final(buffer: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text);
}
