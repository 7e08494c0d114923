//! Continuous recognizer: segments live PCM and transcribes each segment.
//!
//! ```text
//! AudioChunk (broadcast) → downmix → resample(16 kHz) → segment buffer
//!        segment closes on trailing silence or max length
//!                 → trim_silence → spawn_blocking(Transcriber) → final result
//! ```
//!
//! Segmenting and transcription run as two tasks joined by a channel so a
//! slow transcription never stalls reading the audio feed.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audio::{downmix, resample, VadDetector, RECOGNIZER_RATE};
use crate::capability::{CapabilityError, RecognitionResult, SpeechRecognizer};
use crate::config::DialogueConfig;
use crate::dialogue::transcriber::{Transcriber, MAX_SEGMENT_SAMPLES, MIN_SEGMENT_SAMPLES};
use crate::media::TrackRef;

pub struct ContinuousRecognizer {
    transcriber: Arc<dyn Transcriber>,
    vad: VadDetector,
    max_segment: usize,
    silence_close: usize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ContinuousRecognizer {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: &DialogueConfig) -> Self {
        let rate = RECOGNIZER_RATE as f32;
        Self {
            transcriber,
            vad: VadDetector::new(config.vad_threshold),
            max_segment: ((config.max_segment_secs * rate) as usize)
                .clamp(MIN_SEGMENT_SAMPLES, MAX_SEGMENT_SAMPLES),
            silence_close: ((config.silence_close_secs * rate) as usize).max(1),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

#[async_trait]
impl SpeechRecognizer for ContinuousRecognizer {
    async fn start_continuous(
        &self,
        audio: TrackRef,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionResult>, CapabilityError> {
        let feed = audio.subscribe_audio().ok_or_else(|| {
            CapabilityError::Unavailable(format!("track {} has no PCM feed", audio.id()))
        })?;

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (segments_tx, segments_rx) = mpsc::unbounded_channel::<Vec<f32>>();

        tokio::spawn(transcribe_segments(
            Arc::clone(&self.transcriber),
            segments_rx,
            results_tx,
        ));
        let segmenter = tokio::spawn(segment_feed(
            feed,
            self.vad.clone(),
            self.max_segment,
            self.silence_close,
            segments_tx,
        ));

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(segmenter);
        if let Some(previous) = previous {
            previous.abort();
        }

        log::info!("recognizer: listening on {}", audio.id());
        Ok(results_rx)
    }

    fn stop(&self) -> Result<(), CapabilityError> {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            // dropping the segment sender lets the transcription task drain
            task.abort();
            log::info!("recognizer: stopped");
        }
        Ok(())
    }
}

async fn segment_feed(
    mut feed: broadcast::Receiver<crate::audio::AudioChunk>,
    vad: VadDetector,
    max_segment: usize,
    silence_close: usize,
    segments: mpsc::UnboundedSender<Vec<f32>>,
) {
    let mut segment: Vec<f32> = Vec::new();
    let mut heard_voice = false;

    loop {
        let chunk = match feed.recv().await {
            Ok(chunk) => chunk,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("recognizer: dropped {n} audio chunks");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let pcm = resample(
            &downmix(&chunk.samples, chunk.channels),
            chunk.sample_rate,
            RECOGNIZER_RATE,
        );
        heard_voice |= vad.is_voice(&pcm);
        segment.extend_from_slice(&pcm);

        if !heard_voice {
            // only keep enough lead-in to not clip the first word
            let excess = segment.len().saturating_sub(silence_close);
            segment.drain(..excess);
            continue;
        }

        if segment.len() >= max_segment || vad.trailing_silence(&segment) >= silence_close {
            heard_voice = false;
            let closed = std::mem::take(&mut segment);
            if segments.send(vad.trim_silence(&closed).to_vec()).is_err() {
                break;
            }
        }
    }

    if heard_voice {
        let _ = segments.send(vad.trim_silence(&segment).to_vec());
    }
}

async fn transcribe_segments(
    transcriber: Arc<dyn Transcriber>,
    mut segments: mpsc::UnboundedReceiver<Vec<f32>>,
    results: mpsc::UnboundedSender<RecognitionResult>,
) {
    let min_len = MIN_SEGMENT_SAMPLES;
    while let Some(segment) = segments.recv().await {
        let transcriber = Arc::clone(&transcriber);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut audio = segment;
            // pad short utterances ("yes") up to the model minimum
            if audio.len() < min_len {
                audio.resize(min_len, 0.0);
            }
            transcriber.transcribe(&audio)
        })
        .await;

        match outcome {
            Ok(Ok(text)) if !text.is_empty() => {
                let result = RecognitionResult {
                    text,
                    is_final: true,
                };
                if results.send(result).is_err() {
                    break;
                }
            }
            Ok(Ok(_)) => log::debug!("recognizer: segment produced no text"),
            Ok(Err(e)) => log::warn!("recognizer: transcription failed: {e}"),
            Err(e) => log::error!("recognizer: transcription task panicked: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;
    use crate::dialogue::transcriber::{MockTranscriber, RecognizerError};
    use crate::media::testing::CountingTrack;
    use std::time::Duration;

    fn chunk(value: f32) -> AudioChunk {
        AudioChunk {
            samples: vec![value; 1_600],
            sample_rate: 16_000,
            channels: 1,
        }
    }

    fn recognizer(t: MockTranscriber) -> ContinuousRecognizer {
        ContinuousRecognizer::new(Arc::new(t), &DialogueConfig::default())
    }

    #[tokio::test]
    async fn utterance_followed_by_silence_yields_final_text() {
        let mic = CountingTrack::audio("mic");
        let rec = recognizer(MockTranscriber::ok("I would use a hook"));
        let mut results = rec.start_continuous(mic.clone()).await.unwrap();

        for _ in 0..10 {
            mic.push_chunk(chunk(0.5));
        }
        for _ in 0..10 {
            mic.push_chunk(chunk(0.0));
        }

        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("timed out")
            .expect("result");
        assert_eq!(
            result,
            RecognitionResult {
                text: "I would use a hook".into(),
                is_final: true,
            }
        );
        rec.stop().unwrap();
    }

    #[tokio::test]
    async fn pure_silence_is_never_transcribed() {
        let mic = CountingTrack::audio("mic");
        let rec = recognizer(MockTranscriber::ok("ghost text"));
        let mut results = rec.start_continuous(mic.clone()).await.unwrap();

        for _ in 0..30 {
            mic.push_chunk(chunk(0.0));
        }
        let outcome = tokio::time::timeout(Duration::from_millis(300), results.recv()).await;
        assert!(outcome.is_err(), "silence produced {outcome:?}");
        rec.stop().unwrap();
    }

    #[tokio::test]
    async fn transcription_errors_are_skipped() {
        let mic = CountingTrack::audio("mic");
        let rec = recognizer(MockTranscriber::err(RecognizerError::Transcription(
            "decoder".into(),
        )));
        let mut results = rec.start_continuous(mic.clone()).await.unwrap();

        for v in [0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] {
            mic.push_chunk(chunk(v));
        }
        let outcome = tokio::time::timeout(Duration::from_millis(300), results.recv()).await;
        assert!(outcome.is_err());
        rec.stop().unwrap();
    }

    #[tokio::test]
    async fn video_track_is_rejected_as_unavailable() {
        let camera = CountingTrack::video("cam", crate::media::VideoFrame::solid(1, 1, [0; 4]));
        let rec = recognizer(MockTranscriber::ok("x"));
        let err = rec.start_continuous(camera).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mic = CountingTrack::audio("mic");
        let rec = recognizer(MockTranscriber::ok("x"));
        let _results = rec.start_continuous(mic).await.unwrap();
        assert!(rec.is_running());
        rec.stop().unwrap();
        rec.stop().unwrap();
        assert!(!rec.is_running());
    }
}
