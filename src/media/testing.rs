//! Test doubles for tracks and streams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::audio::AudioChunk;
use crate::media::track::{MediaStream, MediaTrack, TrackKind, TrackLifecycle, TrackRef};
use crate::media::VideoFrame;

/// A track that counts how often `stop` is called.
pub struct CountingTrack {
    id: String,
    kind: TrackKind,
    lifecycle: TrackLifecycle,
    stops: AtomicUsize,
    /// Blocking delay inside `frame`, to hold a reader mid-poll.
    read_delay: Mutex<Duration>,
    reads: AtomicUsize,
    reads_after_stop: AtomicUsize,
    frame: Mutex<Option<VideoFrame>>,
    samples: Mutex<Vec<f32>>,
    audio_tx: broadcast::Sender<AudioChunk>,
}

impl CountingTrack {
    fn build(id: &str, kind: TrackKind, frame: Option<VideoFrame>) -> Arc<Self> {
        let (audio_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            id: id.into(),
            kind,
            lifecycle: TrackLifecycle::new(),
            stops: AtomicUsize::new(0),
            read_delay: Mutex::new(Duration::ZERO),
            reads: AtomicUsize::new(0),
            reads_after_stop: AtomicUsize::new(0),
            frame: Mutex::new(frame),
            samples: Mutex::new(Vec::new()),
            audio_tx,
        })
    }

    pub fn video(id: &str, frame: VideoFrame) -> Arc<Self> {
        Self::build(id, TrackKind::Video, Some(frame))
    }

    pub fn audio(id: &str) -> Arc<Self> {
        Self::build(id, TrackKind::Audio, None)
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Frame reads started so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Frame reads that were still in progress when `stop` was called.
    pub fn reads_after_stop(&self) -> usize {
        self.reads_after_stop.load(Ordering::SeqCst)
    }

    /// End the track without going through `stop` (revoked share).
    pub fn end_externally(&self) {
        self.lifecycle.end();
    }

    pub fn set_frame(&self, frame: VideoFrame) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    /// Replace the window returned by `recent_samples`.
    pub fn set_samples(&self, samples: Vec<f32>) {
        *self.samples.lock().unwrap_or_else(PoisonError::into_inner) = samples;
    }

    pub fn push_chunk(&self, chunk: AudioChunk) {
        let _ = self.audio_tx.send(chunk);
    }
}

impl MediaTrack for CountingTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_live(&self) -> bool {
        self.lifecycle.is_live()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.end();
    }

    fn frame(&self) -> Option<VideoFrame> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let frame = self
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if self.stop_calls() > 0 {
            self.reads_after_stop.fetch_add(1, Ordering::SeqCst);
        }
        frame
    }

    fn sample_rate(&self) -> u32 {
        match self.kind {
            TrackKind::Audio => 16_000,
            TrackKind::Video => 0,
        }
    }

    fn recent_samples(&self, count: usize) -> Vec<f32> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let start = samples.len().saturating_sub(count);
        samples[start..].to_vec()
    }

    fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        match self.kind {
            TrackKind::Audio => Some(self.audio_tx.subscribe()),
            TrackKind::Video => None,
        }
    }
}

pub fn stream_with(id: &str, tracks: &[&Arc<CountingTrack>]) -> MediaStream {
    let tracks: Vec<TrackRef> = tracks
        .iter()
        .map(|t| Arc::clone(*t) as TrackRef)
        .collect();
    MediaStream::new(id, tracks)
}
