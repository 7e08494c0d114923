//! Microphone capture via `cpal`.
//!
//! [`MicrophoneTrack`] wraps the cpal host/device/stream lifecycle behind the
//! [`MediaTrack`] interface.  The cpal stream is not `Send` on every
//! platform, so it lives on a dedicated thread that owns it until
//! [`stop`](MediaTrack::stop) is called.  The audio callback:
//!
//! * appends the downmixed samples to a ring buffer read by
//!   [`recent_samples`](MediaTrack::recent_samples), and
//! * broadcasts the raw [`AudioChunk`] to every
//!   [`subscribe_audio`](MediaTrack::subscribe_audio) receiver.

use std::sync::{mpsc, Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::audio::{downmix, RingBuffer};
use crate::capability::CapabilityError;
use crate::media::{MediaTrack, TrackKind, TrackLifecycle};

/// Chunks buffered per subscriber before the slowest one starts lagging.
const BROADCAST_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio thread failed: {0}")]
    Thread(String),
}

impl From<CaptureError> for CapabilityError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::NoDevice => CapabilityError::Unavailable(e.to_string()),
            // Backends surface a refused microphone prompt as a build failure.
            CaptureError::BuildStream(_) => CapabilityError::PermissionDenied(e.to_string()),
            other => CapabilityError::Failed(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// MicrophoneTrack
// ---------------------------------------------------------------------------

pub struct MicrophoneTrack {
    id: String,
    lifecycle: TrackLifecycle,
    sample_rate: u32,
    channels: u16,
    recent: Arc<Mutex<RingBuffer<f32>>>,
    chunks: broadcast::Sender<AudioChunk>,
    /// Dropping the sender (or sending on it) ends the stream thread.
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl MicrophoneTrack {
    /// Open the system default input device and start streaming.
    ///
    /// `recent_capacity` is the number of mono samples kept for
    /// [`recent_samples`](MediaTrack::recent_samples).
    pub fn open(recent_capacity: usize) -> Result<Self, CaptureError> {
        let recent = Arc::new(Mutex::new(RingBuffer::new(recent_capacity.max(1))));
        let (chunks, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16, String), CaptureError>>();

        let thread_recent = Arc::clone(&recent);
        let thread_chunks = chunks.clone();
        std::thread::Builder::new()
            .name("microphone".into())
            .spawn(move || {
                let stream = match build_stream(thread_recent, thread_chunks) {
                    Ok((stream, rate, channels, name)) => {
                        let _ = ready_tx.send(Ok((rate, channels, name)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Block until stop() or the track is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("microphone stream released");
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        let (sample_rate, channels, name) = ready_rx
            .recv()
            .map_err(|e| CaptureError::Thread(e.to_string()))??;
        log::info!("microphone open: {name} @ {sample_rate} Hz, {channels} ch");

        Ok(Self {
            id: format!("mic-{name}"),
            lifecycle: TrackLifecycle::new(),
            sample_rate,
            channels,
            recent,
            chunks,
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn build_stream(
    recent: Arc<Mutex<RingBuffer<f32>>>,
    chunks: broadcast::Sender<AudioChunk>,
) -> Result<(cpal::Stream, u32, u16, String), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let name = device.name().unwrap_or_else(|_| "default".into());

    let supported = device.default_input_config()?;
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            recent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_slice(&downmix(data, channels));
            // No subscribers is fine.
            let _ = chunks.send(AudioChunk {
                samples: data.to_vec(),
                sample_rate,
                channels,
            });
        },
        |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        },
        None,
    )?;

    stream.play()?;
    Ok((stream, sample_rate, channels, name))
}

impl MediaTrack for MicrophoneTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn is_live(&self) -> bool {
        self.lifecycle.is_live()
    }

    fn stop(&self) {
        if !self.lifecycle.end() {
            return;
        }
        if let Some(tx) = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn recent_samples(&self, count: usize) -> Vec<f32> {
        if !self.lifecycle.is_live() {
            return Vec::new();
        }
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest(count)
    }

    fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        self.lifecycle.is_live().then(|| self.chunks.subscribe())
    }
}

impl Drop for MicrophoneTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
