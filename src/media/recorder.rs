//! Composite-stream recorder.
//!
//! A [`Recorder`] accepts composite video frames and microphone PCM while it
//! is `Recording` and hands back a finished [`RecordingBlob`] on
//! [`stop`](Recorder::stop).
//!
//! [`ChunkRecorder`] groups records into chunks of `frames_per_chunk` video
//! frames and appends each completed chunk to a spool file, so at most one
//! chunk is held in memory.  The blob returned on stop owns that file and
//! removes it once the last clone is dropped.
//!
//! Container layout:
//!
//! ```text
//! record := tag:u8 ('V' | 'A') | timestamp_ms:u64le | header | len:u32le | payload
//!   'V' header := width:u32le | height:u32le          payload := RGBA8
//!   'A' header := sample_rate:u32le | 0:u32le         payload := f32le samples
//! ```

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;

use crate::media::VideoFrame;

pub const CONTAINER_MIME: &str = "application/x-interview-recording";

const TAG_VIDEO: u8 = b'V';
const TAG_AUDIO: u8 = b'A';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecorderError {
    #[error("recorder is already recording")]
    AlreadyRecording,

    #[error("recorder is not recording")]
    NotRecording,

    #[error("recording spool: {0}")]
    Spool(String),
}

impl From<std::io::Error> for RecorderError {
    fn from(e: std::io::Error) -> Self {
        RecorderError::Spool(e.to_string())
    }
}

/// Sink for the composite stream.
pub trait Recorder: Send {
    fn state(&self) -> RecorderState;

    fn start(&mut self) -> Result<(), RecorderError>;

    fn write_video(&mut self, frame: &VideoFrame, timestamp_ms: u64);

    fn write_audio(&mut self, samples: &[f32], sample_rate: u32, timestamp_ms: u64);

    /// Flush and return everything recorded since `start`.
    fn stop(&mut self) -> Result<RecordingBlob, RecorderError>;

    fn mime_type(&self) -> &str;
}

// ---------------------------------------------------------------------------
// ChunkRecorder
// ---------------------------------------------------------------------------

pub struct ChunkRecorder {
    state: RecorderState,
    frames_per_chunk: usize,
    current: Vec<u8>,
    frames_in_current: usize,
    spool: Option<NamedTempFile>,
    chunks_written: usize,
    bytes_written: u64,
    /// First spool write error; the recording is discarded on stop.
    spool_error: Option<String>,
}

impl ChunkRecorder {
    pub fn new(frames_per_chunk: usize) -> Self {
        Self {
            state: RecorderState::Inactive,
            frames_per_chunk: frames_per_chunk.max(1),
            current: Vec::new(),
            frames_in_current: 0,
            spool: None,
            chunks_written: 0,
            bytes_written: 0,
            spool_error: None,
        }
    }

    /// Chunks written to the spool so far (the chunk being filled is not
    /// included).
    pub fn completed_chunks(&self) -> usize {
        self.chunks_written
    }

    /// Bytes of the chunk currently held in memory.
    pub fn buffered_bytes(&self) -> usize {
        self.current.len()
    }

    fn push_record(&mut self, tag: u8, timestamp_ms: u64, header: [u32; 2], payload: &[u8]) {
        self.current.push(tag);
        self.current.extend_from_slice(&timestamp_ms.to_le_bytes());
        self.current.extend_from_slice(&header[0].to_le_bytes());
        self.current.extend_from_slice(&header[1].to_le_bytes());
        self.current
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.current.extend_from_slice(payload);
    }

    fn flush(&mut self) {
        self.frames_in_current = 0;
        if self.current.is_empty() {
            return;
        }
        if self.spool_error.is_none() {
            if let Some(spool) = self.spool.as_mut() {
                match spool.write_all(&self.current) {
                    Ok(()) => {
                        self.chunks_written += 1;
                        self.bytes_written += self.current.len() as u64;
                    }
                    Err(e) => {
                        log::warn!("recorder: spool write failed, recording dropped: {e}");
                        self.spool_error = Some(e.to_string());
                    }
                }
            }
        }
        self.current.clear();
    }
}

impl Recorder for ChunkRecorder {
    fn state(&self) -> RecorderState {
        self.state
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.state == RecorderState::Recording {
            return Err(RecorderError::AlreadyRecording);
        }
        let spool = tempfile::Builder::new()
            .prefix("interview-")
            .suffix(".rec.part")
            .tempfile()?;
        log::debug!("recorder: spooling to {}", spool.path().display());

        self.spool = Some(spool);
        self.current.clear();
        self.frames_in_current = 0;
        self.chunks_written = 0;
        self.bytes_written = 0;
        self.spool_error = None;
        self.state = RecorderState::Recording;
        Ok(())
    }

    fn write_video(&mut self, frame: &VideoFrame, timestamp_ms: u64) {
        if self.state != RecorderState::Recording {
            return;
        }
        self.push_record(
            TAG_VIDEO,
            timestamp_ms,
            [frame.width(), frame.height()],
            frame.data(),
        );
        self.frames_in_current += 1;
        if self.frames_in_current >= self.frames_per_chunk {
            self.flush();
        }
    }

    fn write_audio(&mut self, samples: &[f32], sample_rate: u32, timestamp_ms: u64) {
        if self.state != RecorderState::Recording || samples.is_empty() {
            return;
        }
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.push_record(TAG_AUDIO, timestamp_ms, [sample_rate, 0], &payload);
    }

    fn stop(&mut self) -> Result<RecordingBlob, RecorderError> {
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording);
        }
        self.flush();
        self.state = RecorderState::Inactive;

        let mut spool = self
            .spool
            .take()
            .ok_or_else(|| RecorderError::Spool("no spool file".into()))?;
        if let Some(e) = self.spool_error.take() {
            return Err(RecorderError::Spool(e));
        }
        spool.flush()?;

        Ok(RecordingBlob {
            file: Arc::new(spool.into_temp_path()),
            len: self.bytes_written,
            mime_type: CONTAINER_MIME.to_string(),
            chunk_count: self.chunks_written,
        })
    }

    fn mime_type(&self) -> &str {
        CONTAINER_MIME
    }
}

// ---------------------------------------------------------------------------
// RecordingBlob
// ---------------------------------------------------------------------------

/// The finished recording, ready for export.
///
/// Backed by a temporary file that is deleted when the last clone is
/// dropped.  Exporters copy or stream it from [`path`](Self::path).
#[derive(Debug, Clone)]
pub struct RecordingBlob {
    file: Arc<TempPath>,
    len: u64,
    pub mime_type: String,
    /// Number of chunks that were written.
    pub chunk_count: usize,
}

impl RecordingBlob {
    /// Spool an in-memory recording, as a single chunk.
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> std::io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file: Arc::new(file.into_temp_path()),
            len: bytes.len() as u64,
            mime_type: mime_type.to_string(),
            chunk_count: usize::from(!bytes.is_empty()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
