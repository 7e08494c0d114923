//! Live media tracks, streams and raw video frames.
//!
//! A [`MediaTrack`] is one live source (camera video, microphone, screen,
//! composite canvas).  A [`MediaStream`] groups the tracks returned by a
//! single capture request.  Tracks are shared as [`TrackRef`]
//! (`Arc<dyn MediaTrack>`) so detectors, the compositor and the recorder can
//! all read the same source; only the session stops them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::audio::AudioChunk;

// ---------------------------------------------------------------------------
// VideoFrame
// ---------------------------------------------------------------------------

/// A single RGBA8 frame.
///
/// The buffer always holds exactly `width * height * 4` bytes; frames are
/// only built through [`from_rgba`](Self::from_rgba) and
/// [`solid`](Self::solid).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl VideoFrame {
    /// Wrap an RGBA buffer.  Returns `None` when the buffer length does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA value at `(x, y)`.  Caller guarantees the coordinates are in
    /// bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Rec.601 luma of the pixel at `(x, y)`, 0–255.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let [r, g, b, _] = self.pixel(x, y);
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        y.round().clamp(0.0, 255.0) as u8
    }
}

// ---------------------------------------------------------------------------
// MediaTrack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One live capture source.
///
/// `stop` must be idempotent: stopping a track that already ended (for
/// example a screen share revoked from the browser bar) is a no-op.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    fn is_live(&self) -> bool;

    fn stop(&self);

    /// Latest video frame.  Always `None` for audio tracks.
    fn frame(&self) -> Option<VideoFrame> {
        None
    }

    /// Native sample rate of an audio track.
    fn sample_rate(&self) -> u32 {
        0
    }

    /// The most recent `count` mono samples of an audio track (fewer when
    /// the track has not produced that many yet).
    fn recent_samples(&self, _count: usize) -> Vec<f32> {
        Vec::new()
    }

    /// Continuous PCM feed of an audio track.
    fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        None
    }
}

/// Shared handle to a live track.
pub type TrackRef = Arc<dyn MediaTrack>;

/// Live/ended flag shared by the track implementations in this crate.
#[derive(Debug)]
pub struct TrackLifecycle {
    live: AtomicBool,
}

impl TrackLifecycle {
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Mark the track ended.  Returns `true` only for the call that actually
    /// changed the state.
    pub fn end(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }
}

impl Default for TrackLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CanvasTrack
// ---------------------------------------------------------------------------

/// Video track backed by a frame the compositor repaints on every tick.
pub struct CanvasTrack {
    id: String,
    lifecycle: TrackLifecycle,
    latest: Mutex<Option<VideoFrame>>,
}

impl CanvasTrack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lifecycle: TrackLifecycle::new(),
            latest: Mutex::new(None),
        }
    }

    /// Replace the current canvas contents.  Ignored after `stop`.
    pub fn paint(&self, frame: VideoFrame) {
        if !self.lifecycle.is_live() {
            return;
        }
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }
}

impl MediaTrack for CanvasTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn is_live(&self) -> bool {
        self.lifecycle.is_live()
    }

    fn stop(&self) {
        if self.lifecycle.end() {
            self.latest
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }

    fn frame(&self) -> Option<VideoFrame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// MediaStream
// ---------------------------------------------------------------------------

/// The set of tracks returned by one capture request.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<TrackRef>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.tracks.iter().map(|t| t.id()).collect();
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &ids)
            .finish()
    }
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<TrackRef>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    pub fn video_track(&self) -> Option<TrackRef> {
        self.first_of(TrackKind::Video)
    }

    pub fn audio_track(&self) -> Option<TrackRef> {
        self.first_of(TrackKind::Audio)
    }

    fn first_of(&self, kind: TrackKind) -> Option<TrackRef> {
        self.tracks.iter().find(|t| t.kind() == kind).cloned()
    }

    /// `true` while at least one track is still live.
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    /// Stop every track in the stream.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            log::debug!("media: stopping track {}", track.id());
            track.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba_rejects_mismatched_length() {
        assert!(VideoFrame::from_rgba(2, 2, vec![0; 15]).is_none());
        assert!(VideoFrame::from_rgba(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn accepted_frame_reads_its_last_pixel() {
        let mut data = vec![0; 3 * 2 * 4];
        data[20..24].copy_from_slice(&[9, 8, 7, 6]);
        let frame = VideoFrame::from_rgba(3, 2, data).expect("valid frame");
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.data().len(), 24);
        assert_eq!(frame.pixel(2, 1), [9, 8, 7, 6]);
    }

    #[test]
    fn luma_of_white_and_black() {
        let white = VideoFrame::solid(1, 1, [255, 255, 255, 255]);
        let black = VideoFrame::solid(1, 1, [0, 0, 0, 255]);
        assert_eq!(white.luma(0, 0), 255);
        assert_eq!(black.luma(0, 0), 0);
    }

    #[test]
    fn lifecycle_end_reports_first_transition_only() {
        let lc = TrackLifecycle::new();
        assert!(lc.end());
        assert!(!lc.end());
        assert!(!lc.is_live());
    }

    #[test]
    fn canvas_track_drops_frames_after_stop() {
        let canvas = CanvasTrack::new("canvas");
        canvas.paint(VideoFrame::solid(2, 2, [1, 2, 3, 255]));
        assert!(canvas.frame().is_some());

        canvas.stop();
        canvas.paint(VideoFrame::solid(2, 2, [1, 2, 3, 255]));
        assert!(canvas.frame().is_none());
        assert!(!canvas.is_live());
    }

    #[test]
    fn stream_finds_tracks_by_kind() {
        let canvas: TrackRef = Arc::new(CanvasTrack::new("v"));
        let stream = MediaStream::new("s", vec![canvas]);
        assert!(stream.video_track().is_some());
        assert!(stream.audio_track().is_none());
        assert!(stream.is_active());

        stream.stop_all();
        assert!(!stream.is_active());
    }
}
