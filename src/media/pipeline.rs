//! Media capture pipeline: acquire → composite → record → stop.
//!
//! ```text
//! CameraCapture ──▶ camera stream (video + mic) ─┐
//!                                                ├─▶ compositor loop (fps) ──▶ CanvasTrack
//! ScreenCapture ──▶ screen stream (video) ───────┘            │
//!                                                             ▼
//!                                         ChunkRecorder (canvas video + mic PCM)
//! ```
//!
//! [`MediaCapturePipeline`] is the sole owner of every track it acquires.
//! [`stop`](MediaCapturePipeline::stop) cancels the compositor, stops the
//! recorder if it is still recording, and stops every track; it is
//! idempotent and safe to call when nothing was acquired.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::audio::AudioChunk;
use crate::capability::{CameraCapture, CapabilityError, CaptureConstraints, ScreenCapture};
use crate::config::CaptureConfig;
use crate::media::composite::{composite, PipLayout};
use crate::media::recorder::{ChunkRecorder, Recorder, RecorderState, RecordingBlob};
use crate::media::track::{CanvasTrack, MediaStream, TrackRef};
use crate::services::{RecordingLocation, RecordingMetadata, RecordingSink};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquisitionError {
    #[error("camera/microphone: {0}")]
    Camera(CapabilityError),

    #[error("screen share: {0}")]
    Screen(CapabilityError),
}

impl AcquisitionError {
    /// `true` when the user refused a prompt (as opposed to missing hardware).
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Camera(CapabilityError::PermissionDenied(_))
                | AcquisitionError::Screen(CapabilityError::PermissionDenied(_))
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompositeError {
    #[error("no media has been acquired")]
    NotAcquired,

    #[error("compositor is already running")]
    AlreadyRunning,
}

// ---------------------------------------------------------------------------
// MediaHandles
// ---------------------------------------------------------------------------

/// Ownership record of every live stream obtained for the session.
#[derive(Debug)]
pub struct MediaHandles {
    pub camera: MediaStream,
    /// `None` until screen sharing is granted.
    pub screen: Option<MediaStream>,
    /// Canvas video + camera audio; `None` until compositing starts.
    pub composite: Option<MediaStream>,
}

impl MediaHandles {
    fn stop_all(&self) {
        if let Some(composite) = &self.composite {
            // the audio track belongs to the camera stream and is stopped
            // below; only the canvas is owned by the composite.
            if let Some(canvas) = composite.video_track() {
                canvas.stop();
            }
        }
        if let Some(screen) = &self.screen {
            screen.stop_all();
        }
        self.camera.stop_all();
    }
}

type SharedRecorder = Arc<Mutex<Box<dyn Recorder>>>;

// ---------------------------------------------------------------------------
// MediaCapturePipeline
// ---------------------------------------------------------------------------

pub struct MediaCapturePipeline {
    camera_capture: Arc<dyn CameraCapture>,
    screen_capture: Arc<dyn ScreenCapture>,
    sink: Arc<dyn RecordingSink>,
    config: CaptureConfig,
    handles: Option<MediaHandles>,
    recorder: Option<SharedRecorder>,
    compositor: Option<JoinHandle<()>>,
}

impl MediaCapturePipeline {
    pub fn new(
        camera_capture: Arc<dyn CameraCapture>,
        screen_capture: Arc<dyn ScreenCapture>,
        sink: Arc<dyn RecordingSink>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            camera_capture,
            screen_capture,
            sink,
            config,
            handles: None,
            recorder: None,
            compositor: None,
        }
    }

    pub fn handles(&self) -> Option<&MediaHandles> {
        self.handles.as_ref()
    }

    /// `true` while any acquired stream is held.
    pub fn holds_media(&self) -> bool {
        self.handles.is_some()
    }

    pub fn is_compositing(&self) -> bool {
        self.compositor.is_some()
    }

    // -----------------------------------------------------------------------
    // acquire
    // -----------------------------------------------------------------------

    /// Request camera + microphone, then screen sharing.
    ///
    /// The camera stream is recorded as soon as it is granted, so a later
    /// screen-share denial still leaves it owned here and released by
    /// [`stop`](Self::stop).
    pub async fn acquire(&mut self) -> Result<&MediaHandles, AcquisitionError> {
        if self.handles.is_none() {
            let camera = self
                .camera_capture
                .request_camera_audio(CaptureConstraints::CAMERA_WITH_MICROPHONE)
                .await
                .map_err(AcquisitionError::Camera)?;

            if camera.audio_track().is_none() {
                log::warn!("media: camera stream {} has no audio track", camera.id());
            }
            log::info!("media: camera granted ({:?})", camera);

            self.handles = Some(MediaHandles {
                camera,
                screen: None,
                composite: None,
            });
        }

        let needs_screen = self.handles.as_ref().is_some_and(|h| h.screen.is_none());
        if needs_screen {
            let screen = self
                .screen_capture
                .request_screen_share()
                .await
                .map_err(AcquisitionError::Screen)?;
            log::info!("media: screen share granted ({:?})", screen);

            if let Some(handles) = self.handles.as_mut() {
                handles.screen = Some(screen);
            }
        }

        self.handles.as_ref().ok_or(AcquisitionError::Camera(
            CapabilityError::Failed("camera stream was released during acquisition".into()),
        ))
    }

    // -----------------------------------------------------------------------
    // start_composite
    // -----------------------------------------------------------------------

    /// Start the fixed-rate compositor and the recorder.
    pub fn start_composite(&mut self) -> Result<(), CompositeError> {
        if self.compositor.is_some() {
            return Err(CompositeError::AlreadyRunning);
        }
        let handles = self.handles.as_mut().ok_or(CompositeError::NotAcquired)?;

        let canvas = Arc::new(CanvasTrack::new(format!("{}-canvas", handles.camera.id())));
        let camera_audio = handles.camera.audio_track();

        let mut tracks: Vec<TrackRef> = vec![canvas.clone()];
        tracks.extend(camera_audio.clone());
        handles.composite = Some(MediaStream::new("composite", tracks));

        let mut recorder: Box<dyn Recorder> =
            Box::new(ChunkRecorder::new(self.config.frames_per_chunk));
        if let Err(e) = recorder.start() {
            log::warn!("media: recorder failed to start: {e}");
        }
        let recorder: SharedRecorder = Arc::new(Mutex::new(recorder));
        self.recorder = Some(Arc::clone(&recorder));

        let ctx = CompositorContext {
            layout: PipLayout::from_config(&self.config),
            screen: handles.screen.as_ref().and_then(MediaStream::video_track),
            camera: handles.camera.video_track(),
            audio: camera_audio.as_ref().and_then(|t| t.subscribe_audio()),
            audio_rate: camera_audio.as_ref().map_or(0, |t| t.sample_rate()),
            canvas,
            recorder,
        };

        let period = Duration::from_millis(1000 / u64::from(self.config.fps.max(1)));
        self.compositor = Some(tokio::spawn(run_compositor(ctx, period)));
        log::debug!("media: compositor started at {} fps", self.config.fps);
        Ok(())
    }

    /// Cancel the compositing loop only.  Part of [`stop`](Self::stop), also
    /// called on its own when periodic tasks are halted first.
    pub fn stop_compositor(&mut self) {
        if let Some(task) = self.compositor.take() {
            task.abort();
            log::debug!("media: compositor stopped");
        }
    }

    /// Cancel the compositing loop and wait until it is no longer running.
    pub async fn halt_compositor(&mut self) {
        if let Some(task) = self.compositor.take() {
            task.abort();
            let _ = task.await;
            log::debug!("media: compositor halted");
        }
    }

    // -----------------------------------------------------------------------
    // stop
    // -----------------------------------------------------------------------

    /// Release everything.  Returns the finished recording when one was
    /// running.  Idempotent.
    pub fn stop(&mut self) -> Option<RecordingBlob> {
        self.stop_compositor();

        let blob = self.recorder.take().and_then(|recorder| {
            let mut recorder = recorder.lock().unwrap_or_else(PoisonError::into_inner);
            if recorder.state() != RecorderState::Recording {
                return None;
            }
            match recorder.stop() {
                Ok(blob) => Some(blob),
                Err(e) => {
                    log::warn!("media: recorder stop failed: {e}");
                    None
                }
            }
        });

        if let Some(handles) = self.handles.take() {
            handles.stop_all();
            log::info!("media: all capture tracks stopped");
        }

        blob
    }

    /// Hand a finished recording to the export/upload collaborator.
    pub async fn export(
        &self,
        blob: &RecordingBlob,
        metadata: &RecordingMetadata,
    ) -> Option<RecordingLocation> {
        if blob.is_empty() {
            log::debug!("media: empty recording, nothing to export");
            return None;
        }
        match self.sink.export(blob, metadata).await {
            Ok(location) => Some(location),
            Err(e) => {
                log::warn!("media: recording export failed: {e}");
                None
            }
        }
    }
}

impl Drop for MediaCapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Compositor loop
// ---------------------------------------------------------------------------

struct CompositorContext {
    layout: PipLayout,
    screen: Option<TrackRef>,
    camera: Option<TrackRef>,
    audio: Option<broadcast::Receiver<AudioChunk>>,
    audio_rate: u32,
    canvas: Arc<CanvasTrack>,
    recorder: SharedRecorder,
}

async fn run_compositor(mut ctx: CompositorContext, period: Duration) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        // A revoked screen share simply ends its track; keep drawing the
        // camera over a black background.
        let screen = ctx
            .screen
            .as_ref()
            .filter(|t| t.is_live())
            .and_then(|t| t.frame());
        let camera = ctx
            .camera
            .as_ref()
            .filter(|t| t.is_live())
            .and_then(|t| t.frame());

        let frame = composite(&ctx.layout, screen.as_ref(), camera.as_ref());
        let ts = started.elapsed().as_millis() as u64;

        let pcm = drain_audio(ctx.audio.as_mut());

        {
            let mut recorder = ctx.recorder.lock().unwrap_or_else(PoisonError::into_inner);
            recorder.write_video(&frame, ts);
            if !pcm.is_empty() {
                recorder.write_audio(&pcm, ctx.audio_rate, ts);
            }
        }
        ctx.canvas.paint(frame);
    }
}

fn drain_audio(rx: Option<&mut broadcast::Receiver<AudioChunk>>) -> Vec<f32> {
    let Some(rx) = rx else {
        return Vec::new();
    };
    let mut pcm = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(chunk) => pcm.extend(crate::audio::downmix(&chunk.samples, chunk.channels)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                log::debug!("media: compositor skipped {n} audio chunks");
            }
            Err(_) => break,
        }
    }
    pcm
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::{stream_with, CountingTrack};
    use crate::media::track::MediaTrack;
    use crate::media::VideoFrame;
    use crate::services::ServiceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCamera(Result<MediaStream, CapabilityError>);

    #[async_trait]
    impl CameraCapture for FixedCamera {
        async fn request_camera_audio(
            &self,
            _constraints: CaptureConstraints,
        ) -> Result<MediaStream, CapabilityError> {
            self.0.clone()
        }
    }

    struct FixedScreen(Result<MediaStream, CapabilityError>);

    #[async_trait]
    impl ScreenCapture for FixedScreen {
        async fn request_screen_share(&self) -> Result<MediaStream, CapabilityError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl RecordingSink for CountingSink {
        async fn export(
            &self,
            _blob: &RecordingBlob,
            _meta: &RecordingMetadata,
        ) -> Result<RecordingLocation, ServiceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RecordingLocation::Url("https://cdn/rec".into()))
        }
    }

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            fps: 30,
            canvas_width: 16,
            canvas_height: 12,
            inset_width: 4,
            inset_height: 3,
            inset_margin: 1,
            frames_per_chunk: 5,
        }
    }

    fn pipeline(
        camera: Result<MediaStream, CapabilityError>,
        screen: Result<MediaStream, CapabilityError>,
    ) -> MediaCapturePipeline {
        MediaCapturePipeline::new(
            Arc::new(FixedCamera(camera)),
            Arc::new(FixedScreen(screen)),
            Arc::new(CountingSink::default()),
            small_config(),
        )
    }

    #[test]
    fn stop_without_acquire_is_a_no_op() {
        let mut p = pipeline(
            Err(CapabilityError::Unavailable("none".into())),
            Err(CapabilityError::Unavailable("none".into())),
        );
        assert!(p.stop().is_none());
        assert!(p.stop().is_none());
        assert!(!p.holds_media());
    }

    #[tokio::test]
    async fn camera_denied_acquires_nothing() {
        let mut p = pipeline(
            Err(CapabilityError::PermissionDenied("camera".into())),
            Err(CapabilityError::PermissionDenied("screen".into())),
        );
        let err = p.acquire().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Camera(_)));
        assert!(err.is_permission_denied());
        assert!(!p.holds_media());
    }

    #[tokio::test]
    async fn screen_denied_keeps_camera_until_stop() {
        let cam_video = CountingTrack::video("cam-v", VideoFrame::solid(8, 6, [1; 4]));
        let cam_audio = CountingTrack::audio("cam-a");
        let camera = stream_with("camera", &[&cam_video, &cam_audio]);

        let mut p = pipeline(
            Ok(camera),
            Err(CapabilityError::PermissionDenied("screen".into())),
        );
        let err = p.acquire().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Screen(_)));
        assert!(p.holds_media());
        assert_eq!(cam_video.stop_calls(), 0);

        p.stop();
        assert_eq!(cam_video.stop_calls(), 1);
        assert_eq!(cam_audio.stop_calls(), 1);

        // second stop has no further side effects
        p.stop();
        assert_eq!(cam_video.stop_calls(), 1);
        assert_eq!(cam_audio.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn compositing_records_frames_and_stop_releases_everything() {
        let cam_video = CountingTrack::video("cam-v", VideoFrame::solid(8, 6, [0, 0, 255, 255]));
        let cam_audio = CountingTrack::audio("cam-a");
        let screen_video =
            CountingTrack::video("scr-v", VideoFrame::solid(32, 24, [255, 0, 0, 255]));

        let mut p = pipeline(
            Ok(stream_with("camera", &[&cam_video, &cam_audio])),
            Ok(stream_with("screen", &[&screen_video])),
        );
        p.acquire().await.expect("acquire");
        p.start_composite().expect("composite");
        assert_eq!(p.start_composite(), Err(CompositeError::AlreadyRunning));

        let canvas = p
            .handles()
            .and_then(|h| h.composite.as_ref())
            .and_then(|c| c.video_track())
            .expect("canvas track");
        assert!(p
            .handles()
            .and_then(|h| h.composite.as_ref())
            .and_then(|c| c.audio_track())
            .is_some_and(|a| a.id() == "cam-a"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let painted = canvas.frame().expect("canvas painted");
        assert_eq!((painted.width(), painted.height()), (16, 12));

        let blob = p.stop().expect("recording blob");
        assert!(!blob.is_empty());
        assert!(blob.chunk_count >= 2);
        assert!(!p.is_compositing());
        assert!(!canvas.is_live());
        assert_eq!(cam_video.stop_calls(), 1);
        assert_eq!(cam_audio.stop_calls(), 1);
        assert_eq!(screen_video.stop_calls(), 1);

        // already stopped: no blob, no extra track stops
        assert!(p.stop().is_none());
        assert_eq!(screen_video.stop_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn halted_compositor_finishes_its_reads_before_tracks_stop() {
        let cam_video = CountingTrack::video("cam-v", VideoFrame::solid(8, 6, [1; 4]));
        let screen_video = CountingTrack::video("scr-v", VideoFrame::solid(16, 12, [2; 4]));
        screen_video.set_read_delay(Duration::from_millis(100));

        let mut p = MediaCapturePipeline::new(
            Arc::new(FixedCamera(Ok(stream_with("camera", &[&cam_video])))),
            Arc::new(FixedScreen(Ok(stream_with("screen", &[&screen_video])))),
            Arc::new(CountingSink::default()),
            CaptureConfig {
                fps: 2,
                ..small_config()
            },
        );
        p.acquire().await.expect("acquire");
        p.start_composite().expect("composite");

        while screen_video.reads() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        p.halt_compositor().await;
        assert!(!p.is_compositing());
        let _ = p.stop();

        assert_eq!(screen_video.reads_after_stop(), 0);
        assert_eq!(cam_video.reads_after_stop(), 0);
        assert_eq!(screen_video.stop_calls(), 1);
    }

    #[tokio::test]
    async fn revoked_screen_track_is_stopped_again_safely() {
        let cam_video = CountingTrack::video("cam-v", VideoFrame::solid(4, 4, [0; 4]));
        let screen_video = CountingTrack::video("scr-v", VideoFrame::solid(4, 4, [0; 4]));
        let mut p = pipeline(
            Ok(stream_with("camera", &[&cam_video])),
            Ok(stream_with("screen", &[&screen_video])),
        );
        p.acquire().await.expect("acquire");

        // user pressed the platform "stop sharing" button
        screen_video.end_externally();
        p.stop();
        assert_eq!(screen_video.stop_calls(), 1);
        assert!(!screen_video.is_live());
    }

    #[tokio::test]
    async fn export_skips_empty_blob() {
        let sink = Arc::new(CountingSink::default());
        let p = MediaCapturePipeline::new(
            Arc::new(FixedCamera(Err(CapabilityError::Unavailable("x".into())))),
            Arc::new(FixedScreen(Err(CapabilityError::Unavailable("x".into())))),
            sink.clone(),
            small_config(),
        );
        let meta = RecordingMetadata {
            session_id: "s".into(),
            subject: "React".into(),
            file_name: "s.rec".into(),
            mime_type: "x".into(),
        };

        let empty = RecordingBlob::from_bytes(&[], "x").unwrap();
        assert!(p.export(&empty, &meta).await.is_none());

        let full = RecordingBlob::from_bytes(&[1], "x").unwrap();
        assert_eq!(
            p.export(&full, &meta).await,
            Some(RecordingLocation::Url("https://cdn/rec".into()))
        );
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }
}
