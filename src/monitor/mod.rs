//! Integrity monitor: four independent detectors over the live session.
//!
//! ```text
//! host visibility events ───────────────▶ VisibilityDetector ─┐
//! camera video ──(1 Hz)──▶ MotionDetector ────────────────────┤
//! camera audio ──(60 Hz)─▶ SpectrumAnalyser ─▶ AudioActivity ─┼─▶ SignalSink
//!        SpeakingFlag ───────────────────────────┘            │
//! GazeEstimator ──▶ GazeAttentionTracker ─────────────────────┘
//!                   └─▶ HeatOverlay ◀── fade task
//! ```
//!
//! Each periodic detector is its own tokio task; none of them stop a track.
//! Tasks whose track has ended exit on their next tick.

pub mod gaze;
pub mod motion;
pub mod signal;
pub mod visibility;
pub mod voice_activity;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::{mean_level, SpectrumAnalyser};
use crate::capability::{CapabilityError, GazeEstimator, GazePoint};
use crate::config::MonitorConfig;
use crate::dialogue::SpeakingFlag;
use crate::media::{MediaStream, TrackRef};

pub use gaze::{GazeAttentionTracker, HeatOverlay, SharedOverlay};
pub use motion::MotionDetector;
pub use signal::{DetectionSignal, IntegritySummary, MotionLevel, SignalLog, SignalRecord};
pub use visibility::VisibilityDetector;
pub use voice_activity::AudioActivityDetector;

/// Callback receiving every detector output.
pub type SignalSink = Arc<dyn Fn(DetectionSignal) + Send + Sync>;

pub struct IntegrityMonitor {
    config: MonitorConfig,
    gaze: Option<Arc<dyn GazeEstimator>>,
    visibility: VisibilityDetector,
    overlay: Option<SharedOverlay>,
    tasks: Vec<JoinHandle<()>>,
    tracker_subscribed: bool,
}

impl IntegrityMonitor {
    pub fn new(config: MonitorConfig, gaze: Option<Arc<dyn GazeEstimator>>) -> Self {
        Self {
            config,
            gaze,
            visibility: VisibilityDetector::new(),
            overlay: None,
            tasks: Vec::new(),
            tracker_subscribed: false,
        }
    }

    /// Spawn the periodic detectors over `camera`.
    ///
    /// Missing tracks simply skip their detector.  An unavailable or failing
    /// gaze estimator disables gaze tracking for the session.
    pub fn start(&mut self, camera: &MediaStream, speaking: SpeakingFlag, sink: SignalSink) {
        if !self.tasks.is_empty() {
            log::warn!("monitor: start called while running; restarting detectors");
            self.stop_tasks();
        }
        self.visibility.reset();

        match camera.video_track() {
            Some(video) => self.tasks.push(tokio::spawn(run_motion(
                video,
                MotionDetector::from_config(&self.config),
                Duration::from_millis(self.config.motion_interval_ms.max(1)),
                Arc::clone(&sink),
            ))),
            None => log::warn!("monitor: camera stream has no video; motion detection off"),
        }

        match camera.audio_track() {
            Some(audio) => self.tasks.push(tokio::spawn(run_audio_activity(
                audio,
                AudioActivityDetector::from_config(&self.config),
                SpectrumAnalyser::new(self.config.audio_fft_size),
                Duration::from_millis(1000 / u64::from(self.config.audio_tick_hz.max(1))),
                speaking,
                Arc::clone(&sink),
            ))),
            None => log::warn!("monitor: camera stream has no audio; whisper detection off"),
        }

        if self.config.gaze_enabled {
            self.start_gaze(sink);
        }

        log::info!("monitor: {} detector task(s) running", self.tasks.len());
    }

    fn start_gaze(&mut self, sink: SignalSink) {
        let Some(estimator) = self.gaze.clone() else {
            log::info!("monitor: gaze tracking requested but no estimator available");
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = estimator.subscribe(tx) {
            log::warn!("monitor: gaze tracking disabled: {e}");
            return;
        }
        self.tracker_subscribed = true;

        let viewport = estimator.viewport();
        let overlay: SharedOverlay = Arc::new(Mutex::new(HeatOverlay::new(
            viewport,
            self.config.heat_radius,
        )));
        self.overlay = Some(Arc::clone(&overlay));

        self.tasks.push(tokio::spawn(run_gaze(
            rx,
            GazeAttentionTracker::new(&self.config, viewport),
            Arc::clone(&overlay),
            sink,
        )));
        self.tasks.push(tokio::spawn(run_fade(
            overlay,
            Duration::from_millis(self.config.heat_fade_interval_ms.max(1)),
            self.config.heat_fade_alpha,
        )));
    }

    /// Feed one host visibility change.  Returns the signal to record, if
    /// any; the caller owns the violation count.
    pub fn observe_visibility(
        &mut self,
        hidden: bool,
        session_active: bool,
    ) -> Option<DetectionSignal> {
        self.visibility.observe(hidden, session_active)
    }

    /// Abort every periodic detector.  Idempotent.
    pub fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Abort every periodic detector and wait until each one has stopped
    /// running.  A detector mid-poll on another worker finishes that poll
    /// before this returns, so tracks may be stopped afterwards.
    pub async fn halt_tasks(&mut self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Unsubscribe from the gaze estimator.  A no-op when it was never
    /// subscribed or is already released.
    pub fn release_tracker(&mut self) -> Result<(), CapabilityError> {
        if !std::mem::take(&mut self.tracker_subscribed) {
            return Ok(());
        }
        match &self.gaze {
            Some(estimator) => estimator.unsubscribe(),
            None => Ok(()),
        }
    }

    /// Detector tasks that have not finished yet.
    pub fn running_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn overlay(&self) -> Option<SharedOverlay> {
        self.overlay.clone()
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

// ---------------------------------------------------------------------------
// Detector tasks
// ---------------------------------------------------------------------------

async fn run_motion(
    track: TrackRef,
    mut detector: MotionDetector,
    period: Duration,
    sink: SignalSink,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !track.is_live() {
            log::debug!("monitor: video track {} ended; motion task exiting", track.id());
            break;
        }
        if let Some(frame) = track.frame() {
            sink(detector.sample(&frame));
        }
    }
}

async fn run_audio_activity(
    track: TrackRef,
    mut detector: AudioActivityDetector,
    mut analyser: SpectrumAnalyser,
    period: Duration,
    speaking: SpeakingFlag,
    sink: SignalSink,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !track.is_live() {
            log::debug!("monitor: audio track {} ended; whisper task exiting", track.id());
            break;
        }
        let window = track.recent_samples(analyser.fft_size());
        let level = mean_level(&analyser.byte_frequency_data(&window));
        // read the flag at decision time, not when the tick started
        if let Some(signal) = detector.tick(level, speaking.is_speaking()) {
            sink(signal);
        }
    }
}

async fn run_gaze(
    mut rx: mpsc::UnboundedReceiver<GazePoint>,
    mut tracker: GazeAttentionTracker,
    overlay: SharedOverlay,
    sink: SignalSink,
) {
    while let Some(point) = rx.recv().await {
        overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .paint(point);
        if let Some(signal) = tracker.push(point) {
            sink(signal);
        }
    }
    log::debug!("monitor: gaze feed closed");
}

async fn run_fade(overlay: SharedOverlay, period: Duration, alpha: f32) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fade(alpha);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::{stream_with, CountingTrack};
    use crate::media::VideoFrame;
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collector() -> (SignalSink, Arc<Mutex<Vec<DetectionSignal>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: SignalSink = Arc::new(move |s| sink_seen.lock().unwrap().push(s));
        (sink, seen)
    }

    /// Two half-amplitude tones: a mean spectrum level inside the whisper band.
    fn whisper_window() -> Vec<f32> {
        (0..256)
            .map(|i| {
                let t = i as f32 / 256.0;
                0.5 * (2.0 * PI * 16.0 * t).sin() + 0.5 * (2.0 * PI * 40.0 * t).sin()
            })
            .collect()
    }

    #[derive(Default)]
    struct MockGaze {
        tx: Mutex<Option<mpsc::UnboundedSender<GazePoint>>>,
        unsubscribes: AtomicUsize,
        fail_unsubscribe: bool,
    }

    impl GazeEstimator for MockGaze {
        fn subscribe(&self, tx: mpsc::UnboundedSender<GazePoint>) -> Result<(), CapabilityError> {
            *self.tx.lock().unwrap() = Some(tx);
            Ok(())
        }

        fn unsubscribe(&self) -> Result<(), CapabilityError> {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            self.tx.lock().unwrap().take();
            if self.fail_unsubscribe {
                Err(CapabilityError::Failed("tracker cleanup".into()))
            } else {
                Ok(())
            }
        }

        fn viewport(&self) -> (f32, f32) {
            (640.0, 480.0)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn halted_detector_finishes_its_read_before_the_track_stops() {
        let video = CountingTrack::video("v", VideoFrame::solid(8, 8, [0; 4]));
        video.set_read_delay(Duration::from_millis(100));
        let camera = stream_with("cam", &[&video]);
        let (sink, _seen) = collector();

        let config = MonitorConfig {
            motion_interval_ms: 500,
            ..MonitorConfig::default()
        };
        let mut monitor = IntegrityMonitor::new(config, None);
        monitor.start(&camera, SpeakingFlag::new(), sink);

        // the motion task is now blocked inside `frame` on another worker
        while video.reads() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        monitor.halt_tasks().await;
        camera.stop_all();

        assert_eq!(monitor.running_tasks(), 0);
        assert_eq!(video.reads(), 1);
        assert_eq!(video.reads_after_stop(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn motion_task_reports_static_scene() {
        let video = CountingTrack::video("v", VideoFrame::solid(64, 48, [50, 50, 50, 255]));
        let camera = stream_with("cam", &[&video]);
        let (sink, seen) = collector();

        let mut monitor = IntegrityMonitor::new(MonitorConfig::default(), None);
        monitor.start(&camera, SpeakingFlag::new(), sink);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        monitor.stop_tasks();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.first(),
            Some(&DetectionSignal::Motion {
                level: MotionLevel::Normal
            })
        );
        assert!(seen.contains(&DetectionSignal::Motion {
            level: MotionLevel::Static
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn whisper_fires_only_while_system_is_silent() {
        let audio = CountingTrack::audio("a");
        audio.set_samples(whisper_window());
        let camera = stream_with("cam", &[&audio]);

        let speaking = SpeakingFlag::new();
        speaking.begin();
        let (sink, seen) = collector();
        let mut monitor = IntegrityMonitor::new(MonitorConfig::default(), None);
        monitor.start(&camera, speaking.clone(), sink);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(seen.lock().unwrap().is_empty());

        speaking.clear();
        tokio::time::sleep(Duration::from_secs(3)).await;
        monitor.stop_tasks();
        assert!(seen
            .lock()
            .unwrap()
            .contains(&DetectionSignal::AudioActivity { whispering: true }));
    }

    #[tokio::test(start_paused = true)]
    async fn detector_exits_when_its_track_ends() {
        let video = CountingTrack::video("v", VideoFrame::solid(8, 8, [0; 4]));
        let camera = stream_with("cam", &[&video]);
        let (sink, _seen) = collector();

        let mut monitor = IntegrityMonitor::new(MonitorConfig::default(), None);
        monitor.start(&camera, SpeakingFlag::new(), sink);
        assert_eq!(monitor.running_tasks(), 1);

        video.end_externally();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(monitor.running_tasks(), 0);
        // the monitor never stops tracks itself
        assert_eq!(video.stop_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gaze_scores_and_paints_overlay() {
        let estimator = Arc::new(MockGaze::default());
        let config = MonitorConfig {
            gaze_enabled: true,
            ..MonitorConfig::default()
        };
        let camera = stream_with("cam", &[]);
        let (sink, seen) = collector();

        let mut monitor = IntegrityMonitor::new(config, Some(estimator.clone()));
        monitor.start(&camera, SpeakingFlag::new(), sink);
        assert_eq!(monitor.running_tasks(), 2);

        {
            let tx = estimator.tx.lock().unwrap();
            let tx = tx.as_ref().expect("subscribed");
            for _ in 0..10 {
                tx.send(GazePoint { x: 320.0, y: 240.0 }).unwrap();
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[DetectionSignal::GazeAttention { score: 100 }]
        );
        let overlay = monitor.overlay().expect("overlay");
        assert!(overlay.lock().unwrap().intensity_at(320.0, 240.0) > 0.0);

        monitor.stop_tasks();
        assert_eq!(monitor.running_tasks(), 0);
        monitor.release_tracker().unwrap();
        monitor.release_tracker().unwrap();
        assert_eq!(estimator.unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_unsubscribe_is_reported_once() {
        let estimator = Arc::new(MockGaze {
            fail_unsubscribe: true,
            ..MockGaze::default()
        });
        let config = MonitorConfig {
            gaze_enabled: true,
            ..MonitorConfig::default()
        };
        let mut monitor = IntegrityMonitor::new(config, Some(estimator.clone()));
        let (sink, _) = collector();
        monitor.start(&stream_with("cam", &[]), SpeakingFlag::new(), sink);
        monitor.stop_tasks();

        assert!(monitor.release_tracker().is_err());
        assert!(monitor.release_tracker().is_ok());
    }

    #[test]
    fn release_without_start_is_a_no_op() {
        let estimator = Arc::new(MockGaze::default());
        let mut monitor = IntegrityMonitor::new(MonitorConfig::default(), Some(estimator.clone()));
        monitor.release_tracker().unwrap();
        assert_eq!(estimator.unsubscribes.load(Ordering::SeqCst), 0);
    }
}
