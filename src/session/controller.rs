//! Session controller: drives one interview from countdown to report.
//!
//! [`SessionController`] owns the [`Session`] aggregate and every engine
//! component.  Host commands arrive through a [`SessionHandle`]; timers,
//! detectors and the dialogue engine feed back through an internal channel,
//! so all mutation happens on the single `run` task.
//!
//! # Flow
//!
//! ```text
//! Start(source)
//!   └─▶ fetch questions ── empty / error ──▶ Idle + Error
//!         └─▶ Countdown(n) ──tick…──▶ 0
//!               └─▶ Acquiring ── denied ──▶ teardown ─▶ Idle + Error
//!                     └─▶ composite + detectors + recognition
//!                           └─▶ Active{0} ─▶ deliver(q0)
//!
//! Submit (explicit, or timer expiry with auto-submit)
//!   └─▶ evaluate ─▶ ScoringAggregator::append
//!         ├─ more questions ─▶ Active{i+1} ─▶ deliver
//!         └─ last           ─▶ finish
//!
//! End / last submit / handle dropped
//!   └─▶ Finishing ─▶ teardown ─▶ finalize ─▶ persist ─▶ export ─▶ Terminated
//! ```
//!
//! Commands that arrive while a step is awaiting (e.g. End during
//! `Acquiring`) queue up and are handled once that step resolves.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::capability::{
    CameraCapture, GazeEstimator, ScreenCapture, SpeechRecognizer, SpeechSynthesizer,
};
use crate::config::{AppConfig, SessionConfig};
use crate::dialogue::{DialogueEngine, DialogueEvent, DialogueSink};
use crate::media::recorder::CONTAINER_MIME;
use crate::media::{MediaCapturePipeline, RecordingBlob};
use crate::monitor::{DetectionSignal, IntegrityMonitor, IntegritySummary, SignalLog, SignalSink};
use crate::scoring::{Answer, ScoringAggregator};
use crate::services::fallback::FALLBACK_FEEDBACK;
use crate::services::{
    AnswerEvaluator, Question, QuestionBank, RecordingLocation, RecordingMetadata, RecordingSink,
    ResultStore,
};

use super::events::{
    QuestionSource, SessionCommand, SessionError, SessionEvent, SessionInput, SessionReport,
};
use super::state::{Session, SessionState};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 256;
const EMPTY_ANSWER_FEEDBACK: &str = "No answer was given for this question.";

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Platform capabilities the session runs on.
#[derive(Clone)]
pub struct Capabilities {
    pub camera: Arc<dyn CameraCapture>,
    pub screen: Arc<dyn ScreenCapture>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// `None` means answers are typed.
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub gaze: Option<Arc<dyn GazeEstimator>>,
}

/// Backend collaborators.
#[derive(Clone)]
pub struct Services {
    pub questions: Arc<dyn QuestionBank>,
    pub evaluator: Arc<dyn AnswerEvaluator>,
    pub results: Arc<dyn ResultStore>,
    pub recordings: Arc<dyn RecordingSink>,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable host-side handle.  Dropping every handle ends the session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ControllerGone)
    }

    pub async fn start(&self, source: QuestionSource) -> Result<(), SessionError> {
        self.send(SessionCommand::Start(source)).await
    }

    /// `None` submits whatever speech recognition has collected.
    pub async fn submit(&self, answer: Option<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::Submit { answer }).await
    }

    pub async fn end(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::End).await
    }

    /// Forward the host's page-visibility signal.
    pub async fn visibility_changed(&self, hidden: bool) -> Result<(), SessionError> {
        self.send(SessionCommand::VisibilityChanged { hidden }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Create with [`SessionController::new`], then spawn [`run`](Self::run).
///
/// ```rust,no_run
/// # use interview_proctor::session::{Capabilities, Services, SessionController, QuestionSource};
/// # use interview_proctor::config::AppConfig;
/// # async fn example(capabilities: Capabilities, services: Services) {
/// let (controller, handle) = SessionController::new(AppConfig::default(), capabilities, services);
/// let mut events = handle.subscribe();
/// let session = tokio::spawn(controller.run());
///
/// handle.start(QuestionSource::Subject("React".into())).await.unwrap();
/// // … forward answers, visibility changes, End …
/// let report = session.await.unwrap();
/// # }
/// ```
pub struct SessionController {
    config: SessionConfig,
    fallback_score: f32,
    session: Session,
    media: MediaCapturePipeline,
    monitor: IntegrityMonitor,
    dialogue: DialogueEngine,
    scoring: ScoringAggregator,
    services: Services,
    signal_log: SignalLog,
    integrity: IntegritySummary,
    commands: mpsc::Receiver<SessionCommand>,
    inputs_tx: mpsc::UnboundedSender<SessionInput>,
    inputs_rx: mpsc::UnboundedReceiver<SessionInput>,
    events: broadcast::Sender<SessionEvent>,
    countdown: Option<JoinHandle<()>>,
    question_timer: Option<JoinHandle<()>>,
    report: Option<SessionReport>,
}

impl SessionController {
    pub fn new(
        config: AppConfig,
        capabilities: Capabilities,
        services: Services,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let media = MediaCapturePipeline::new(
            capabilities.camera,
            capabilities.screen,
            Arc::clone(&services.recordings),
            config.capture,
        );
        let monitor = IntegrityMonitor::new(config.monitor, capabilities.gaze);
        let dialogue = DialogueEngine::new(
            capabilities.synthesizer,
            capabilities.recognizer,
            config.dialogue.voice_id,
        );

        let handle = SessionHandle {
            commands: commands_tx,
            events: events.clone(),
        };
        let controller = Self {
            signal_log: SignalLog::new(config.session.signal_log_capacity),
            config: config.session,
            fallback_score: config.services.fallback_score.clamp(0.0, 10.0),
            session: Session::default(),
            media,
            monitor,
            dialogue,
            scoring: ScoringAggregator::new(),
            services,
            integrity: IntegritySummary::default(),
            commands,
            inputs_tx,
            inputs_rx,
            events,
            countdown: None,
            question_timer: None,
            report: None,
        };
        (controller, handle)
    }

    pub fn state(&self) -> &SessionState {
        &self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn violation_count(&self) -> u32 {
        self.session.violation_count
    }

    pub fn signal_log(&self) -> &SignalLog {
        &self.signal_log
    }

    /// `true` while any capture stream is held.
    pub fn holds_media(&self) -> bool {
        self.media.holds_media()
    }

    /// Detector tasks still running.
    pub fn running_detectors(&self) -> usize {
        self.monitor.running_tasks()
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until the session reaches `Terminated`, or until every handle is
    /// dropped while `Idle`.
    ///
    /// Dropping every handle mid-session counts as End.
    pub async fn run(mut self) -> Option<SessionReport> {
        loop {
            let input = tokio::select! {
                biased;
                Some(input) = self.inputs_rx.recv() => input,
                command = self.commands.recv() => match command {
                    Some(command) => SessionInput::Command(command),
                    None => {
                        log::info!("session: command channel closed");
                        if self.session.state.accepts_end() {
                            self.finish().await;
                        }
                        break;
                    }
                },
            };

            self.handle(input).await;
            if self.session.state.is_terminal() {
                break;
            }
        }

        log::info!("session: controller shutting down in {}", self.session.state);
        self.report.take()
    }

    async fn handle(&mut self, input: SessionInput) {
        if self.session.state.is_terminal() {
            log::debug!("session: terminated; ignoring {input:?}");
            return;
        }

        match input {
            SessionInput::Command(SessionCommand::Start(source)) => self.handle_start(source).await,
            SessionInput::Command(SessionCommand::Submit { answer }) => {
                self.handle_submit(answer).await
            }
            SessionInput::Command(SessionCommand::End) => self.handle_end().await,
            SessionInput::Command(SessionCommand::VisibilityChanged { hidden }) => {
                self.handle_visibility(hidden)
            }
            SessionInput::Signal(signal) => self.handle_signal(signal),
            SessionInput::Dialogue(event) => self.handle_dialogue(event),
            SessionInput::CountdownTick => self.handle_countdown_tick().await,
            SessionInput::QuestionTick {
                index,
                elapsed_secs,
            } => self.handle_question_tick(index, elapsed_secs).await,
        }
    }

    // -----------------------------------------------------------------------
    // Start / countdown / acquisition
    // -----------------------------------------------------------------------

    async fn handle_start(&mut self, source: QuestionSource) {
        if self.session.state != SessionState::Idle {
            log::warn!("session: start ignored in {}", self.session.state);
            return;
        }

        let fetched = match &source {
            QuestionSource::Subject(subject) => {
                self.services.questions.fetch_questions(subject).await
            }
            QuestionSource::Resume => self.services.questions.generate_from_resume().await,
        };
        let questions = match fetched {
            Ok(questions) if questions.is_empty() => {
                self.emit_error(&SessionError::NoQuestions);
                return;
            }
            Ok(questions) => questions,
            Err(e) => {
                self.emit_error(&SessionError::QuestionFetch(e));
                return;
            }
        };

        log::info!(
            "session: {} question(s) for {:?}",
            questions.len(),
            source.subject()
        );
        self.session = Session::new(source.subject(), questions);
        self.scoring = ScoringAggregator::new();
        self.signal_log.clear();
        self.integrity = IntegritySummary::default();

        if self.config.countdown_secs == 0 {
            self.begin_acquisition().await;
            return;
        }

        let remaining = self.config.countdown_secs;
        self.transition(SessionState::Countdown { remaining });
        self.emit(SessionEvent::Countdown { remaining });
        let tx = self.inputs_tx.clone();
        self.countdown = Some(spawn_ticker(tx, |_| SessionInput::CountdownTick));
    }

    async fn handle_countdown_tick(&mut self) {
        let SessionState::Countdown { remaining } = self.session.state else {
            return;
        };
        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.transition(SessionState::Countdown { remaining });
            self.emit(SessionEvent::Countdown { remaining });
            return;
        }

        if let Some(task) = self.countdown.take() {
            task.abort();
        }
        self.begin_acquisition().await;
    }

    async fn begin_acquisition(&mut self) {
        self.transition(SessionState::Acquiring);

        let camera = match self.media.acquire().await {
            Ok(handles) => handles.camera.clone(),
            Err(e) => {
                log::warn!("session: acquisition failed: {e}");
                // a camera granted before the screen was refused is still
                // held and must be released
                let _ = self.shutdown().await;
                self.transition(SessionState::Idle);
                self.emit_error(&SessionError::Acquisition(e));
                return;
            }
        };

        if let Err(e) = self.media.start_composite() {
            log::warn!("session: recording unavailable: {e}");
        }

        let signal_tx = self.inputs_tx.clone();
        let signal_sink: SignalSink = Arc::new(move |signal| {
            let _ = signal_tx.send(SessionInput::Signal(signal));
        });
        let speaking = self.dialogue.speaking_flag();
        self.monitor.start(&camera, speaking, signal_sink);

        let sink = self.dialogue_sink();
        let mode = self.dialogue.listen(camera.audio_track(), sink).await;
        self.emit(SessionEvent::RecognitionMode(mode));

        self.session.started_at = Some(Utc::now());
        self.transition(SessionState::Active { question_index: 0 });
        self.deliver_current();
    }

    // -----------------------------------------------------------------------
    // Question cycle
    // -----------------------------------------------------------------------

    fn deliver_current(&mut self) {
        let SessionState::Active { question_index } = self.session.state else {
            return;
        };
        let Some(question) = self.session.questions.get(question_index).cloned() else {
            return;
        };

        let sink = self.dialogue_sink();
        self.dialogue.deliver(&question, sink);
        self.emit(SessionEvent::QuestionDelivered {
            index: question_index,
            total: self.session.questions.len(),
            question,
        });

        if let Some(task) = self.question_timer.take() {
            task.abort();
        }
        let tx = self.inputs_tx.clone();
        self.question_timer = Some(spawn_ticker(tx, move |elapsed_secs| {
            SessionInput::QuestionTick {
                index: question_index,
                elapsed_secs,
            }
        }));
    }

    async fn handle_question_tick(&mut self, index: usize, elapsed_secs: u64) {
        if self.session.state != (SessionState::Active { question_index: index }) {
            return;
        }
        let limit_secs = self.config.question_time_limit_secs;
        self.emit(SessionEvent::QuestionElapsed {
            index,
            elapsed_secs,
            limit_secs,
        });

        if self.config.auto_submit_on_timeout && elapsed_secs >= limit_secs {
            log::info!("session: question {index} timed out after {elapsed_secs}s; submitting");
            self.handle_submit(None).await;
        }
    }

    async fn handle_submit(&mut self, answer: Option<String>) {
        let SessionState::Active { question_index } = self.session.state else {
            log::debug!("session: submit ignored in {}", self.session.state);
            return;
        };
        let Some(question) = self.session.questions.get(question_index).cloned() else {
            return;
        };

        // the recognised transcript belongs to this question either way
        let transcript = self.dialogue.take_transcript();
        let text = answer.unwrap_or(transcript);

        let answer = self.evaluate(&question, text).await;
        self.scoring.append(question_index, answer.clone());
        self.emit(SessionEvent::AnswerRecorded {
            index: question_index,
            answer,
        });

        if self.session.is_last_question(question_index) {
            self.finish().await;
        } else {
            self.transition(SessionState::Active {
                question_index: question_index + 1,
            });
            self.deliver_current();
        }
    }

    async fn evaluate(&self, question: &Question, text: String) -> Answer {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Answer {
                question_id: question.id.clone(),
                transcript: text,
                feedback: EMPTY_ANSWER_FEEDBACK.into(),
                score: 0.0,
            };
        }

        match self.services.evaluator.evaluate(question, &text).await {
            Ok(evaluation) => Answer {
                question_id: question.id.clone(),
                transcript: text,
                feedback: evaluation.feedback,
                score: evaluation.score.clamp(0.0, 10.0),
            },
            Err(e) => {
                log::warn!(
                    "session: feedback for question {} failed ({e}); neutral score {}",
                    question.id,
                    self.fallback_score
                );
                Answer {
                    question_id: question.id.clone(),
                    transcript: text,
                    feedback: FALLBACK_FEEDBACK.into(),
                    score: self.fallback_score,
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Integrity and dialogue inputs
    // -----------------------------------------------------------------------

    fn handle_visibility(&mut self, hidden: bool) {
        let active = self.session.state.is_active();
        let Some(signal) = self.monitor.observe_visibility(hidden, active) else {
            return;
        };

        if matches!(signal, DetectionSignal::Visibility { lost: true }) {
            self.session.violation_count += 1;
            self.integrity.violation_count = self.session.violation_count;
            log::info!(
                "session: page hidden while active (violation {})",
                self.session.violation_count
            );
            self.emit(SessionEvent::ViolationRecorded {
                count: self.session.violation_count,
            });
        }
        self.record_signal(signal);
    }

    fn handle_signal(&mut self, signal: DetectionSignal) {
        if !self.session.state.is_active() {
            return;
        }
        log::debug!("session: signal {signal:?}");
        self.integrity.record(&signal);
        self.record_signal(signal);
    }

    fn record_signal(&mut self, signal: DetectionSignal) {
        self.signal_log.push(signal);
        self.emit(SessionEvent::Signal(signal));
    }

    fn handle_dialogue(&mut self, event: DialogueEvent) {
        match event {
            DialogueEvent::Transcript { text, is_final } => {
                self.emit(SessionEvent::Transcript { text, is_final });
            }
            DialogueEvent::SpeechFinished {
                generation,
                error: Some(error),
            } => {
                log::warn!("session: utterance {generation} failed: {error}");
                self.emit(SessionEvent::Error(format!("question playback failed: {error}")));
            }
            DialogueEvent::SpeechFinished { generation, .. } => {
                log::debug!("session: utterance {generation} finished");
            }
        }
    }

    fn dialogue_sink(&self) -> DialogueSink {
        let tx = self.inputs_tx.clone();
        Arc::new(move |event| {
            let _ = tx.send(SessionInput::Dialogue(event));
        })
    }

    // -----------------------------------------------------------------------
    // End / finish / teardown
    // -----------------------------------------------------------------------

    async fn handle_end(&mut self) {
        if self.session.state.accepts_end() {
            log::info!("session: end requested in {}", self.session.state);
            self.finish().await;
        } else {
            log::debug!("session: end ignored in {}", self.session.state);
        }
    }

    /// The only way into `Terminated`.
    async fn finish(&mut self) {
        self.transition(SessionState::Finishing);
        let blob = self.shutdown().await;

        let record = self.scoring.finalize(&self.session.subject);
        log::info!(
            "session: final score {} ({}) over {} answer(s)",
            record.final_score,
            record.status,
            record.breakdown.len()
        );
        if let Err(e) = self.services.results.save_interview_result(&record).await {
            log::warn!("session: saving the result failed: {e}");
            self.emit(SessionEvent::Error(format!("result was not saved: {e}")));
        }

        let recording = match blob {
            Some(blob) => self.export_recording(&blob).await,
            None => None,
        };

        let report = SessionReport {
            session_id: self.session.id,
            record,
            integrity: self.integrity.clone(),
            recording,
            started_at: self.session.started_at,
            ended_at: Utc::now(),
        };
        self.transition(SessionState::Terminated);
        self.emit(SessionEvent::Finished(Box::new(report.clone())));
        self.report = Some(report);
    }

    async fn export_recording(&self, blob: &RecordingBlob) -> Option<RecordingLocation> {
        let metadata = RecordingMetadata {
            session_id: self.session.id.to_string(),
            subject: self.session.subject.clone(),
            file_name: format!(
                "interview-{}-{}.rec",
                self.session.id,
                Utc::now().format("%Y%m%d-%H%M%S")
            ),
            mime_type: CONTAINER_MIME.into(),
        };
        self.media.export(blob, &metadata).await
    }

    /// [`teardown`](Self::teardown) for the `run` task.  Aborted timers,
    /// detectors and the compositor are awaited first, so none of them is
    /// still reading a track on another worker when the tracks are stopped.
    pub async fn shutdown(&mut self) -> Option<RecordingBlob> {
        let timers: Vec<JoinHandle<()>> = [self.countdown.take(), self.question_timer.take()]
            .into_iter()
            .flatten()
            .collect();
        for task in &timers {
            task.abort();
        }
        for task in timers {
            let _ = task.await;
        }
        self.monitor.halt_tasks().await;
        self.media.halt_compositor().await;

        self.teardown()
    }

    /// Release every session resource in order: periodic tasks, speech,
    /// capture tracks, then the gaze tracker.
    ///
    /// Each step runs regardless of the others failing.  Safe to call any
    /// number of times and before anything was started.  Returns the
    /// finished recording the first time one is available.
    ///
    /// Aborting does not interrupt a task already being polled on another
    /// worker; use [`shutdown`](Self::shutdown) where awaiting is possible.
    pub fn teardown(&mut self) -> Option<RecordingBlob> {
        for task in [self.countdown.take(), self.question_timer.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        self.monitor.stop_tasks();
        self.media.stop_compositor();

        self.dialogue.cancel_speech();
        if let Err(e) = self.dialogue.stop_recognition() {
            log::warn!("session: stopping recognition failed: {e}");
        }

        let blob = self.media.stop();

        if let Err(e) = self.monitor.release_tracker() {
            log::warn!("session: releasing the gaze tracker failed: {e}");
        }
        blob
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn transition(&mut self, to: SessionState) {
        let from = std::mem::replace(&mut self.session.state, to.clone());
        log::debug!("session: {from} -> {to}");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_error(&self, error: &SessionError) {
        log::warn!("session: {error}");
        self.emit(SessionEvent::Error(error.to_string()));
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

/// Send `make(n)` every second, `n` counting from 1, until the receiver is
/// gone or the task is aborted.
fn spawn_ticker<F>(tx: mpsc::UnboundedSender<SessionInput>, make: F) -> JoinHandle<()>
where
    F: Fn(u64) -> SessionInput + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut n = 0;
        loop {
            ticker.tick().await;
            n += 1;
            if tx.send(make(n)).is_err() {
                break;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
