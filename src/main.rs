//! Application entry point: terminal interview rehearsal.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the capabilities: a moving test pattern stands in for camera and
//!    screen, the default input device is the microphone, prompts are
//!    printed instead of spoken and Whisper recognises answers when a model
//!    is installed.
//! 5. Build the HTTP services with the neutral-score fallback.
//! 6. Spawn the session controller and an event printer.
//! 7. Read commands from stdin until the session terminates.
//!
//! ```text
//! interview-proctor [subject | resume]
//!
//!   <text>   submit a typed answer
//!   <empty>  submit what was recognised
//!   hide     simulate switching away from the interview
//!   show     simulate coming back
//!   end      finish the session now
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use interview_proctor::{
    audio::MicrophoneTrack,
    capability::{
        CameraCapture, CapabilityError, CaptureConstraints, ScreenCapture, SpeechRecognizer,
        SpeechSynthesizer,
    },
    config::{AppConfig, AppPaths},
    dialogue::{ContinuousRecognizer, RecognitionMode, WhisperTranscriber},
    media::{MediaStream, PatternTrack, TrackRef},
    services::{FallbackEvaluator, FileExporter, HttpBackend, RecordingSink},
    session::{
        Capabilities, QuestionSource, Services, SessionCommand, SessionController, SessionEvent,
        SessionHandle,
    },
};

/// Mono samples kept for the whisper detector's spectrum window.
const MIC_RECENT_SAMPLES: usize = 48_000;

/// Rough speaking pace used to hold the speaking flag while a prompt "plays".
const PROMPT_MS_PER_WORD: u64 = 300;

// ---------------------------------------------------------------------------
// Rehearsal capabilities
// ---------------------------------------------------------------------------

/// Test-pattern camera plus the real default microphone.
struct RehearsalCamera;

#[async_trait]
impl CameraCapture for RehearsalCamera {
    async fn request_camera_audio(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<MediaStream, CapabilityError> {
        let mut tracks: Vec<TrackRef> = Vec::new();
        if constraints.video {
            tracks.push(Arc::new(
                PatternTrack::new("camera-pattern", 320, 240)
                    .with_colors([70, 50, 40, 255], [220, 180, 150, 255]),
            ));
        }
        if constraints.audio {
            let opened = tokio::task::spawn_blocking(|| MicrophoneTrack::open(MIC_RECENT_SAMPLES))
                .await
                .map_err(|e| CapabilityError::Failed(e.to_string()))?;
            match opened {
                Ok(mic) => tracks.push(Arc::new(mic)),
                // keep rehearsing on machines without an input device
                Err(e) => log::warn!("rehearsal: no microphone ({e}); continuing without audio"),
            }
        }
        Ok(MediaStream::new("rehearsal-camera", tracks))
    }
}

/// Test-pattern "screen" at the canvas size.
struct RehearsalScreen {
    width: u32,
    height: u32,
}

#[async_trait]
impl ScreenCapture for RehearsalScreen {
    async fn request_screen_share(&self) -> Result<MediaStream, CapabilityError> {
        let screen: TrackRef = Arc::new(PatternTrack::new("screen-pattern", self.width, self.height));
        Ok(MediaStream::new("rehearsal-screen", vec![screen]))
    }
}

/// Prints prompts and holds for roughly the time it would take to say them.
struct ConsoleSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str, _voice_id: Option<&str>) -> Result<(), CapabilityError> {
        println!("\n  Interviewer: {text}\n");
        let words = text.split_whitespace().count() as u64;
        tokio::time::sleep(Duration::from_millis(words * PROMPT_MS_PER_WORD)).await;
        Ok(())
    }

    fn cancel(&self) {}
}

fn build_recognizer(config: &AppConfig) -> Option<Arc<dyn SpeechRecognizer>> {
    if !config.dialogue.recognition_enabled {
        log::info!("speech recognition disabled in settings; answers are typed");
        return None;
    }
    let model_path = AppPaths::new().model_file(&config.dialogue.model);
    match WhisperTranscriber::load(&model_path, &config.dialogue.language) {
        Ok(transcriber) => {
            log::info!("Whisper model loaded: {}", model_path.display());
            Some(Arc::new(ContinuousRecognizer::new(
                Arc::new(transcriber),
                &config.dialogue,
            )))
        }
        Err(e) => {
            log::warn!(
                "Could not load Whisper model ({}): {e}. Answers are typed.",
                model_path.display()
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Event printer
// ---------------------------------------------------------------------------

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::debug!("rehearsal: skipped {n} session events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            SessionEvent::StateChanged { from, to } => log::debug!("state {from} -> {to}"),
            SessionEvent::Countdown { remaining } => println!("Starting in {remaining}..."),
            SessionEvent::QuestionDelivered {
                index,
                total,
                question,
            } => println!("Question {}/{total} [{}]", index + 1, question.id),
            SessionEvent::Transcript {
                text,
                is_final: true,
            } => println!("  (heard) {text}"),
            SessionEvent::Transcript { .. } => {}
            SessionEvent::Signal(signal) if signal.is_alert() => {
                println!("  ! integrity: {signal:?}")
            }
            SessionEvent::Signal(_) => {}
            SessionEvent::ViolationRecorded { count } => {
                println!("  ! left the interview window ({count} so far)")
            }
            SessionEvent::AnswerRecorded { index, answer } => println!(
                "  Answer {} scored {:.1}/10: {}",
                index + 1,
                answer.score,
                answer.feedback
            ),
            SessionEvent::QuestionElapsed {
                elapsed_secs,
                limit_secs,
                ..
            } if elapsed_secs == limit_secs => println!("  Time is up for this question."),
            SessionEvent::QuestionElapsed { .. } => {}
            SessionEvent::RecognitionMode(RecognitionMode::Speech) => {
                println!("Speak your answers; press Enter to submit what was heard.")
            }
            SessionEvent::RecognitionMode(RecognitionMode::TextOnly) => {
                println!("Type your answers and press Enter.")
            }
            SessionEvent::Error(message) => eprintln!("Error: {message}"),
            SessionEvent::Finished(report) => {
                println!(
                    "\nFinal score {} ({}), {} violation(s)",
                    report.record.final_score,
                    report.record.status,
                    report.integrity.violation_count
                );
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// stdin
// ---------------------------------------------------------------------------

fn parse_command(line: &str) -> SessionCommand {
    match line.trim() {
        "end" => SessionCommand::End,
        "hide" => SessionCommand::VisibilityChanged { hidden: true },
        "show" => SessionCommand::VisibilityChanged { hidden: false },
        "" => SessionCommand::Submit { answer: None },
        answer => SessionCommand::Submit {
            answer: Some(answer.to_string()),
        },
    }
}

async fn read_commands(handle: SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let command = parse_command(&line);
                let ending = command == SessionCommand::End;
                // after `end` the handle is released so an idle session exits too
                if handle.send(command).await.is_err() || ending {
                    break;
                }
            }
            Ok(None) => {
                // EOF ends the session like typing `end`
                let _ = handle.end().await;
                break;
            }
            Err(e) => {
                log::warn!("rehearsal: stdin read failed: {e}");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Interview rehearsal starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    let source = match std::env::args().nth(1) {
        Some(arg) if arg.eq_ignore_ascii_case("resume") => QuestionSource::Resume,
        Some(subject) => QuestionSource::Subject(subject),
        None => QuestionSource::Subject("General".into()),
    };

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Capabilities
    let capabilities = Capabilities {
        camera: Arc::new(RehearsalCamera),
        screen: Arc::new(RehearsalScreen {
            width: config.capture.canvas_width,
            height: config.capture.canvas_height,
        }),
        synthesizer: Arc::new(ConsoleSynthesizer),
        recognizer: build_recognizer(&config),
        gaze: None,
    };

    // 5. Services
    let backend = HttpBackend::from_config(&config.services);
    let recordings: Arc<dyn RecordingSink> = if config.recording.upload {
        Arc::new(backend.clone())
    } else {
        Arc::new(FileExporter::new(config.export_dir()))
    };
    let services = Services {
        questions: Arc::new(backend.clone()),
        evaluator: Arc::new(FallbackEvaluator::new(
            backend.clone(),
            config.services.fallback_score,
        )),
        results: Arc::new(backend),
        recordings,
    };

    // 6 + 7. Session, printer and stdin
    let report = rt.block_on(async move {
        let (controller, handle) = SessionController::new(config, capabilities, services);
        let printer = tokio::spawn(print_events(handle.subscribe()));
        let session = tokio::spawn(controller.run());

        handle.start(source).await?;
        tokio::spawn(read_commands(handle.clone()));
        drop(handle);

        let report = session.await.context("session task failed")?;
        let _ = printer.await;
        anyhow::Ok(report)
    })?;

    match report {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => println!("The interview did not start."),
    }

    // stdin is read on a blocking thread that never returns on its own
    rt.shutdown_timeout(Duration::from_millis(100));
    Ok(())
}
