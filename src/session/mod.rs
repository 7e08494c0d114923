//! Session module: the interview state machine.
//!
//! # Architecture
//!
//! ```text
//! host ──SessionHandle──▶ commands (mpsc) ─┐
//!                                          ▼
//! countdown / question timers ──▶ SessionController::run()  ← tokio task
//! IntegrityMonitor signals  ──────▶   │
//! DialogueEngine events     ──────▶   ├─ MediaCapturePipeline
//!                                     ├─ IntegrityMonitor
//!                                     ├─ DialogueEngine
//!                                     └─ ScoringAggregator
//!                                          │
//! host ◀──SessionEvent (broadcast)─────────┘
//! ```
//!
//! `run()` resolves to a [`SessionReport`] once the session is `Terminated`.

pub mod controller;
pub mod events;
pub mod state;

pub use controller::{Capabilities, Services, SessionController, SessionHandle};
pub use events::{QuestionSource, SessionCommand, SessionError, SessionEvent, SessionReport};
pub use state::{Session, SessionState};
