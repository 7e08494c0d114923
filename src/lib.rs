//! Proctored interview session engine.
//!
//! A session counts down, acquires camera, microphone and screen share,
//! records a picture-in-picture composite, runs the integrity detectors,
//! speaks each question and captures the spoken answer, then scores the
//! answers and hands the result to the backend.  Every platform and backend
//! dependency sits behind the traits in [`capability`] and [`services`].

pub mod audio;
pub mod capability;
pub mod config;
pub mod dialogue;
pub mod media;
pub mod monitor;
pub mod scoring;
pub mod services;
pub mod session;
