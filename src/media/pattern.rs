//! Synthetic video source for rehearsals and headless runs.
//!
//! [`PatternTrack`] renders a vertical bar that sweeps across a flat
//! background; each call to `frame()` draws the bar at the position
//! implied by the time elapsed since construction.

use std::time::Instant;

use crate::media::track::{MediaTrack, TrackKind, TrackLifecycle};
use crate::media::VideoFrame;

pub struct PatternTrack {
    id: String,
    width: u32,
    height: u32,
    background: [u8; 4],
    bar: [u8; 4],
    /// Bar travel in pixels per second.
    speed: f32,
    started: Instant,
    lifecycle: TrackLifecycle,
}

impl PatternTrack {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            background: [32, 32, 48, 255],
            bar: [240, 240, 240, 255],
            speed: width as f32 / 4.0,
            started: Instant::now(),
            lifecycle: TrackLifecycle::new(),
        }
    }

    pub fn with_colors(mut self, background: [u8; 4], bar: [u8; 4]) -> Self {
        self.background = background;
        self.bar = bar;
        self
    }

    /// Render the pattern as it looks `elapsed_secs` after start.
    pub fn render_at(&self, elapsed_secs: f32) -> VideoFrame {
        let mut frame = VideoFrame::solid(self.width, self.height, self.background);
        if self.width == 0 || self.height == 0 {
            return frame;
        }

        let bar_width = (self.width / 10).max(1);
        let x0 = (elapsed_secs * self.speed) as u32 % self.width;
        for dx in 0..bar_width {
            let x = (x0 + dx) % self.width;
            for y in 0..self.height {
                frame.set_pixel(x, y, self.bar);
            }
        }
        frame
    }
}

impl MediaTrack for PatternTrack {
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
            log::debug!("pattern track {} stopped", self.id);
        }
    }

    fn frame(&self) -> Option<VideoFrame> {
        if !self.lifecycle.is_live() {
            return None;
        }
        Some(self.render_at(self.started.elapsed().as_secs_f32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_moves_between_renders() {
        let track = PatternTrack::new("p", 40, 4);
        let a = track.render_at(0.0);
        let b = track.render_at(1.0);
        assert_ne!(a, b);
        assert_eq!(a.pixel(0, 0), [240, 240, 240, 255]);
    }

    #[test]
    fn stopped_track_yields_no_frames() {
        let track = PatternTrack::new("p", 8, 8);
        assert!(track.frame().is_some());
        track.stop();
        assert!(track.frame().is_none());
    }
}
