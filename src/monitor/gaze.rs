//! Gaze attention tracker and heat overlay.
//!
//! Gaze estimates arrive as viewport coordinates.  Each one is recorded as
//! on-screen (`1`) or off-screen (`0`) in a fixed-size ring buffer; every
//! `recompute_every` samples the attention score is the share of on-screen
//! samples, scaled to 0–100.
//!
//! [`HeatOverlay`] accumulates the same points as radial blobs on a coarse
//! grid and fades towards transparent on a timer.

use std::sync::{Arc, Mutex};

use crate::audio::RingBuffer;
use crate::capability::GazePoint;
use crate::config::MonitorConfig;
use crate::monitor::DetectionSignal;

// ---------------------------------------------------------------------------
// GazeAttentionTracker
// ---------------------------------------------------------------------------

pub struct GazeAttentionTracker {
    window: RingBuffer<u8>,
    recompute_every: usize,
    since_recompute: usize,
    viewport: (f32, f32),
}

impl GazeAttentionTracker {
    pub fn new(config: &MonitorConfig, viewport: (f32, f32)) -> Self {
        Self {
            window: RingBuffer::new(config.gaze_buffer_capacity.max(1)),
            recompute_every: config.gaze_recompute_every.max(1),
            since_recompute: 0,
            viewport,
        }
    }

    fn on_screen(&self, point: GazePoint) -> bool {
        let (w, h) = self.viewport;
        point.x >= 0.0 && point.y >= 0.0 && point.x <= w && point.y <= h
    }

    /// Record one estimate.  Returns a `GazeAttention` signal on every
    /// `recompute_every`-th sample.
    pub fn push(&mut self, point: GazePoint) -> Option<DetectionSignal> {
        let flag = u8::from(self.on_screen(point));
        self.window.push(flag);

        self.since_recompute += 1;
        if self.since_recompute < self.recompute_every {
            return None;
        }
        self.since_recompute = 0;
        Some(DetectionSignal::GazeAttention {
            score: self.score(),
        })
    }

    /// Current attention score, 0–100.
    pub fn score(&self) -> u8 {
        (self.window.mean() * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn set_viewport(&mut self, viewport: (f32, f32)) {
        self.viewport = viewport;
    }
}

// ---------------------------------------------------------------------------
// HeatOverlay
// ---------------------------------------------------------------------------

/// Cell size of the overlay grid in viewport pixels.
const CELL: f32 = 8.0;

/// Coarse intensity map of where the candidate has been looking.
#[derive(Debug, Clone)]
pub struct HeatOverlay {
    cols: usize,
    rows: usize,
    radius: f32,
    /// Row-major intensity in `[0, 1]`.
    cells: Vec<f32>,
}

pub type SharedOverlay = Arc<Mutex<HeatOverlay>>;

impl HeatOverlay {
    pub fn new(viewport: (f32, f32), radius: f32) -> Self {
        let cols = (viewport.0 / CELL).ceil().max(1.0) as usize;
        let rows = (viewport.1 / CELL).ceil().max(1.0) as usize;
        Self {
            cols,
            rows,
            radius: radius.max(CELL),
            cells: vec![0.0; cols * rows],
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Intensity of the cell containing viewport point `(x, y)`.
    pub fn intensity_at(&self, x: f32, y: f32) -> f32 {
        let col = (x / CELL).floor();
        let row = (y / CELL).floor();
        if col < 0.0 || row < 0.0 || col as usize >= self.cols || row as usize >= self.rows {
            return 0.0;
        }
        self.cells[row as usize * self.cols + col as usize]
    }

    /// Add a radial blob centred on `point`: full strength at the centre,
    /// falling linearly to zero at `radius`.  Points further than `radius`
    /// outside the viewport, or not finite, paint nothing.
    pub fn paint(&mut self, point: GazePoint) {
        let width = self.cols as f32 * CELL;
        let height = self.rows as f32 * CELL;
        let reaches = |v: f32, extent: f32| {
            v.is_finite() && v > -self.radius && v < extent + self.radius
        };
        if !reaches(point.x, width) || !reaches(point.y, height) {
            return;
        }

        let span = (self.radius / CELL).ceil() as i64;
        let cc = (point.x / CELL).floor() as i64;
        let cr = (point.y / CELL).floor() as i64;

        for row in (cr - span)..=(cr + span) {
            if row < 0 || row >= self.rows as i64 {
                continue;
            }
            for col in (cc - span)..=(cc + span) {
                if col < 0 || col >= self.cols as i64 {
                    continue;
                }
                let cx = (col as f32 + 0.5) * CELL;
                let cy = (row as f32 + 0.5) * CELL;
                let d = ((cx - point.x).powi(2) + (cy - point.y).powi(2)).sqrt();
                if d >= self.radius {
                    continue;
                }
                let cell = &mut self.cells[row as usize * self.cols + col as usize];
                *cell = (*cell + (1.0 - d / self.radius)).min(1.0);
            }
        }
    }

    /// Blend every cell towards transparent by `alpha`.
    pub fn fade(&mut self, alpha: f32) {
        let keep = 1.0 - alpha.clamp(0.0, 1.0);
        for cell in &mut self.cells {
            *cell *= keep;
            if *cell < 1e-3 {
                *cell = 0.0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0.0);
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|&c| c == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> GazeAttentionTracker {
        GazeAttentionTracker::new(&MonitorConfig::default(), (1000.0, 800.0))
    }

    fn on() -> GazePoint {
        GazePoint { x: 500.0, y: 400.0 }
    }

    fn off() -> GazePoint {
        GazePoint { x: -20.0, y: 400.0 }
    }

    #[test]
    fn score_is_emitted_every_tenth_sample() {
        let mut t = tracker();
        for i in 1..=30 {
            let signal = t.push(on());
            if i % 10 == 0 {
                assert_eq!(signal, Some(DetectionSignal::GazeAttention { score: 100 }));
            } else {
                assert_eq!(signal, None);
            }
        }
    }

    #[test]
    fn forty_of_fifty_on_screen_scores_eighty() {
        let mut t = tracker();
        let mut last = None;
        for i in 0..50 {
            let p = if i % 5 == 0 { off() } else { on() };
            if let Some(s) = t.push(p) {
                last = Some(s);
            }
        }
        assert_eq!(last, Some(DetectionSignal::GazeAttention { score: 80 }));
    }

    #[test]
    fn window_forgets_old_samples() {
        let mut t = tracker();
        for _ in 0..50 {
            t.push(off());
        }
        assert_eq!(t.score(), 0);
        for _ in 0..50 {
            t.push(on());
        }
        assert_eq!(t.score(), 100);
    }

    #[test]
    fn viewport_edges_count_as_on_screen() {
        let mut t = tracker();
        for _ in 0..10 {
            t.push(GazePoint { x: 1000.0, y: 0.0 });
        }
        assert_eq!(t.score(), 100);
    }

    #[test]
    fn overlay_paints_then_fades_to_blank() {
        let mut overlay = HeatOverlay::new((320.0, 240.0), 40.0);
        assert!(overlay.is_blank());

        overlay.paint(GazePoint { x: 100.0, y: 100.0 });
        let centre = overlay.intensity_at(100.0, 100.0);
        let edge = overlay.intensity_at(130.0, 100.0);
        assert!(centre > edge && edge > 0.0);
        assert_eq!(overlay.intensity_at(300.0, 20.0), 0.0);

        for _ in 0..200 {
            overlay.fade(0.05);
        }
        assert!(overlay.is_blank());
    }

    #[test]
    fn overlay_ignores_points_outside_the_grid() {
        let mut overlay = HeatOverlay::new((64.0, 64.0), 8.0);
        overlay.paint(GazePoint {
            x: -500.0,
            y: -500.0,
        });
        assert!(overlay.is_blank());
    }

    #[test]
    fn far_and_non_finite_points_paint_nothing() {
        let mut overlay = HeatOverlay::new((640.0, 480.0), 40.0);
        for point in [
            GazePoint { x: 1.0e30, y: 240.0 },
            GazePoint { x: f32::INFINITY, y: 240.0 },
            GazePoint { x: 320.0, y: f32::NEG_INFINITY },
            GazePoint { x: f32::NAN, y: 240.0 },
        ] {
            overlay.paint(point);
        }
        assert!(overlay.is_blank());

        let mut t = tracker();
        for _ in 0..10 {
            t.push(GazePoint { x: 1.0e30, y: 240.0 });
        }
        assert_eq!(t.score(), 0);
    }

    #[test]
    fn point_just_outside_still_warms_the_edge() {
        let mut overlay = HeatOverlay::new((64.0, 64.0), 16.0);
        overlay.paint(GazePoint { x: -4.0, y: 32.0 });
        assert!(overlay.intensity_at(2.0, 32.0) > 0.0);
    }
}
