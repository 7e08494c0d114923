//! Motion detector: frame differencing on a downsampled luma grid.
//!
//! Each sample shrinks the camera frame to a `grid_width × grid_height`
//! luma grid (nearest neighbour) and compares it with the previous grid.
//! A cell counts as changed when its luma moved by more than the delta
//! threshold.  The changed fraction classifies the sample:
//!
//! | changed fraction        | level    |
//! |-------------------------|----------|
//! | `> high_ratio` (20 %)   | `High`   |
//! | `< static_ratio` (1 %)  | `Static` |
//! | otherwise               | `Normal` |

use crate::config::MonitorConfig;
use crate::media::VideoFrame;
use crate::monitor::{DetectionSignal, MotionLevel};

pub struct MotionDetector {
    grid_width: u32,
    grid_height: u32,
    delta_threshold: u8,
    high_ratio: f32,
    static_ratio: f32,
    previous: Option<Vec<u8>>,
}

impl MotionDetector {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            grid_width: config.motion_grid_width.max(1),
            grid_height: config.motion_grid_height.max(1),
            delta_threshold: config.motion_delta_threshold,
            high_ratio: config.motion_high_ratio,
            static_ratio: config.motion_static_ratio,
            previous: None,
        }
    }

    fn downsample(&self, frame: &VideoFrame) -> Vec<u8> {
        let mut grid = Vec::with_capacity((self.grid_width * self.grid_height) as usize);
        for gy in 0..self.grid_height {
            let y = (gy as u64 * frame.height() as u64 / self.grid_height as u64) as u32;
            for gx in 0..self.grid_width {
                let x = (gx as u64 * frame.width() as u64 / self.grid_width as u64) as u32;
                grid.push(frame.luma(x, y));
            }
        }
        grid
    }

    /// Classify one camera frame against the previous one.
    ///
    /// The first sample, and any empty frame, has nothing to compare with
    /// and reports `Normal`.
    pub fn sample(&mut self, frame: &VideoFrame) -> DetectionSignal {
        if frame.is_empty() {
            return DetectionSignal::Motion {
                level: MotionLevel::Normal,
            };
        }

        let grid = self.downsample(frame);
        let level = match self.previous.as_deref() {
            None => MotionLevel::Normal,
            Some(previous) => {
                let changed = grid
                    .iter()
                    .zip(previous)
                    .filter(|(a, b)| a.abs_diff(**b) > self.delta_threshold)
                    .count();
                let ratio = changed as f32 / grid.len() as f32;

                if ratio > self.high_ratio {
                    MotionLevel::High
                } else if ratio < self.static_ratio {
                    MotionLevel::Static
                } else {
                    MotionLevel::Normal
                }
            }
        };

        self.previous = Some(grid);
        DetectionSignal::Motion { level }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> MotionDetector {
        MotionDetector::from_config(&MonitorConfig {
            motion_grid_width: 10,
            motion_grid_height: 10,
            ..MonitorConfig::default()
        })
    }

    fn level(signal: DetectionSignal) -> MotionLevel {
        match signal {
            DetectionSignal::Motion { level } => level,
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn first_sample_is_normal() {
        let mut d = detector();
        assert_eq!(
            level(d.sample(&VideoFrame::solid(20, 20, [0, 0, 0, 255]))),
            MotionLevel::Normal
        );
    }

    #[test]
    fn identical_frames_are_static() {
        let mut d = detector();
        let frame = VideoFrame::solid(20, 20, [90, 90, 90, 255]);
        d.sample(&frame);
        assert_eq!(level(d.sample(&frame)), MotionLevel::Static);
    }

    #[test]
    fn full_scene_change_is_high() {
        let mut d = detector();
        d.sample(&VideoFrame::solid(20, 20, [0, 0, 0, 255]));
        assert_eq!(
            level(d.sample(&VideoFrame::solid(20, 20, [255, 255, 255, 255]))),
            MotionLevel::High
        );
    }

    #[test]
    fn moderate_change_is_normal() {
        let mut d = detector();
        let base = VideoFrame::solid(20, 20, [0, 0, 0, 255]);
        d.sample(&base);

        // Grid row 0 samples pixel row 0, so 10 of 100 cells change.
        let mut moved = base.clone();
        for x in 0..20 {
            moved.set_pixel(x, 0, [255, 255, 255, 255]);
        }
        assert_eq!(level(d.sample(&moved)), MotionLevel::Normal);
    }

    #[test]
    fn small_luma_jitter_is_ignored() {
        let mut d = detector();
        d.sample(&VideoFrame::solid(20, 20, [100, 100, 100, 255]));
        assert_eq!(
            level(d.sample(&VideoFrame::solid(20, 20, [120, 120, 120, 255]))),
            MotionLevel::Static
        );
    }

    #[test]
    fn empty_frame_does_not_disturb_history() {
        let mut d = detector();
        let frame = VideoFrame::solid(20, 20, [10, 10, 10, 255]);
        d.sample(&frame);
        assert_eq!(
            level(d.sample(&VideoFrame::solid(0, 0, [0; 4]))),
            MotionLevel::Normal
        );
        assert_eq!(level(d.sample(&frame)), MotionLevel::Static);
    }
}
