//! Picture-in-picture compositing.
//!
//! The screen frame is scaled to fill the whole canvas; the camera frame is
//! scaled into a fixed-size inset anchored to the bottom-right corner.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │                              │
//! │          screen              │
//! │                     ┌──────┐ │
//! │                     │camera│ │
//! │                     └──────┘ │
//! └──────────────────────────────┘
//! ```

use crate::config::CaptureConfig;
use crate::media::VideoFrame;

/// Axis-aligned destination rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Canvas geometry for the composite stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub inset_width: u32,
    pub inset_height: u32,
    pub margin: u32,
}

impl PipLayout {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            canvas_width: config.canvas_width,
            canvas_height: config.canvas_height,
            inset_width: config.inset_width,
            inset_height: config.inset_height,
            margin: config.inset_margin,
        }
    }

    pub fn canvas_rect(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: self.canvas_width,
            height: self.canvas_height,
        }
    }

    /// Bottom-right inset, clipped to the canvas when the inset is larger
    /// than the canvas.
    pub fn inset_rect(&self) -> Rect {
        let width = self.inset_width.min(self.canvas_width);
        let height = self.inset_height.min(self.canvas_height);
        Rect {
            x: self.canvas_width.saturating_sub(width + self.margin),
            y: self.canvas_height.saturating_sub(height + self.margin),
            width,
            height,
        }
    }
}

/// Nearest-neighbour scale `src` into `rect` of `dst`.
pub fn draw_scaled(dst: &mut VideoFrame, src: &VideoFrame, rect: Rect) {
    if src.is_empty() || rect.width == 0 || rect.height == 0 {
        return;
    }

    let x_end = (rect.x + rect.width).min(dst.width());
    let y_end = (rect.y + rect.height).min(dst.height());

    for dy in rect.y..y_end {
        let sy = ((dy - rect.y) as u64 * src.height() as u64 / rect.height as u64) as u32;
        for dx in rect.x..x_end {
            let sx = ((dx - rect.x) as u64 * src.width() as u64 / rect.width as u64) as u32;
            dst.set_pixel(dx, dy, src.pixel(sx, sy));
        }
    }
}

/// Render one composite frame.  Missing sources leave their area black.
pub fn composite(
    layout: &PipLayout,
    screen: Option<&VideoFrame>,
    camera: Option<&VideoFrame>,
) -> VideoFrame {
    let mut canvas = VideoFrame::solid(layout.canvas_width, layout.canvas_height, [0, 0, 0, 255]);

    if let Some(screen) = screen {
        draw_scaled(&mut canvas, screen, layout.canvas_rect());
    }
    if let Some(camera) = camera {
        draw_scaled(&mut canvas, camera, layout.inset_rect());
    }

    canvas
}
