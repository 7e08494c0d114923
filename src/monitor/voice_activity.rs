//! Whisper detector: sustained low-level speech on the microphone.
//!
//! Fed once per audio tick with the mean spectrum level (0–255).  A level
//! inside the whisper band while the system voice is silent adds one to a
//! counter; anything else takes two away (floored at zero).  Crossing the
//! sustain threshold raises `AudioActivity { whispering: true }` once; the
//! counter draining back to zero afterwards clears it.
//!
//! The speaking flag is read on every tick; while the synthesizer is
//! talking the counter can only fall.

use crate::config::MonitorConfig;
use crate::monitor::DetectionSignal;

#[derive(Debug)]
pub struct AudioActivityDetector {
    band_low: f32,
    band_high: f32,
    sustain_ticks: u32,
    counter: u32,
    alerted: bool,
}

impl AudioActivityDetector {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            band_low: config.whisper_band_low,
            band_high: config.whisper_band_high,
            sustain_ticks: config.whisper_sustain_ticks,
            counter: 0,
            alerted: false,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    fn in_band(&self, level: f32) -> bool {
        level >= self.band_low && level <= self.band_high
    }

    pub fn tick(&mut self, mean_level: f32, system_speaking: bool) -> Option<DetectionSignal> {
        if !system_speaking && self.in_band(mean_level) {
            self.counter += 1;
        } else {
            self.counter = self.counter.saturating_sub(2);
        }

        if !self.alerted && self.counter > self.sustain_ticks {
            self.alerted = true;
            return Some(DetectionSignal::AudioActivity { whispering: true });
        }
        if self.alerted && self.counter == 0 {
            self.alerted = false;
            return Some(DetectionSignal::AudioActivity { whispering: false });
        }
        None
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.alerted = false;
    }
}
