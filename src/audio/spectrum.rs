//! Byte-scaled frequency analysis of short PCM windows.
//!
//! [`SpectrumAnalyser`] turns the most recent `fft_size` mono samples into
//! `fft_size / 2` magnitude bins scaled to `0..=255`, the representation the
//! whisper detector thresholds against:
//!
//! 1. Blackman window over the input window.
//! 2. DFT magnitude per bin, normalised by `fft_size`.
//! 3. Exponential smoothing against the previous call (`τ = 0.8`).
//! 4. Decibels mapped linearly from `[-100, -30] dB` onto `[0, 255]`.
//!
//! Window sizes are small (256 by default) so a direct DFT is used.

use std::f32::consts::PI;

const SMOOTHING: f32 = 0.8;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

pub struct SpectrumAnalyser {
    fft_size: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    /// Precomputed `(cos, sin)` of `2πkn/N` for one full period.
    twiddles: Vec<(f32, f32)>,
}

impl SpectrumAnalyser {
    /// `fft_size` is rounded up to an even number of at least 2.
    pub fn new(fft_size: usize) -> Self {
        let n = fft_size.max(2).next_multiple_of(2);

        let window = (0..n)
            .map(|i| {
                let x = i as f32 / n as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        let twiddles = (0..n)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / n as f32;
                (phase.cos(), phase.sin())
            })
            .collect();

        Self {
            fft_size: n,
            window,
            smoothed: vec![0.0; n / 2],
            twiddles,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse the newest `fft_size` samples of `samples`.  Shorter input is
    /// zero-padded at the front.
    pub fn byte_frequency_data(&mut self, samples: &[f32]) -> Vec<u8> {
        let n = self.fft_size;
        let mut input = vec![0.0_f32; n];
        let take = samples.len().min(n);
        input[n - take..].copy_from_slice(&samples[samples.len() - take..]);
        for (s, w) in input.iter_mut().zip(&self.window) {
            *s *= w;
        }

        let mut bytes = Vec::with_capacity(n / 2);
        for k in 0..n / 2 {
            let (mut re, mut im) = (0.0_f32, 0.0_f32);
            for (i, &s) in input.iter().enumerate() {
                let (c, si) = self.twiddles[(k * i) % n];
                re += s * c;
                im -= s * si;
            }
            let magnitude = (re * re + im * im).sqrt() / n as f32;

            let smoothed = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[k] = smoothed;

            let db = 20.0 * smoothed.log10();
            let scaled = 255.0 * (db - MIN_DB) / (MAX_DB - MIN_DB);
            bytes.push(if scaled.is_nan() {
                0
            } else {
                scaled.clamp(0.0, 255.0) as u8
            });
        }
        bytes
    }

    /// Forget the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Mean of all bins, `0.0` for an empty spectrum.
pub fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(bin: usize, n: usize, amplitude: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / n as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = SpectrumAnalyser::new(256);
        let bins = analyser.byte_frequency_data(&[0.0; 256]);
        assert_eq!(bins.len(), 128);
        assert!(bins.iter().all(|&b| b == 0));
        assert_eq!(mean_level(&bins), 0.0);
    }

    #[test]
    fn loud_tone_peaks_at_its_bin() {
        let mut analyser = SpectrumAnalyser::new(256);
        let bins = analyser.byte_frequency_data(&sine(16, 256, 1.0));
        assert!(bins[16] > 200, "peak was {}", bins[16]);
        assert!(bins[100] < 50, "far bin was {}", bins[100]);
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut analyser = SpectrumAnalyser::new(256);
        let bins = analyser.byte_frequency_data(&[0.0; 10]);
        assert_eq!(bins.len(), 128);
    }

    #[test]
    fn smoothing_carries_energy_into_silence() {
        let mut analyser = SpectrumAnalyser::new(256);
        let loud = mean_level(&analyser.byte_frequency_data(&sine(16, 256, 1.0)));
        let after = mean_level(&analyser.byte_frequency_data(&[0.0; 256]));
        assert!(after > 0.0 && after <= loud);

        analyser.reset();
        let reset = mean_level(&analyser.byte_frequency_data(&[0.0; 256]));
        assert_eq!(reset, 0.0);
    }

    #[test]
    fn odd_size_is_rounded_up() {
        assert_eq!(SpectrumAnalyser::new(255).fft_size(), 256);
        assert_eq!(SpectrumAnalyser::new(0).bin_count(), 1);
    }
}
