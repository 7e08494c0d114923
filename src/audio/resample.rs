//! Channel mixing and sample-rate conversion.
//!
//! The recognizer wants **16 kHz mono `f32`**; the recorder wants mono at
//! the microphone's native rate.  Both go through [`downmix`], the
//! recognizer additionally through [`resample`].
//!
//! The resampler is linear interpolation: adequate for speech recognition
//! and cheap enough to run per chunk on the async runtime.

/// Sample rate expected by the speech recognizer.
pub const RECOGNIZER_RATE: u32 = 16_000;

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// `channels == 1` copies the input; `channels == 0` yields nothing.
///
/// ```rust
/// use interview_proctor::audio::downmix;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Resample mono `samples` from `from_rate` to `to_rate` Hz.
///
/// Output length is `ceil(len * to_rate / from_rate)`.  Equal rates are a
/// copy; a zero rate on either side yields nothing.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_mono_is_copy() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let out = downmix(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn resample_equal_rates_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_48k_to_16k_output_length() {
        let out = resample(&vec![0.5_f32; 480], 48_000, RECOGNIZER_RATE);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_44100_to_16k_output_length() {
        let out = resample(&vec![0.0_f32; 44_100], 44_100, RECOGNIZER_RATE);
        assert!(out.len().abs_diff(16_000) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_preserves_dc_amplitude() {
        for &s in &resample(&vec![0.5_f32; 480], 48_000, RECOGNIZER_RATE) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn resample_upsamples() {
        let out = resample(&vec![0.0_f32; 80], 8_000, RECOGNIZER_RATE);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_zero_rate_yields_nothing() {
        assert!(resample(&[0.1, 0.2], 0, RECOGNIZER_RATE).is_empty());
    }
}
