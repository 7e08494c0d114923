//! Energy-based voice activity detection.
//!
//! Audio is split into 30 ms frames (480 samples @ 16 kHz).  A frame is
//! *voice* when its RMS amplitude exceeds the threshold.  The continuous
//! recognizer uses [`VadDetector::trailing_silence`] to decide when an
//! utterance has ended and [`VadDetector::trim_silence`] to cut the padding
//! before transcription; trimming keeps Whisper from hallucinating text in
//! quiet stretches.

/// Energy-based silence detector.
///
/// ```rust
/// use interview_proctor::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
///
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 480]);
///
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// assert_eq!(vad.trailing_silence(&audio), 480);
/// ```
#[derive(Debug, Clone)]
pub struct VadDetector {
    rms_threshold: f32,
    /// Default: 480 samples = 30 ms at 16 kHz.
    frame_size: usize,
}

impl VadDetector {
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            frame_size: 480,
        }
    }

    pub fn with_frame_size(rms_threshold: f32, frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            rms_threshold,
            frame_size,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    /// `true` when the RMS of `chunk` exceeds the threshold.
    pub fn is_voice(&self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }
        let mean_sq: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }

    fn frame(&self, audio: &[f32], i: usize) -> std::ops::Range<usize> {
        let s = i * self.frame_size;
        s..((i + 1) * self.frame_size).min(audio.len())
    }

    fn frame_count(&self, audio: &[f32]) -> usize {
        audio.len().div_ceil(self.frame_size)
    }

    /// `true` when any frame of `audio` contains voice.
    pub fn contains_voice(&self, audio: &[f32]) -> bool {
        (0..self.frame_count(audio)).any(|i| self.is_voice(&audio[self.frame(audio, i)]))
    }

    /// Trim leading and trailing silence.  Returns a sub-slice; an
    /// all-silent input yields an empty slice.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        let frames = self.frame_count(audio);
        let is_voice = |i: usize| self.is_voice(&audio[self.frame(audio, i)]);

        let Some(first) = (0..frames).find(|&i| is_voice(i)) else {
            return &audio[0..0];
        };
        let last = (0..frames).rfind(|&i| is_voice(i)).unwrap_or(first);

        &audio[self.frame(audio, first).start..self.frame(audio, last).end]
    }

    /// Number of samples of silence at the end of `audio`, counted in whole
    /// frames.  Equals `audio.len()` when nothing is voiced.
    pub fn trailing_silence(&self, audio: &[f32]) -> usize {
        let frames = self.frame_count(audio);
        match (0..frames).rfind(|&i| self.is_voice(&audio[self.frame(audio, i)])) {
            Some(last) => audio.len() - self.frame(audio, last).end,
            None => audio.len(),
        }
    }
}
