//! Fixed-capacity circular (ring) buffer.
//!
//! When the buffer is full, new items **overwrite** the oldest data so the
//! most recent `capacity` items are always available.  The microphone keeps
//! its recent PCM window in a `RingBuffer<f32>`; the gaze tracker keeps its
//! on-screen/off-screen history in a `RingBuffer<u8>`.
//!
//! # Example
//!
//! ```rust
//! use interview_proctor::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // oldest dropped
//! assert_eq!(buf.latest(2), vec![4.0, 5.0]);
//! assert_eq!(buf.drain(), vec![2.0, 3.0, 4.0, 5.0]);
//! ```

/// A fixed-capacity circular buffer over any `Copy` scalar.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid items currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.buf[self.write_pos] = item;
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.push(item);
        }
    }

    /// Position of the oldest valid item.
    fn read_pos(&self) -> usize {
        if self.len < self.capacity {
            0
        } else {
            self.write_pos
        }
    }

    /// Items in chronological order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let start = self.read_pos();
        (0..self.len).map(move |i| self.buf[(start + i) % self.capacity])
    }

    /// The newest `count` items in chronological order (fewer when the buffer
    /// holds less).
    pub fn latest(&self, count: usize) -> Vec<T> {
        let skip = self.len.saturating_sub(count);
        self.iter().skip(skip).collect()
    }

    /// Drain all stored items in chronological order and reset the buffer.
    pub fn drain(&mut self) -> Vec<T> {
        let result: Vec<T> = self.iter().collect();
        self.clear();
        result
    }

    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }
}

impl<T: Copy + Default + Into<f64>> RingBuffer<T> {
    /// Arithmetic mean of the stored items; `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.iter().map(Into::into).sum::<f64>() / self.len as f64
    }
}

impl RingBuffer<f32> {
    /// Duration of the stored samples in seconds, assuming `sample_rate` Hz
    /// mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_within_capacity() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[1.0_f32, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_full());

        assert_eq!(buf.drain(), vec![1.0, 2.0, 3.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_by_one_drops_oldest() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(buf.len(), 4);
        assert_eq!(buf.drain(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn multiple_overflows_in_separate_calls() {
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1.0_f32, 2.0, 3.0]);
        buf.push_slice(&[4.0, 5.0]);

        assert_eq!(buf.drain(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn latest_returns_newest_in_order() {
        let mut buf = RingBuffer::new(5);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buf.latest(3), vec![5.0, 6.0, 7.0]);
        assert_eq!(buf.latest(100), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        // latest does not consume
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn mean_over_u8_flags() {
        let mut buf: RingBuffer<u8> = RingBuffer::new(4);
        assert_eq!(buf.mean(), 0.0);
        for flag in [1, 0, 1, 1, 1, 0] {
            buf.push(flag);
        }
        // window holds [1, 1, 1, 0]
        assert!((buf.mean() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn clear_then_reuse() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        buf.clear();
        assert!(buf.is_empty());

        buf.push_slice(&[9.0_f32]);
        assert_eq!(buf.drain(), vec![9.0]);
    }

    #[test]
    fn duration_secs_calculation() {
        let mut buf = RingBuffer::new(16_000);
        buf.push_slice(&vec![0.0_f32; 8_000]);
        assert!((buf.duration_secs(16_000) - 0.5).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf: RingBuffer<f32> = RingBuffer::new(0);
    }
}
