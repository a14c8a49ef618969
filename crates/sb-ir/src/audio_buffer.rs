//! Stereo f32 mix buffer with planar layout.

use alloc::vec;
use alloc::vec::Vec;

/// A planar stereo buffer whose storage is sized once for `capacity`
/// frames. The active length can shrink and grow within that capacity
/// without touching the allocator.
///
/// `data[ch * capacity + frame]` gives the sample for channel `ch` at `frame`.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    data: Vec<f32>,
    capacity: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Create a silent buffer holding up to `capacity` frames, all active.
    pub fn new(capacity: usize) -> Self {
        Self { data: vec![0.0; 2 * capacity], capacity, frames: capacity }
    }

    /// Number of active frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the active length, clamped to the capacity.
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity);
    }

    /// Zero the active frames.
    pub fn silence(&mut self) {
        let (left, right) = self.stereo_mut();
        left.fill(0.0);
        right.fill(0.0);
    }

    /// Read-only access to one channel (0 = left, 1 = right).
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch.min(1) * self.capacity;
        &self.data[start..start + self.frames]
    }

    /// Both channels at once, for in-place stereo processing.
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let frames = self.frames;
        let (left, right) = self.data.split_at_mut(self.capacity);
        (&mut left[..frames], &mut right[..frames])
    }

    /// Scale all active samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        let (left, right) = self.stereo_mut();
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s *= gain;
        }
    }

    /// Largest absolute sample across both channels.
    pub fn peak(&self) -> f32 {
        self.channel(0)
            .iter()
            .chain(self.channel(1))
            .fold(0.0f32, |acc, s| libm::fmaxf(acc, libm::fabsf(*s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = AudioBuffer::new(4);
        assert_eq!(buf.frames(), 4);
        assert!(buf.channel(0).iter().all(|&s| s == 0.0));
        assert!(buf.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stereo_mut_writes_separate_planes() {
        let mut buf = AudioBuffer::new(2);
        {
            let (l, r) = buf.stereo_mut();
            l[0] = 1.0;
            r[1] = -0.5;
        }
        assert_eq!(buf.channel(0), &[1.0, 0.0]);
        assert_eq!(buf.channel(1), &[0.0, -0.5]);
    }

    #[test]
    fn set_frames_clamps_to_capacity() {
        let mut buf = AudioBuffer::new(8);
        buf.set_frames(3);
        assert_eq!(buf.channel(0).len(), 3);
        buf.set_frames(100);
        assert_eq!(buf.frames(), 8);
    }

    #[test]
    fn silence_and_gain() {
        let mut buf = AudioBuffer::new(2);
        buf.stereo_mut().0[0] = 0.5;
        buf.apply_gain(2.0);
        assert!((buf.channel(0)[0] - 1.0).abs() < 1e-6);
        assert!((buf.peak() - 1.0).abs() < 1e-6);
        buf.silence();
        assert_eq!(buf.peak(), 0.0);
    }
}
