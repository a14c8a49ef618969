//! Feedback delay over a fixed ring of stereo frames.

use alloc::vec;
use alloc::vec::Vec;

use sb_ir::{AudioBuffer, DelayConfig};

/// Highest feedback gain accepted at runtime. At 1.0 the tail never decays.
pub const MAX_FEEDBACK: f32 = 0.99;

/// A circular delay line of `capacity` frames.
///
/// The ring is allocated once. Changing the delay length only moves the
/// read offset. The read position is derived from the write position every
/// frame, so write always leads read by exactly `delay` frames modulo the
/// capacity.
#[derive(Clone, Debug)]
pub struct DelayLine {
    ring: Vec<[f32; 2]>,
    write: usize,
    delay: usize,
    feedback: f32,
    dry: f32,
    wet: f32,
}

impl DelayLine {
    /// Build a ring of `capacity` frames (at least one).
    pub fn new(capacity: usize, config: &DelayConfig, delay: usize) -> Self {
        let capacity = capacity.max(1);
        let mut line = Self {
            ring: vec![[0.0; 2]; capacity],
            write: 0,
            delay: 1,
            feedback: 0.0,
            dry: config.dry,
            wet: config.wet,
        };
        line.set_delay(delay);
        line.set_feedback(config.feedback);
        line
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Change the delay length, clamped to `1..=capacity`.
    pub fn set_delay(&mut self, frames: usize) {
        self.delay = frames.clamp(1, self.capacity());
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn set_feedback(&mut self, gain: f32) {
        self.feedback = if gain.is_finite() { gain.clamp(0.0, MAX_FEEDBACK) } else { 0.0 };
    }

    /// Dry and wet gains.
    pub fn mix(&self) -> (f32, f32) {
        (self.dry, self.wet)
    }

    pub fn set_mix(&mut self, dry: f32, wet: f32) {
        let sane = |g: f32| if g.is_finite() { g.max(0.0) } else { 0.0 };
        self.dry = sane(dry);
        self.wet = sane(wet);
    }

    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Ring slot read on the next frame.
    pub fn read_index(&self) -> usize {
        (self.write + self.capacity() - self.delay) % self.capacity()
    }

    /// Zero the ring without moving the write position.
    pub fn clear(&mut self) {
        self.ring.fill([0.0; 2]);
    }

    /// Run the effect in place over every active frame of `buffer`.
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let capacity = self.capacity();
        let (left, right) = buffer.stereo_mut();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let delayed = self.ring[self.read_index()];
            let input = [*l, *r];
            *l = input[0] * self.dry + delayed[0] * self.wet;
            *r = input[1] * self.dry + delayed[1] * self.wet;
            self.ring[self.write] =
                [input[0] + delayed[0] * self.feedback, input[1] + delayed[1] * self.feedback];
            self.write = (self.write + 1) % capacity;
        }
    }
}
