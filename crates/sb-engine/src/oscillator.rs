//! Phase-accumulator oscillator.

use core::f32::consts::TAU;

use sb_ir::Waveform;

/// One naive (non-bandlimited) oscillator.
///
/// The phase is a `u32` that wraps once per cycle, so accumulated error
/// stays bounded no matter how long the voice runs.
#[derive(Clone, Debug)]
pub struct Oscillator {
    phase: u32,
    increment: u32,
    waveform: Waveform,
}

impl Oscillator {
    pub fn new(waveform: Waveform, increment: u32) -> Self {
        Self { phase: 0, increment, waveform }
    }

    pub fn set_increment(&mut self, increment: u32) {
        self.increment = increment;
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Produce one sample in -1.0..=1.0 and advance.
    pub fn next_sample(&mut self) -> f32 {
        let value = shape(self.waveform, self.phase);
        self.phase = self.phase.wrapping_add(self.increment);
        value
    }
}

fn shape(waveform: Waveform, phase: u32) -> f32 {
    let t = phase as f32 / 4_294_967_296.0;
    match waveform {
        Waveform::Sine => libm::sinf(t * TAU),
        Waveform::Saw => 2.0 * t - 1.0,
        Waveform::Square => {
            if phase < 1 << 31 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => 1.0 - 4.0 * libm::fabsf(t - 0.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wraps_instead_of_growing() {
        let mut osc = Oscillator::new(Waveform::Saw, u32::MAX / 3 + 1);
        for _ in 0..10_000 {
            osc.next_sample();
        }
        let third = u32::MAX / 3 + 1;
        assert_eq!(osc.phase(), third.wrapping_mul(10_000));
    }

    #[test]
    fn square_alternates() {
        let mut osc = Oscillator::new(Waveform::Square, 1 << 31);
        assert_eq!(osc.next_sample(), 1.0);
        assert_eq!(osc.next_sample(), -1.0);
        assert_eq!(osc.next_sample(), 1.0);
    }

    #[test]
    fn shapes_stay_in_range() {
        for waveform in [Waveform::Sine, Waveform::Saw, Waveform::Square, Waveform::Triangle] {
            let mut osc = Oscillator::new(waveform, 97_391_551);
            for _ in 0..1000 {
                let s = osc.next_sample();
                assert!((-1.0..=1.0).contains(&s), "{:?} produced {}", waveform, s);
            }
        }
    }

    #[test]
    fn triangle_peaks_at_half_turn() {
        assert_eq!(shape(Waveform::Triangle, 0), -1.0);
        assert_eq!(shape(Waveform::Triangle, 1 << 31), 1.0);
    }
}
