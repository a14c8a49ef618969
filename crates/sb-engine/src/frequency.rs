//! Pitch-to-rate conversion for oscillators and sample playback.
//!
//! Oscillators step a 32-bit phase accumulator that wraps once per cycle.
//! Sample voices step a 48.16 fixed-point cursor through the asset.

/// MIDI note of A4.
const A4_NOTE: f32 = 69.0;

/// Frequency of A4 in Hz.
const A4_HZ: f32 = 440.0;

/// Fractional bits of the sample cursor.
pub const CURSOR_FRAC_BITS: u32 = 16;

/// One frame in cursor units.
pub const CURSOR_ONE: i64 = 1 << CURSOR_FRAC_BITS;

/// Frequency ratio for a signed semitone offset (12-TET).
pub fn semitone_ratio(semitones: f32) -> f32 {
    libm::exp2f(semitones / 12.0)
}

/// Equal-tempered frequency of a MIDI note, optionally bent.
pub fn pitch_to_hz(pitch: u8, bend_semitones: f32) -> f32 {
    A4_HZ * semitone_ratio(pitch as f32 - A4_NOTE + bend_semitones)
}

/// Phase increment per output frame for a 32-bit wrapping accumulator.
pub fn phase_increment(hz: f32, sample_rate: u32) -> u32 {
    if sample_rate == 0 || !(hz > 0.0) {
        return 0;
    }
    let cycles_per_frame = (hz / sample_rate as f32) as f64;
    // Above Nyquist the accumulator would alias; cap at half a turn.
    (cycles_per_frame.min(0.5) * 4_294_967_296.0) as u32
}

/// Playback rate of a sample voice relative to the asset's own rate.
///
/// A note equal to `root_note` plays the asset at its recorded pitch.
pub fn sample_rate_ratio(
    pitch: u8,
    root_note: u8,
    bend_semitones: f32,
    asset_rate: u32,
    output_rate: u32,
) -> f32 {
    if output_rate == 0 {
        return 0.0;
    }
    let transpose = pitch as f32 - root_note as f32 + bend_semitones;
    semitone_ratio(transpose) * asset_rate as f32 / output_rate as f32
}

/// Convert a per-frame rate into a fixed-point cursor step.
pub fn cursor_step(rate: f32) -> i64 {
    if !rate.is_finite() {
        return 0;
    }
    (rate * CURSOR_ONE as f32) as i64
}
