//! Output frame type.

/// A stereo audio frame (16-bit integer), the hardware output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: i16) -> Self {
        Self { left: value, right: value }
    }

    /// Clip a pair of f32 samples in -1.0..=1.0 to 16-bit.
    pub fn from_f32(left: f32, right: f32) -> Self {
        Self { left: to_i16(left), right: to_i16(right) }
    }

    /// Both channels as f32 in -1.0..1.0.
    pub fn to_f32(self) -> (f32, f32) {
        (self.left as f32 / 32768.0, self.right as f32 / 32768.0)
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

fn to_i16(sample: f32) -> i16 {
    // NaN clamps to zero through the float-to-int cast.
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
