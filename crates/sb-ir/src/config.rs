//! Startup configuration.
//!
//! One `EngineConfig` is built when the process starts and handed by
//! reference to every component constructor. Buffer capacities are derived
//! from it, so nothing reads it again after construction.

use thiserror::Error;

/// Largest block the engine renders in one call.
pub const MAX_BLOCK_FRAMES: usize = 256;

/// Block size of the reference hardware.
pub const DEFAULT_BLOCK_FRAMES: usize = 64;

/// Output sample rate of the reference hardware.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Hard ceiling on the voice bank size.
pub const MAX_POLYPHONY: usize = 64;

/// Oscillator waveform for voices without a mapped sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum Waveform {
    Sine,
    #[default]
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    /// Map a 0-127 controller value onto the four waveforms.
    pub fn from_control(value: u8) -> Self {
        match value >> 5 {
            0 => Waveform::Sine,
            1 => Waveform::Saw,
            2 => Waveform::Square,
            _ => Waveform::Triangle,
        }
    }
}

/// How incoming velocity becomes voice gain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum VelocityCurve {
    #[default]
    Linear,
    Squared,
}

/// Where the sample memory manager places new assets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum TierPolicy {
    /// Try the bulk pool first, fall back to the fast pool.
    #[default]
    PreferBulk,
    /// Never touch the bulk pool.
    FastOnly,
}

/// ADSR times in seconds; sustain is a level in 0.0..=1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize), serde(default))]
pub struct EnvelopeConfig {
    pub attack_secs: f32,
    pub decay_secs: f32,
    pub sustain_level: f32,
    pub release_secs: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack_secs: 0.005,
            decay_secs: 0.1,
            sustain_level: 0.8,
            release_secs: 0.3,
        }
    }
}

/// Feedback delay parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize), serde(default))]
pub struct DelayConfig {
    /// Ring capacity in frames. `None` means a quarter second.
    pub max_frames: Option<usize>,
    /// Initial delay length in frames. `None` means an eighth of a second.
    pub delay_frames: Option<usize>,
    pub feedback: f32,
    pub dry: f32,
    pub wet: f32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            max_frames: None,
            delay_frames: None,
            feedback: 0.4,
            dry: 1.0,
            wet: 0.5,
        }
    }
}

/// Sample memory pool sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize), serde(default))]
pub struct MemoryConfig {
    pub policy: TierPolicy,
    /// Size of the large, slow pool. `None` when the board has none.
    pub bulk_bytes: Option<usize>,
    /// Size of the small, fast pool.
    pub fast_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            policy: TierPolicy::PreferBulk,
            bulk_bytes: Some(4 * 1024 * 1024),
            fast_bytes: 128 * 1024,
        }
    }
}

/// Process-wide engine parameters, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize), serde(default))]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub block_frames: usize,
    pub polyphony: usize,
    pub master_gain: f32,
    pub waveform: Waveform,
    pub envelope: EnvelopeConfig,
    pub delay: DelayConfig,
    pub memory: MemoryConfig,
    /// Ignore incoming velocity and use `constant_velocity_value`.
    pub constant_velocity: bool,
    pub constant_velocity_value: u8,
    pub velocity_curve: VelocityCurve,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_frames: DEFAULT_BLOCK_FRAMES,
            polyphony: 8,
            master_gain: 0.5,
            waveform: Waveform::default(),
            envelope: EnvelopeConfig::default(),
            delay: DelayConfig::default(),
            memory: MemoryConfig::default(),
            constant_velocity: false,
            constant_velocity_value: 127,
            velocity_curve: VelocityCurve::default(),
        }
    }
}

impl EngineConfig {
    /// Delay ring capacity in frames.
    pub fn delay_capacity(&self) -> usize {
        self.delay.max_frames.unwrap_or(self.sample_rate as usize / 4)
    }

    /// Initial delay length in frames, before clamping to the capacity.
    pub fn initial_delay(&self) -> usize {
        self.delay.delay_frames.unwrap_or(self.sample_rate as usize / 8)
    }

    /// Length of one render quantum in nanoseconds.
    pub fn quantum_nanos(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.block_frames as u64 * 1_000_000_000 / self.sample_rate as u64
    }

    /// Check every field against the ranges the engine can size buffers for.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if self.block_frames == 0 || self.block_frames > MAX_BLOCK_FRAMES {
            return Err(ConfigError::BlockFrames(self.block_frames));
        }
        if self.polyphony == 0 || self.polyphony > MAX_POLYPHONY {
            return Err(ConfigError::Polyphony(self.polyphony));
        }
        if self.delay_capacity() == 0 {
            return Err(ConfigError::DelayCapacity);
        }
        if self.memory.fast_bytes == 0 && self.memory.bulk_bytes.unwrap_or(0) == 0 {
            return Err(ConfigError::NoSampleMemory);
        }
        if self.constant_velocity_value > 127 {
            return Err(ConfigError::Velocity(self.constant_velocity_value));
        }
        let env = &self.envelope;
        let times = [env.attack_secs, env.decay_secs, env.release_secs];
        let bad_time = times.iter().any(|t| !t.is_finite() || *t < 0.0);
        if bad_time || !(0.0..=1.0).contains(&env.sustain_level) {
            return Err(ConfigError::Envelope);
        }
        let gains = [self.master_gain, self.delay.feedback, self.delay.dry, self.delay.wet];
        if gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
            return Err(ConfigError::Gain);
        }
        Ok(())
    }
}

/// A configuration value the engine cannot be built from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate {0} Hz is outside 8000..=192000")]
    SampleRate(u32),
    #[error("block size {0} is outside 1..=256")]
    BlockFrames(usize),
    #[error("polyphony {0} is outside 1..=64")]
    Polyphony(usize),
    #[error("delay capacity must be at least one frame")]
    DelayCapacity,
    #[error("both sample memory pools are empty")]
    NoSampleMemory,
    #[error("constant velocity {0} is above 127")]
    Velocity(u8),
    #[error("envelope times must be non-negative and sustain within 0..=1")]
    Envelope,
    #[error("gains must be finite and non-negative")]
    Gain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.block_frames, 64);
        assert_eq!(config.delay_capacity(), 44_100 / 4);
    }

    #[test]
    fn block_size_bounds() {
        let mut config = EngineConfig::default();
        config.block_frames = 0;
        assert_eq!(config.validate(), Err(ConfigError::BlockFrames(0)));
        config.block_frames = MAX_BLOCK_FRAMES + 1;
        assert!(config.validate().is_err());
        config.block_frames = MAX_BLOCK_FRAMES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_memory_rejected() {
        let mut config = EngineConfig::default();
        config.memory.bulk_bytes = None;
        config.memory.fast_bytes = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoSampleMemory));
    }

    #[test]
    fn negative_envelope_rejected() {
        let mut config = EngineConfig::default();
        config.envelope.release_secs = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::Envelope));
    }

    #[test]
    fn quantum_matches_block_duration() {
        let config = EngineConfig::default();
        // 64 / 44100 s
        assert_eq!(config.quantum_nanos(), 1_451_247);
    }

    #[test]
    fn waveform_from_control_covers_range() {
        assert_eq!(Waveform::from_control(0), Waveform::Sine);
        assert_eq!(Waveform::from_control(40), Waveform::Saw);
        assert_eq!(Waveform::from_control(70), Waveform::Square);
        assert_eq!(Waveform::from_control(127), Waveform::Triangle);
    }
}
