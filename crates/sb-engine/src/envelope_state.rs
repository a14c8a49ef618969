//! Runtime evaluator for the amplitude envelope.

use sb_ir::EnvelopeConfig;

/// Envelope phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Silent; the owning voice may be freed.
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    /// Gate-off received; falling linearly to zero.
    Release,
}

/// Linear ADSR state, advanced one frame at a time.
#[derive(Clone, Debug)]
pub struct EnvelopeState {
    stage: EnvelopeStage,
    /// Current output level, 0.0..=1.0.
    value: f32,
    attack_step: f32,
    decay_step: f32,
    sustain: f32,
    release_frames: f32,
    /// Per-frame fall, fixed at gate-off from the level reached so far.
    release_step: f32,
    /// Gate-off arrived before the first frame; release after it.
    release_pending: bool,
}

impl EnvelopeState {
    /// Create an idle envelope with times converted to frame steps.
    pub fn new(config: &EnvelopeConfig, sample_rate: u32) -> Self {
        let frames = |secs: f32| (secs * sample_rate as f32).max(1.0);
        let sustain = config.sustain_level.clamp(0.0, 1.0);
        Self {
            stage: EnvelopeStage::Idle,
            value: 0.0,
            attack_step: 1.0 / frames(config.attack_secs),
            decay_step: (1.0 - sustain) / frames(config.decay_secs),
            sustain,
            release_frames: config.release_secs * sample_rate as f32,
            release_step: 0.0,
            release_pending: false,
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current output value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// The release phase has reached zero (or the envelope never started).
    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    /// Start (or restart) the attack from the current level.
    pub fn gate_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.release_pending = false;
    }

    /// Enter the release phase.
    ///
    /// A note released before its first frame still sounds: the attack
    /// takes one step and the release starts from there.
    pub fn gate_off(&mut self) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }
        if self.stage == EnvelopeStage::Attack && self.value <= 0.0 && self.release_frames >= 1.0 {
            self.release_pending = true;
            return;
        }
        self.release_pending = false;
        if self.release_frames < 1.0 || self.value <= 0.0 {
            self.kill();
            return;
        }
        self.release_step = self.value / self.release_frames;
        self.stage = EnvelopeStage::Release;
    }

    /// Drop straight to silence.
    pub fn kill(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.value = 0.0;
        self.release_pending = false;
    }

    /// Advance one frame and return the new level.
    pub fn advance(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {}
            EnvelopeStage::Attack => {
                self.value += self.attack_step;
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.value -= self.decay_step;
                if self.value <= self.sustain {
                    self.value = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                    // Nothing left to hold or release.
                    if self.sustain <= 0.0 {
                        self.kill();
                    }
                }
            }
            EnvelopeStage::Sustain => {}
            EnvelopeStage::Release => {
                self.value -= self.release_step;
                if self.value <= 0.0 {
                    self.kill();
                }
            }
        }
        let level = self.value;
        if self.release_pending {
            self.gate_off();
        }
        level
    }
}
