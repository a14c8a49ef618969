//! Controller-number assignments.

/// An engine parameter reachable through a MIDI control change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlParam {
    MasterVolume,
    DelayFeedback,
    DelayMix,
    DelayLength,
    ScratchOff,
    Waveform,
    Release,
    Attack,
    Decay,
    Sustain,
    /// Silence every voice at once, skipping release tails.
    AllSoundOff,
    /// Send every voice into its release phase.
    AllNotesOff,
}

impl ControlParam {
    /// Look up the parameter bound to a controller number.
    pub fn from_cc(controller: u8) -> Option<Self> {
        let param = match controller {
            7 => ControlParam::MasterVolume,
            12 => ControlParam::DelayFeedback,
            13 => ControlParam::DelayMix,
            14 => ControlParam::DelayLength,
            66 => ControlParam::ScratchOff,
            70 => ControlParam::Waveform,
            72 => ControlParam::Release,
            73 => ControlParam::Attack,
            75 => ControlParam::Decay,
            79 => ControlParam::Sustain,
            120 => ControlParam::AllSoundOff,
            123 => ControlParam::AllNotesOff,
            _ => return None,
        };
        Some(param)
    }
}
