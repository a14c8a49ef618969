//! One sounding (or releasing) note.

use sb_ir::{EnvelopeConfig, SampleHandle, Waveform};

use crate::envelope_state::EnvelopeState;
use crate::frequency::{
    cursor_step, phase_increment, pitch_to_hz, sample_rate_ratio, CURSOR_FRAC_BITS,
};
use crate::oscillator::Oscillator;
use crate::sample_memory::SampleMemory;

/// Identifies one note assignment. The serial changes every time a slot is
/// (re)assigned, so an id is never reused while its voice still renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceId {
    slot: u16,
    serial: u32,
}

impl VoiceId {
    pub(crate) fn new(slot: usize, serial: u32) -> Self {
        Self { slot: slot as u16, serial }
    }

    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }
}

/// Where a voice's signal comes from.
#[derive(Clone, Debug)]
pub enum VoiceSource {
    Oscillator(Oscillator),
    /// Reads a resident asset. `cursor` is a 48.16 fixed-point frame position.
    /// `in_loop` latches once the cursor first reaches the loop start; from
    /// then on the cursor stays inside the loop in either direction.
    Sample {
        handle: SampleHandle,
        root_note: u8,
        cursor: i64,
        in_loop: bool,
    },
}

impl VoiceSource {
    pub fn oscillator(waveform: Waveform) -> Self {
        VoiceSource::Oscillator(Oscillator::new(waveform, 0))
    }

    pub fn sample(handle: SampleHandle, root_note: u8) -> Self {
        VoiceSource::Sample {
            handle,
            root_note,
            cursor: 0,
            in_loop: false,
        }
    }
}

/// Per-block parameters shared by every voice.
#[derive(Clone, Copy, Debug)]
pub struct RenderContext {
    pub sample_rate: u32,
    /// Pitch offset in semitones.
    pub bend: f32,
    /// Signed playback speed factor for sample voices.
    pub scratch_rate: f32,
}

#[derive(Clone, Debug)]
pub struct Voice {
    id: VoiceId,
    pitch: u8,
    gain: f32,
    envelope: EnvelopeState,
    source: VoiceSource,
    started_at: u64,
    released_at: Option<u64>,
}

impl Voice {
    /// A voice with its envelope already gated on.
    pub fn new(
        id: VoiceId,
        pitch: u8,
        gain: f32,
        source: VoiceSource,
        envelope: &EnvelopeConfig,
        sample_rate: u32,
        started_at: u64,
    ) -> Self {
        let mut envelope = EnvelopeState::new(envelope, sample_rate);
        envelope.gate_on();
        Self {
            id,
            pitch,
            gain,
            envelope,
            source,
            started_at,
            released_at: None,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn source(&self) -> &VoiceSource {
        &self.source
    }

    pub fn envelope(&self) -> &EnvelopeState {
        &self.envelope
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn released_at(&self) -> Option<u64> {
        self.released_at
    }

    pub fn is_releasing(&self) -> bool {
        self.released_at.is_some()
    }

    /// The envelope has reached zero; the slot may be reused.
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    /// Play the same note again from the start under a new id.
    pub fn retrigger(&mut self, id: VoiceId, gain: f32, started_at: u64) {
        self.id = id;
        self.gain = gain;
        self.started_at = started_at;
        self.released_at = None;
        if let VoiceSource::Sample { cursor, in_loop, .. } = &mut self.source {
            *cursor = 0;
            *in_loop = false;
        }
        self.envelope.gate_on();
    }

    /// Begin the release phase. Has no effect on a voice already releasing.
    pub fn release(&mut self, at: u64) {
        if self.released_at.is_none() {
            self.released_at = Some(at);
            self.envelope.gate_off();
        }
    }

    pub fn kill(&mut self) {
        self.envelope.kill();
    }

    /// Mix `left.len()` frames into the buffers.
    ///
    /// A sample voice whose asset is gone keeps its envelope running but
    /// adds nothing, so it still frees once its release completes.
    pub fn render(
        &mut self,
        samples: &SampleMemory,
        ctx: &RenderContext,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        match &mut self.source {
            VoiceSource::Oscillator(osc) => {
                let hz = pitch_to_hz(self.pitch, ctx.bend);
                osc.set_increment(phase_increment(hz, ctx.sample_rate));
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    if self.envelope.is_finished() {
                        break;
                    }
                    let level = self.envelope.advance() * self.gain;
                    let s = osc.next_sample() * level;
                    *l += s;
                    *r += s;
                }
            }
            VoiceSource::Sample {
                handle,
                root_note,
                cursor,
                in_loop,
            } => {
                let Some(view) = samples.view(*handle) else {
                    for _ in 0..left.len() {
                        if self.envelope.is_finished() {
                            break;
                        }
                        self.envelope.advance();
                    }
                    return;
                };
                let info = view.info();
                let rate = sample_rate_ratio(
                    self.pitch,
                    *root_note,
                    ctx.bend,
                    info.sample_rate,
                    ctx.sample_rate,
                );
                let step = cursor_step(rate * ctx.scratch_rate);
                let end = (info.frames as i64) << CURSOR_FRAC_BITS;
                let region = info.has_loop().then(|| {
                    (
                        (info.loop_start as i64) << CURSOR_FRAC_BITS,
                        (info.loop_end as i64) << CURSOR_FRAC_BITS,
                    )
                });

                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    if self.envelope.is_finished() {
                        break;
                    }
                    if region.is_none() && *cursor >= end {
                        // One-shot reached its end.
                        self.envelope.kill();
                        break;
                    }
                    let level = self.envelope.advance() * self.gain;
                    let (sl, sr) = view.interpolated(*cursor);
                    *l += sl * level;
                    *r += sr * level;
                    *cursor += step;
                    match region {
                        Some((start, end)) => wrap_loop(cursor, in_loop, start, end),
                        None if *cursor < 0 => *cursor = 0,
                        None => {}
                    }
                }
            }
        }
    }
}

/// Keep a looped cursor playable after a step in either direction.
///
/// Before the loop is first reached the cursor only clamps at frame 0, so
/// reversing through the lead-in behaves like a one-shot.
fn wrap_loop(cursor: &mut i64, in_loop: &mut bool, start: i64, end: i64) {
    if !*in_loop && *cursor >= start {
        *in_loop = true;
    }
    if *in_loop {
        if *cursor < start || *cursor >= end {
            *cursor = start + (*cursor - start).rem_euclid(end - start);
        }
    } else if *cursor < 0 {
        *cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::CURSOR_ONE;
    use sb_ir::{MemoryConfig, RawAudio};

    fn instant_envelope() -> EnvelopeConfig {
        EnvelopeConfig {
            attack_secs: 0.0,
            decay_secs: 0.0,
            sustain_level: 1.0,
            release_secs: 0.0,
        }
    }

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 1000,
            bend: 0.0,
            scratch_rate: 1.0,
        }
    }

    fn sample_voice(handle: SampleHandle, pitch: u8, env: &EnvelopeConfig) -> Voice {
        let source = VoiceSource::sample(handle, 60);
        Voice::new(VoiceId::new(0, 1), pitch, 1.0, source, env, 1000, 0)
    }

    fn cursor_of(voice: &Voice) -> i64 {
        match voice.source() {
            VoiceSource::Sample { cursor, .. } => *cursor,
            VoiceSource::Oscillator(_) => panic!("not a sample voice"),
        }
    }

    fn memory_with(pcm: &[i16], looped: Option<(usize, usize)>) -> (SampleMemory, SampleHandle) {
        let mut mem = SampleMemory::new(&MemoryConfig {
            bulk_bytes: None,
            fast_bytes: 4096,
            ..MemoryConfig::default()
        });
        let mut raw = RawAudio::mono("s", pcm, 1000);
        if let Some((start, end)) = looped {
            raw = raw.looped(start, end);
        }
        let handle = mem.load(&raw).unwrap();
        (mem, handle)
    }

    #[test]
    fn one_shot_stops_at_end() {
        let pcm = [16384i16; 10];
        let (mem, handle) = memory_with(&pcm, None);
        let mut voice = sample_voice(handle, 60, &instant_envelope());
        let mut l = [0.0f32; 16];
        let mut r = [0.0f32; 16];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        assert!(voice.is_finished());
        assert!(l[..10].iter().all(|&s| (s - 0.5).abs() < 1e-4));
        assert!(l[10..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn looped_sample_keeps_playing() {
        let pcm = [1000i16; 8];
        let (mem, handle) = memory_with(&pcm, Some((2, 8)));
        let mut voice = sample_voice(handle, 60, &instant_envelope());
        let mut l = [0.0f32; 64];
        let mut r = [0.0f32; 64];
        for _ in 0..10 {
            voice.render(&mem, &ctx(), &mut l, &mut r);
        }
        assert!(!voice.is_finished());
        let cursor = cursor_of(&voice);
        assert!(cursor >= 2 * CURSOR_ONE && cursor < 8 * CURSOR_ONE);
    }

    #[test]
    fn reverse_scratch_clamps_one_shot_at_start() {
        let pcm = [100i16; 100];
        let (mem, handle) = memory_with(&pcm, None);
        let mut voice = sample_voice(handle, 60, &instant_envelope());
        let mut l = [0.0f32; 8];
        let mut r = [0.0f32; 8];
        let reverse = RenderContext { scratch_rate: -1.0, ..ctx() };
        voice.render(&mem, &reverse, &mut l, &mut r);
        assert!(!voice.is_finished());
        assert!(cursor_of(&voice) <= 0);
        voice.render(&mem, &ctx(), &mut l, &mut r);
        assert_eq!(cursor_of(&voice), 8 * CURSOR_ONE);
    }

    #[test]
    fn octave_up_doubles_cursor_speed() {
        let pcm = [0i16; 1000];
        let (mem, handle) = memory_with(&pcm, None);
        let mut voice = sample_voice(handle, 72, &instant_envelope());
        let mut l = [0.0f32; 10];
        let mut r = [0.0f32; 10];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        let cursor = cursor_of(&voice);
        assert!((cursor - 20 * CURSOR_ONE).abs() < 16, "cursor {}", cursor);
    }

    #[test]
    fn missing_sample_renders_silence_but_releases() {
        let pcm = [1000i16; 8];
        let (mut mem, handle) = memory_with(&pcm, None);
        mem.unload(handle);
        let env = EnvelopeConfig { release_secs: 0.005, ..instant_envelope() };
        let mut voice = sample_voice(handle, 60, &env);
        let mut l = [0.0f32; 4];
        let mut r = [0.0f32; 4];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0.0));
        assert!(!voice.is_finished());
        voice.release(1);
        for _ in 0..3 {
            voice.render(&mem, &ctx(), &mut l, &mut r);
        }
        assert!(voice.is_finished());
    }

    #[test]
    fn oscillator_voice_mixes_additively() {
        let mem = SampleMemory::new(&MemoryConfig::default());
        let source = VoiceSource::oscillator(Waveform::Square);
        let env = instant_envelope();
        let mut voice = Voice::new(VoiceId::new(0, 1), 69, 0.5, source, &env, 1000, 0);
        let mut l = [0.25f32; 4];
        let mut r = [0.0f32; 4];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        assert_eq!(l[0], 0.75);
        assert_eq!(r[0], 0.5);
    }

    #[test]
    fn retrigger_assigns_new_id_and_restarts() {
        let pcm = [0i16; 100];
        let (mem, handle) = memory_with(&pcm, None);
        let source = VoiceSource::sample(handle, 60);
        let env = instant_envelope();
        let mut voice = Voice::new(VoiceId::new(3, 1), 60, 1.0, source, &env, 1000, 0);
        let mut l = [0.0f32; 10];
        let mut r = [0.0f32; 10];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        voice.release(5);
        voice.retrigger(VoiceId::new(3, 2), 0.5, 6);
        assert_eq!(voice.id().serial(), 2);
        assert!(!voice.is_releasing());
        assert_eq!(cursor_of(&voice), 0);
    }

    /// Four silent lead-in frames, then a loop over four loud ones.
    fn lead_in_loop() -> [i16; 8] {
        [0, 0, 0, 0, 16384, 16384, 16384, 16384]
    }

    #[test]
    fn reverse_scratch_inside_loop_wraps_to_loop_end() {
        let pcm = lead_in_loop();
        let (mem, handle) = memory_with(&pcm, Some((4, 8)));
        let mut voice = sample_voice(handle, 60, &instant_envelope());
        let mut l = [0.0f32; 6];
        let mut r = [0.0f32; 6];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        assert_eq!(cursor_of(&voice), 6 * CURSOR_ONE);

        let reverse = RenderContext {
            scratch_rate: -1.0,
            ..ctx()
        };
        let mut l = [0.0f32; 16];
        let mut r = [0.0f32; 16];
        voice.render(&mem, &reverse, &mut l, &mut r);
        assert!(l.iter().all(|&s| (s - 0.5).abs() < 1e-4), "{:?}", l);
        assert!(!voice.is_finished());
        let cursor = cursor_of(&voice);
        assert!(cursor >= 4 * CURSOR_ONE && cursor < 8 * CURSOR_ONE);
    }

    #[test]
    fn fast_reverse_scratch_stays_in_loop() {
        let pcm = lead_in_loop();
        let (mem, handle) = memory_with(&pcm, Some((4, 8)));
        // Two octaves up: four frames per output frame.
        let mut voice = sample_voice(handle, 84, &instant_envelope());
        let mut l = [0.0f32; 3];
        let mut r = [0.0f32; 3];
        voice.render(&mem, &ctx(), &mut l, &mut r);

        let reverse = RenderContext {
            scratch_rate: -4.0,
            ..ctx()
        };
        for _ in 0..4 {
            let mut l = [0.0f32; 16];
            let mut r = [0.0f32; 16];
            voice.render(&mem, &reverse, &mut l, &mut r);
            assert!(l.iter().all(|&s| s > 0.4), "{:?}", l);
            let cursor = cursor_of(&voice);
            assert!(cursor >= 4 * CURSOR_ONE && cursor < 8 * CURSOR_ONE, "cursor {}", cursor);
        }
    }

    #[test]
    fn reverse_before_loop_is_reached_clamps_at_start() {
        let pcm = lead_in_loop();
        let (mem, handle) = memory_with(&pcm, Some((4, 8)));
        let mut voice = sample_voice(handle, 60, &instant_envelope());
        let mut l = [0.0f32; 2];
        let mut r = [0.0f32; 2];
        voice.render(&mem, &ctx(), &mut l, &mut r);
        let reverse = RenderContext {
            scratch_rate: -1.0,
            ..ctx()
        };
        let mut l = [0.0f32; 8];
        let mut r = [0.0f32; 8];
        voice.render(&mem, &reverse, &mut l, &mut r);
        assert_eq!(cursor_of(&voice), 0);
        assert!(l.iter().all(|&s| s == 0.0));
    }
}
