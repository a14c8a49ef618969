//! VoicePool: voice allocation, stealing and the per-block voice render.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::RangeInclusive;

use sb_ir::{Axis, EngineConfig, EnvelopeConfig, SampleHandle, VelocityCurve, Waveform};

use crate::sample_memory::SampleMemory;
use crate::stats::EngineStats;
use crate::voice::{RenderContext, Voice, VoiceId, VoiceSource};

/// Angular speed of a turntable at 33 1/3 rpm, in degrees per second.
pub const REFERENCE_DEGREES_PER_SEC: f32 = 200.0;

/// Fastest scratch speed factor, either direction.
pub const MAX_SCRATCH_RATE: f32 = 4.0;

/// Widest pitch bend, in semitones.
pub const MAX_BEND: f32 = 24.0;

/// A sample bound to a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyZone {
    pub sample: SampleHandle,
    pub root_note: u8,
}

/// Scratch input state, shared by every sample voice.
#[derive(Clone, Copy, Debug)]
struct Scratch {
    enabled: bool,
    /// Held until the next angle movement or `ScratchRate` sample.
    rate: f32,
    /// Reference for the next angle delta; the first sample only seeds it.
    last_angle: Option<f32>,
    /// Degrees turned since the last render.
    pending_degrees: f32,
    angle_seen: bool,
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
            last_angle: None,
            pending_degrees: 0.0,
            angle_seen: false,
        }
    }
}

/// Fixed bank of voice slots.
pub struct VoicePool {
    slots: Vec<Option<Voice>>,
    keymap: [Option<KeyZone>; 128],
    serial: u32,
    /// Orders note-ons and releases for stealing.
    clock: u64,
    sample_rate: u32,
    block_frames: usize,
    envelope: EnvelopeConfig,
    waveform: Waveform,
    constant_velocity: Option<u8>,
    velocity_curve: VelocityCurve,
    bend: f32,
    scratch: Scratch,
    stats: Arc<EngineStats>,
}

impl VoicePool {
    /// Allocate `config.polyphony` empty slots.
    pub fn new(config: &EngineConfig, stats: Arc<EngineStats>) -> Self {
        Self {
            slots: (0..config.polyphony.max(1)).map(|_| None).collect(),
            keymap: [None; 128],
            serial: 0,
            clock: 0,
            sample_rate: config.sample_rate,
            block_frames: config.block_frames,
            envelope: config.envelope,
            waveform: config.waveform,
            constant_velocity: config
                .constant_velocity
                .then_some(config.constant_velocity_value.min(127)),
            velocity_curve: config.velocity_curve,
            bend: 0.0,
            scratch: Scratch::default(),
            stats,
        }
    }

    pub fn polyphony(&self) -> usize {
        self.slots.len()
    }

    /// Bind a key range to a sample. Unmapped keys play the oscillator.
    pub fn map_sample(&mut self, keys: RangeInclusive<u8>, sample: SampleHandle, root_note: u8) {
        let zone = KeyZone {
            sample,
            root_note: root_note.min(127),
        };
        for key in keys.filter(|k| *k < 128) {
            self.keymap[key as usize] = Some(zone);
        }
    }

    pub fn unmap_sample(&mut self, sample: SampleHandle) {
        for entry in self.keymap.iter_mut() {
            if entry.is_some_and(|z| z.sample == sample) {
                *entry = None;
            }
        }
    }

    pub fn zone(&self, pitch: u8) -> Option<KeyZone> {
        self.keymap.get(pitch as usize).copied().flatten()
    }

    /// Envelope used by voices started from now on.
    pub fn set_envelope(&mut self, envelope: EnvelopeConfig) {
        self.envelope = envelope;
    }

    pub fn envelope(&self) -> &EnvelopeConfig {
        &self.envelope
    }

    /// Waveform used by oscillator voices started from now on.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Gain for an incoming velocity, honoring constant-velocity mode.
    pub fn velocity_gain(&self, velocity: u8) -> f32 {
        let v = self.constant_velocity.unwrap_or(velocity).min(127) as f32 / 127.0;
        match self.velocity_curve {
            VelocityCurve::Linear => v,
            VelocityCurve::Squared => v * v,
        }
    }

    /// Start a note, reusing the pitch's voice, a free slot, or a stolen one.
    ///
    /// Stealing takes the voice whose release began earliest; when nothing
    /// is releasing it takes the voice with the oldest note-on.
    pub fn allocate(&mut self, pitch: u8, velocity: u8) -> VoiceId {
        let pitch = pitch.min(127);
        let gain = self.velocity_gain(velocity);
        self.clock += 1;
        self.serial = self.serial.wrapping_add(1);

        let sounding = |s: &Option<Voice>| {
            s.as_ref()
                .is_some_and(|v| v.pitch() == pitch && !v.is_releasing())
        };
        if let Some(slot) = self.slots.iter().position(sounding) {
            let id = VoiceId::new(slot, self.serial);
            if let Some(voice) = self.slots[slot].as_mut() {
                voice.retrigger(id, gain, self.clock);
            }
            return id;
        }

        let slot = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.stats.record_steal();
                self.steal_candidate()
            }
        };
        let id = VoiceId::new(slot, self.serial);
        let source = match self.zone(pitch) {
            Some(zone) => VoiceSource::sample(zone.sample, zone.root_note),
            None => VoiceSource::oscillator(self.waveform),
        };
        let voice = Voice::new(
            id,
            pitch,
            gain,
            source,
            &self.envelope,
            self.sample_rate,
            self.clock,
        );
        self.slots[slot] = Some(voice);
        id
    }

    fn steal_candidate(&self) -> usize {
        let voices = || {
            self.slots
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
        };
        voices()
            .filter_map(|(i, v)| v.released_at().map(|at| (i, at)))
            .min_by_key(|&(_, at)| at)
            .or_else(|| {
                voices()
                    .map(|(i, v)| (i, v.started_at()))
                    .min_by_key(|&(_, at)| at)
            })
            .map_or(0, |(i, _)| i)
    }

    /// Move the sounding voice for `pitch` into its release phase.
    pub fn release(&mut self, pitch: u8) -> bool {
        self.clock += 1;
        let at = self.clock;
        let mut found = false;
        for voice in self.slots.iter_mut().flatten() {
            if voice.pitch() == pitch && !voice.is_releasing() {
                voice.release(at);
                found = true;
            }
        }
        found
    }

    /// Release every sounding voice.
    pub fn release_all(&mut self) {
        self.clock += 1;
        let at = self.clock;
        for voice in self.slots.iter_mut().flatten() {
            voice.release(at);
        }
    }

    /// Free every slot immediately, skipping release tails.
    pub fn kill_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Apply a continuous-controller sample.
    pub fn set_continuous(&mut self, axis: Axis, value: f32) {
        if !value.is_finite() {
            return;
        }
        match axis {
            Axis::ScratchRate => {
                if self.scratch.enabled {
                    self.scratch.rate = value.clamp(-MAX_SCRATCH_RATE, MAX_SCRATCH_RATE);
                }
            }
            Axis::ScratchAngle => {
                if let Some(last) = self.scratch.last_angle {
                    self.scratch.pending_degrees += wrap_degrees(value - last);
                    self.scratch.angle_seen = true;
                }
                self.scratch.last_angle = Some(value);
            }
            Axis::PitchBend => self.bend = value.clamp(-MAX_BEND, MAX_BEND),
        }
    }

    /// Turn scratch input on or off. Off resets playback to normal speed.
    pub fn set_scratch_enabled(&mut self, enabled: bool) {
        self.scratch = Scratch {
            enabled,
            ..Scratch::default()
        };
    }

    pub fn scratch_rate(&self) -> f32 {
        self.scratch.rate
    }

    pub fn bend(&self) -> f32 {
        self.bend
    }

    /// Fold angle samples gathered since the last block into a rate.
    ///
    /// A block with no angle movement keeps the previous rate, so a sensor
    /// that stops reporting leaves playback at its last speed.
    fn settle_scratch(&mut self) {
        if !self.scratch.angle_seen {
            return;
        }
        if self.scratch.enabled && self.sample_rate > 0 {
            let block_secs = self.block_frames as f32 / self.sample_rate as f32;
            let rate = self.scratch.pending_degrees / block_secs / REFERENCE_DEGREES_PER_SEC;
            self.scratch.rate = rate.clamp(-MAX_SCRATCH_RATE, MAX_SCRATCH_RATE);
        }
        self.scratch.pending_degrees = 0.0;
        self.scratch.angle_seen = false;
    }

    /// Mix every active voice into `left`/`right` and free finished ones.
    pub fn render_all(&mut self, samples: &SampleMemory, left: &mut [f32], right: &mut [f32]) {
        self.settle_scratch();
        let ctx = RenderContext {
            sample_rate: self.sample_rate,
            bend: self.bend,
            scratch_rate: self.scratch.rate,
        };
        for slot in &mut self.slots {
            if let Some(voice) = slot {
                voice.render(samples, &ctx, left, right);
                if voice.is_finished() {
                    *slot = None;
                }
            }
        }
    }

    /// Occupied slots, releasing voices included.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// The voice assigned under `id` still occupies its slot.
    pub fn is_rendering(&self, id: VoiceId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.slots.get(id.slot()).and_then(Option::as_ref).filter(|v| v.id() == id)
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().flatten()
    }
}

/// Fold an angle difference into -180..180 degrees.
fn wrap_degrees(delta: f32) -> f32 {
    let wrapped = libm::fmodf(delta + 180.0, 360.0);
    if wrapped < 0.0 {
        wrapped + 180.0
    } else {
        wrapped - 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_ir::{MemoryConfig, RawAudio};

    fn config(polyphony: usize) -> EngineConfig {
        EngineConfig {
            sample_rate: 1000,
            block_frames: 10,
            polyphony,
            envelope: EnvelopeConfig {
                attack_secs: 0.0,
                decay_secs: 0.0,
                sustain_level: 1.0,
                release_secs: 0.05,
            },
            ..EngineConfig::default()
        }
    }

    fn pool(polyphony: usize) -> VoicePool {
        VoicePool::new(&config(polyphony), Arc::new(EngineStats::new()))
    }

    fn render(pool: &mut VoicePool, mem: &SampleMemory) {
        let mut l = [0.0f32; 10];
        let mut r = [0.0f32; 10];
        pool.render_all(mem, &mut l, &mut r);
    }

    #[test]
    fn fifth_note_steals_oldest_when_none_releasing() {
        let mut pool = pool(4);
        let ids: Vec<VoiceId> = (60..64).map(|p| pool.allocate(p, 100)).collect();
        let stolen = pool.allocate(70, 100);
        assert_eq!(stolen.slot(), ids[0].slot());
        assert!(!pool.is_rendering(ids[0]));
        assert!(pool.is_rendering(ids[1]));
        assert_eq!(pool.active_count(), 4);
        assert_eq!(pool.stats.snapshot().voices_stolen, 1);
    }

    #[test]
    fn releasing_voice_is_stolen_first_regardless_of_age() {
        let mut pool = pool(4);
        let ids: Vec<VoiceId> = (60..64).map(|p| pool.allocate(p, 100)).collect();
        pool.release(62);
        let stolen = pool.allocate(70, 100);
        assert_eq!(stolen.slot(), ids[2].slot());
        assert!(pool.is_rendering(ids[0]));
    }

    #[test]
    fn oldest_release_wins_among_releasing() {
        let mut pool = pool(3);
        let ids: Vec<VoiceId> = (60..63).map(|p| pool.allocate(p, 100)).collect();
        pool.release(61);
        pool.release(60);
        let stolen = pool.allocate(70, 100);
        assert_eq!(stolen.slot(), ids[1].slot());
    }

    #[test]
    fn released_notes_reach_silence_and_free() {
        let mem = SampleMemory::new(&MemoryConfig::default());
        let mut pool = pool(8);
        let ids: Vec<VoiceId> = (60..68).map(|p| pool.allocate(p, 100)).collect();
        render(&mut pool, &mem);
        for p in 60..68 {
            assert!(pool.release(p));
        }
        // Still rendering the release tail
        render(&mut pool, &mem);
        assert_eq!(pool.active_count(), 8);
        for _ in 0..10 {
            render(&mut pool, &mem);
        }
        assert_eq!(pool.active_count(), 0);
        assert!(ids.iter().all(|id| !pool.is_rendering(*id)));
    }

    #[test]
    fn ids_are_unique_while_rendering() {
        let mut pool = pool(2);
        let mut seen = Vec::new();
        for p in 0..20u8 {
            let id = pool.allocate(p, 100);
            assert!(!seen.contains(&id));
            seen.push(id);
            let live: Vec<VoiceId> = pool.voices().map(|v| v.id()).collect();
            if let [a, b] = live[..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn retrigger_reuses_voice_with_fresh_id() {
        let mut pool = pool(4);
        let first = pool.allocate(60, 100);
        let second = pool.allocate(60, 50);
        assert_eq!(first.slot(), second.slot());
        assert_ne!(first, second);
        assert!(!pool.is_rendering(first));
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn constant_velocity_overrides_input() {
        let cfg = EngineConfig {
            constant_velocity: true,
            constant_velocity_value: 64,
            ..config(4)
        };
        let pool = VoicePool::new(&cfg, Arc::new(EngineStats::new()));
        assert_eq!(pool.velocity_gain(1), pool.velocity_gain(127));
        assert!((pool.velocity_gain(1) - 64.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn squared_curve_softens_low_velocities() {
        let cfg = EngineConfig {
            velocity_curve: VelocityCurve::Squared,
            ..config(4)
        };
        let pool = VoicePool::new(&cfg, Arc::new(EngineStats::new()));
        assert!(pool.velocity_gain(64) < 64.0 / 127.0);
        assert_eq!(pool.velocity_gain(127), 1.0);
    }

    #[test]
    fn keymap_selects_sample_source() {
        let mut mem = SampleMemory::new(&MemoryConfig::default());
        let pcm = [0i16; 16];
        let handle = mem.load(&RawAudio::mono("kick", &pcm, 1000)).unwrap();
        let mut pool = pool(4);
        pool.map_sample(36..=47, handle, 36);
        let id = pool.allocate(40, 100);
        let source = pool.get(id).unwrap().source();
        assert!(matches!(source, VoiceSource::Sample { root_note: 36, .. }));
        let id = pool.allocate(60, 100);
        assert!(matches!(pool.get(id).unwrap().source(), VoiceSource::Oscillator(_)));
        pool.unmap_sample(handle);
        assert_eq!(pool.zone(40), None);
    }

    #[test]
    fn angle_delta_becomes_rate() {
        let mem = SampleMemory::new(&MemoryConfig::default());
        let mut pool = pool(4);
        // One block is 10 ms; 2 degrees per block is 200 deg/s.
        pool.set_continuous(Axis::ScratchAngle, 359.0);
        pool.set_continuous(Axis::ScratchAngle, 1.0);
        render(&mut pool, &mem);
        assert!((pool.scratch_rate() - 1.0).abs() < 1e-3);
        pool.set_continuous(Axis::ScratchAngle, 0.0);
        render(&mut pool, &mem);
        assert!((pool.scratch_rate() + 0.5).abs() < 1e-3);
    }

    #[test]
    fn first_angle_sample_only_sets_reference() {
        let mem = SampleMemory::new(&MemoryConfig::default());
        let mut pool = pool(4);
        pool.set_continuous(Axis::ScratchRate, -2.0);
        pool.set_continuous(Axis::ScratchAngle, 90.0);
        render(&mut pool, &mem);
        assert_eq!(pool.scratch_rate(), -2.0);

        pool.set_continuous(Axis::ScratchAngle, 94.0);
        render(&mut pool, &mem);
        assert!((pool.scratch_rate() - 2.0).abs() < 1e-3);
        // No samples this block: the last rate holds.
        render(&mut pool, &mem);
        assert!((pool.scratch_rate() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn zero_sustain_voice_frees_after_decay_without_note_off() {
        let cfg = EngineConfig {
            envelope: EnvelopeConfig {
                attack_secs: 0.0,
                decay_secs: 0.02,
                sustain_level: 0.0,
                release_secs: 0.5,
            },
            ..config(4)
        };
        let mem = SampleMemory::new(&MemoryConfig::default());
        let mut pool = VoicePool::new(&cfg, Arc::new(EngineStats::new()));
        let id = pool.allocate(60, 100);
        render(&mut pool, &mem);
        assert!(pool.is_rendering(id));
        render(&mut pool, &mem);
        render(&mut pool, &mem);
        assert!(!pool.is_rendering(id));
        assert_eq!(pool.active_count(), 0);
        assert!(!pool.release(60));
    }

    #[test]
    fn scratch_off_restores_normal_speed() {
        let mut pool = pool(4);
        pool.set_continuous(Axis::ScratchRate, -2.0);
        assert_eq!(pool.scratch_rate(), -2.0);
        pool.set_scratch_enabled(false);
        assert_eq!(pool.scratch_rate(), 1.0);
        pool.set_continuous(Axis::ScratchRate, 3.0);
        assert_eq!(pool.scratch_rate(), 1.0);
    }

    #[test]
    fn bend_is_clamped() {
        let mut pool = pool(4);
        pool.set_continuous(Axis::PitchBend, 100.0);
        assert_eq!(pool.bend(), MAX_BEND);
    }

    #[test]
    fn wrap_degrees_takes_short_way() {
        assert!((wrap_degrees(350.0) + 10.0).abs() < 1e-4);
        assert!((wrap_degrees(-350.0) - 10.0).abs() < 1e-4);
        assert!((wrap_degrees(5.0) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn kill_all_frees_everything() {
        let mut pool = pool(4);
        pool.allocate(60, 100);
        pool.allocate(61, 100);
        pool.kill_all();
        assert_eq!(pool.active_count(), 0);
    }
}
