//! Block-by-block render driver.
//!
//! `render_next_block` is called once per quantum (`block_frames /
//! sample_rate` seconds) by the output transport. It applies the events
//! due for the block, renders every voice into a zeroed mix, runs the
//! delay, applies master gain and converts to output frames. It never
//! allocates, blocks, or fails: bad events and missing samples are
//! counted or rendered as silence.

use alloc::sync::Arc;
use core::ops::RangeInclusive;

use sb_ir::{
    AudioBuffer, ConfigError, ControlParam, EngineConfig, Event, EventSource, SampleHandle,
    Waveform,
};

use crate::block::AudioBlock;
use crate::delay::{DelayLine, MAX_FEEDBACK};
use crate::event_router::{EventPoster, EventRouter};
use crate::sample_memory::SampleMemory;
use crate::stats::EngineStats;
use crate::voice_pool::VoicePool;

/// Longest envelope time reachable from a controller, in seconds.
pub const MAX_CONTROL_ENVELOPE_SECS: f32 = 2.0;

/// Owns every piece of engine state touched by the render context.
pub struct RenderScheduler {
    block_frames: usize,
    block_index: u64,
    master_gain: f32,
    mix: AudioBuffer,
    router: EventRouter,
    voices: VoicePool,
    samples: SampleMemory,
    delay: DelayLine,
    stats: Arc<EngineStats>,
}

impl RenderScheduler {
    /// Size every buffer from `config`. Rejects configurations the engine
    /// cannot render with.
    pub fn new(config: &EngineConfig, samples: SampleMemory) -> Result<Self, ConfigError> {
        config.validate()?;
        let stats = Arc::new(EngineStats::new());
        tracing::debug!(
            sample_rate = config.sample_rate,
            block_frames = config.block_frames,
            polyphony = config.polyphony,
            delay_capacity = config.delay_capacity(),
            "render scheduler created"
        );
        Ok(Self {
            block_frames: config.block_frames,
            block_index: 0,
            master_gain: config.master_gain,
            mix: AudioBuffer::new(config.block_frames),
            router: EventRouter::new(config.block_frames, Arc::clone(&stats)),
            voices: VoicePool::new(config, Arc::clone(&stats)),
            samples,
            delay: DelayLine::new(config.delay_capacity(), &config.delay, config.initial_delay()),
            stats,
        })
    }

    /// Open the event queue for one input source.
    pub fn connect(&mut self, source: EventSource) -> EventPoster {
        self.router.connect(source)
    }

    /// Render and return the next block.
    pub fn render_next_block(&mut self) -> AudioBlock {
        let index = self.block_index;
        for timed in self.router.drain_up_to(index) {
            self.apply_event(timed.event);
        }

        self.mix.silence();
        let (left, right) = self.mix.stereo_mut();
        self.voices.render_all(&self.samples, left, right);
        self.delay.process(&mut self.mix);
        self.mix.apply_gain(self.master_gain);

        let block = AudioBlock::from_mix(index, &self.mix);
        self.block_index += 1;
        self.stats.record_block(self.voices.active_count());
        block
    }

    /// Apply one event immediately, bypassing the router.
    pub fn apply_event(&mut self, event: Event) {
        if event.validate().is_err() {
            self.stats.record_malformed();
            return;
        }
        match event {
            Event::NoteOn { pitch, velocity: 0 } | Event::NoteOff { pitch } => {
                self.voices.release(pitch);
            }
            Event::NoteOn { pitch, velocity } => {
                self.voices.allocate(pitch, velocity);
            }
            Event::ControlChange { param, value } => {
                if let Some(param) = ControlParam::from_cc(param) {
                    self.apply_control(param, value);
                }
            }
            Event::ContinuousInput { axis, value } => self.voices.set_continuous(axis, value),
        }
        self.stats.record_applied(event.kind());
    }

    fn apply_control(&mut self, param: ControlParam, value: u8) {
        let unit = value as f32 / 127.0;
        let seconds = unit * unit * MAX_CONTROL_ENVELOPE_SECS;
        let mut envelope = *self.voices.envelope();
        match param {
            ControlParam::MasterVolume => self.master_gain = unit,
            ControlParam::DelayFeedback => self.delay.set_feedback(unit * MAX_FEEDBACK),
            ControlParam::DelayMix => {
                let (dry, _) = self.delay.mix();
                self.delay.set_mix(dry, unit);
            }
            ControlParam::DelayLength => {
                let frames = self.delay.capacity() * value as usize / 127;
                self.delay.set_delay(frames);
            }
            ControlParam::ScratchOff => self.voices.set_scratch_enabled(value < 64),
            ControlParam::Waveform => self.voices.set_waveform(Waveform::from_control(value)),
            ControlParam::Attack => {
                envelope.attack_secs = seconds;
                self.voices.set_envelope(envelope);
            }
            ControlParam::Decay => {
                envelope.decay_secs = seconds;
                self.voices.set_envelope(envelope);
            }
            ControlParam::Sustain => {
                envelope.sustain_level = unit;
                self.voices.set_envelope(envelope);
            }
            ControlParam::Release => {
                envelope.release_secs = seconds;
                self.voices.set_envelope(envelope);
            }
            ControlParam::AllSoundOff => self.voices.kill_all(),
            ControlParam::AllNotesOff => self.voices.release_all(),
        }
    }

    /// Bind keys to a loaded sample.
    pub fn map_sample(&mut self, keys: RangeInclusive<u8>, sample: SampleHandle, root_note: u8) {
        self.voices.map_sample(keys, sample, root_note);
    }

    /// Drop a sample from the keymap and free its memory. Voices already
    /// playing it go silent.
    pub fn unload_sample(&mut self, sample: SampleHandle) -> bool {
        self.voices.unmap_sample(sample);
        self.samples.unload(sample)
    }

    pub fn samples(&self) -> &SampleMemory {
        &self.samples
    }

    /// Loading allocates; do it outside the render context.
    pub fn samples_mut(&mut self) -> &mut SampleMemory {
        &mut self.samples
    }

    pub fn voices(&self) -> &VoicePool {
        &self.voices
    }

    pub fn delay(&self) -> &DelayLine {
        &self.delay
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Index of the block the next call will render.
    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    /// Events still waiting in the source queues.
    pub fn pending_events(&self) -> usize {
        self.router.pending()
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_ir::{Axis, EnvelopeConfig, EventKind, MemoryConfig, RawAudio};

    fn scheduler(config: &EngineConfig) -> RenderScheduler {
        RenderScheduler::new(config, SampleMemory::new(&config.memory)).unwrap()
    }

    fn quick_config() -> EngineConfig {
        EngineConfig {
            envelope: EnvelopeConfig {
                attack_secs: 0.0,
                decay_secs: 0.0,
                sustain_level: 1.0,
                release_secs: 0.001,
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn idle_render_is_silent_for_any_block_size() {
        for n in [1, 16, 64, 100, 256] {
            let config = EngineConfig { block_frames: n, ..EngineConfig::default() };
            let mut sched = scheduler(&config);
            for i in 0..4 {
                let block = sched.render_next_block();
                assert_eq!(block.len(), n);
                assert_eq!(block.index(), i);
                assert!(block.is_silent());
            }
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig { block_frames: 0, ..EngineConfig::default() };
        let memory = SampleMemory::new(&config.memory);
        assert!(matches!(RenderScheduler::new(&config, memory), Err(ConfigError::BlockFrames(0))));
    }

    #[test]
    fn note_on_produces_sound_then_release_frees() {
        let mut sched = scheduler(&quick_config());
        let mut serial = sched.connect(EventSource::Serial);
        serial.post(Event::NoteOn { pitch: 60, velocity: 127 }, 0);
        assert!(!sched.render_next_block().is_silent());
        assert_eq!(sched.voices().active_count(), 1);
        serial.post(Event::NoteOn { pitch: 60, velocity: 0 }, 64);
        for _ in 0..4 {
            sched.render_next_block();
        }
        assert_eq!(sched.voices().active_count(), 0);
        assert_eq!(sched.stats().snapshot().last_event, EventKind::NoteOn);
    }

    #[test]
    fn events_wait_for_their_block() {
        let mut sched = scheduler(&quick_config());
        let mut serial = sched.connect(EventSource::Serial);
        serial.post(Event::NoteOn { pitch: 60, velocity: 100 }, 200);
        sched.render_next_block();
        sched.render_next_block();
        assert_eq!(sched.voices().active_count(), 0);
        sched.render_next_block();
        sched.render_next_block();
        assert_eq!(sched.voices().active_count(), 1);
    }

    #[test]
    fn malformed_events_are_counted_not_fatal() {
        let mut sched = scheduler(&quick_config());
        let mut usb = sched.connect(EventSource::Usb);
        usb.post(Event::NoteOn { pitch: 200, velocity: 10 }, 0);
        usb.post(Event::ControlChange { param: 7, value: 255 }, 0);
        usb.post(Event::ContinuousInput { axis: Axis::ScratchRate, value: f32::NAN }, 0);
        let block = sched.render_next_block();
        assert_eq!(block.len(), 64);
        let snap = sched.stats().snapshot();
        assert_eq!(snap.events_malformed, 3);
        assert_eq!(snap.events_applied, 0);
    }

    #[test]
    fn missing_sample_renders_silence() {
        let config = quick_config();
        let mut sched = scheduler(&config);
        let pcm = [8000i16; 4096];
        let handle = sched.samples_mut().load(&RawAudio::mono("pad", &pcm, 44_100)).unwrap();
        sched.map_sample(0..=127, handle, 60);
        sched.samples_mut().unload(handle);
        sched.apply_event(Event::NoteOn { pitch: 60, velocity: 127 });
        let block = sched.render_next_block();
        assert!(block.is_silent());
        assert_eq!(sched.voices().active_count(), 1);
    }

    #[test]
    fn mapped_sample_plays() {
        let config = EngineConfig {
            memory: MemoryConfig {
                bulk_bytes: None,
                ..MemoryConfig::default()
            },
            ..quick_config()
        };
        let mut sched = scheduler(&config);
        let pcm = [8000i16; 4096];
        let handle = sched.samples_mut().load(&RawAudio::mono("pad", &pcm, 44_100)).unwrap();
        sched.map_sample(60..=60, handle, 60);
        sched.apply_event(Event::NoteOn { pitch: 60, velocity: 127 });
        let block = sched.render_next_block();
        // 8000/32768 at master gain 0.5
        let expected = (8000.0 / 32768.0 * 0.5 * 32767.0) as i16;
        assert!((block.frames()[10].left - expected).abs() <= 2);
        assert!(sched.unload_sample(handle));
        assert!(sched.voices().zone(60).is_none());
    }

    #[test]
    fn control_changes_reach_their_targets() {
        let mut sched = scheduler(&quick_config());
        sched.apply_event(Event::ControlChange { param: 7, value: 127 });
        assert_eq!(sched.master_gain(), 1.0);
        sched.apply_event(Event::ControlChange { param: 14, value: 127 });
        assert_eq!(sched.delay().delay(), sched.delay().capacity());
        sched.apply_event(Event::ControlChange { param: 14, value: 0 });
        assert_eq!(sched.delay().delay(), 1);
        sched.apply_event(Event::ControlChange { param: 13, value: 0 });
        assert_eq!(sched.delay().mix().1, 0.0);
        sched.apply_event(Event::ControlChange { param: 79, value: 0 });
        assert_eq!(sched.voices().envelope().sustain_level, 0.0);
        // Unknown controllers are ignored
        sched.apply_event(Event::ControlChange { param: 1, value: 64 });
        assert_eq!(sched.stats().snapshot().events_applied, 6);
    }

    #[test]
    fn all_sound_off_frees_immediately() {
        let mut sched = scheduler(&EngineConfig::default());
        for pitch in 60..64 {
            sched.apply_event(Event::NoteOn { pitch, velocity: 90 });
        }
        sched.render_next_block();
        sched.apply_event(Event::ControlChange { param: 123, value: 0 });
        assert_eq!(sched.voices().active_count(), 4);
        sched.apply_event(Event::ControlChange { param: 120, value: 0 });
        assert_eq!(sched.voices().active_count(), 0);
    }

    #[test]
    fn delay_tail_outlives_the_note() {
        let config = EngineConfig {
            delay: sb_ir::DelayConfig {
                delay_frames: Some(128),
                ..Default::default()
            },
            ..quick_config()
        };
        let mut sched = scheduler(&config);
        sched.apply_event(Event::NoteOn { pitch: 69, velocity: 127 });
        sched.render_next_block();
        sched.apply_event(Event::ControlChange { param: 120, value: 0 });
        // The first block comes back out of the delay two blocks later
        sched.render_next_block();
        assert!(!sched.render_next_block().is_silent());
    }
}
