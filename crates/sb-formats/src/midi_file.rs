//! Standard MIDI File import.
//!
//! All tracks are merged onto one timeline and converted from ticks to
//! output frames through the file's tempo map, giving a script the host can
//! replay as if the events came from the serial input.

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use sb_ir::{Axis, Event, ScheduledEvent};

use crate::FormatError;

/// Tempo assumed until the first tempo meta event (120 bpm).
const DEFAULT_TEMPO_US: u64 = 500_000;

/// How SMF messages map onto engine events.
#[derive(Clone, Copy, Debug)]
pub struct SmfOptions {
    pub sample_rate: u32,
    /// Only keep this channel (0-15); `None` keeps all.
    pub channel: Option<u8>,
    /// Semitones at full pitch-wheel deflection.
    pub bend_range: f32,
}

impl SmfOptions {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, channel: None, bend_range: 2.0 }
    }
}

/// Parse an SMF and return its events in frame order.
pub fn load_smf(data: &[u8], options: &SmfOptions) -> Result<Vec<ScheduledEvent>, FormatError> {
    let smf = Smf::parse(data)?;

    // (absolute tick, track, event) so equal ticks keep file order
    let mut timeline = Vec::new();
    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            timeline.push((tick, track_index, event.kind));
        }
    }
    timeline.sort_by_key(|&(tick, track, _)| (tick, track));

    let mut clock = TickClock::new(smf.header.timing);
    let mut events = Vec::new();
    for (tick, _, kind) in timeline {
        let micros = clock.advance_to(tick);
        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                clock.set_tempo(tempo.as_int() as u64)
            }
            TrackEventKind::Midi { channel, message } => {
                if options.channel.is_some_and(|c| c != channel.as_int()) {
                    continue;
                }
                if let Some(event) = convert(message, options) {
                    let at = micros * options.sample_rate as u64 / 1_000_000;
                    events.push(ScheduledEvent::new(at, event));
                }
            }
            _ => {}
        }
    }
    tracing::debug!(events = events.len(), tracks = smf.tracks.len(), "imported MIDI file");
    Ok(events)
}

fn convert(message: MidiMessage, options: &SmfOptions) -> Option<Event> {
    let event = match message {
        MidiMessage::NoteOn { key, vel } => Event::NoteOn {
            pitch: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOff { key, .. } => Event::NoteOff { pitch: key.as_int() },
        MidiMessage::Controller { controller, value } => {
            Event::ControlChange {
                param: controller.as_int(),
                value: value.as_int(),
            }
        }
        MidiMessage::PitchBend { bend } => {
            Event::ContinuousInput {
                axis: Axis::PitchBend,
                value: bend.as_f32() * options.bend_range,
            }
        }
        _ => return None,
    };
    Some(event)
}

/// Converts absolute ticks to microseconds across tempo changes.
struct TickClock {
    timing: Timing,
    tempo_us: u64,
    last_tick: u64,
    /// Elapsed microseconds at `last_tick`.
    micros: u64,
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        Self { timing, tempo_us: DEFAULT_TEMPO_US, last_tick: 0, micros: 0 }
    }

    fn set_tempo(&mut self, tempo_us: u64) {
        self.tempo_us = tempo_us.max(1);
    }

    fn advance_to(&mut self, tick: u64) -> u64 {
        let delta = tick.saturating_sub(self.last_tick);
        self.micros += match self.timing {
            Timing::Metrical(per_beat) => delta * self.tempo_us / (per_beat.as_int().max(1) as u64),
            Timing::Timecode(fps, subframes) => {
                let per_second = (fps.as_f32() * subframes as f32).max(1.0) as u64;
                delta * 1_000_000 / per_second
            }
        };
        self.last_tick = tick;
        self.micros
    }
}
