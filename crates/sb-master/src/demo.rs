//! Built-in input scripts for running without a keyboard or MIDI file.

use sb_audio::ScriptedInput;
use sb_ir::{Axis, EngineConfig, Event, EventSource, ScheduledEvent};

/// Notes of the demo arpeggio.
const ARPEGGIO: [u8; 8] = [48, 55, 60, 64, 67, 72, 67, 64];

/// Two bars of arpeggio on the serial source, 8th notes at 120 bpm, with a
/// delay feedback sweep in the second bar.
pub fn demo_serial(config: &EngineConfig) -> ScriptedInput {
    let step = config.sample_rate as u64 / 4;
    let gate = step * 3 / 4;
    let mut events = Vec::new();
    for (i, &pitch) in ARPEGGIO.iter().chain(ARPEGGIO.iter()).enumerate() {
        let at = i as u64 * step;
        let velocity = 96 + (i % 4) as u8 * 8;
        events.push(ScheduledEvent::new(at, Event::NoteOn { pitch, velocity }));
        events.push(ScheduledEvent::new(at + gate, Event::NoteOff { pitch }));
    }
    let bar = step * ARPEGGIO.len() as u64;
    for k in 0..8u64 {
        let value = 40 + k as u8 * 10;
        events.push(ScheduledEvent::new(bar + k * step, Event::ControlChange { param: 12, value }));
    }
    ScriptedInput::new(EventSource::Serial, events)
}

/// A rotary-sensor gesture: half a turn back and forth every quarter
/// second during the second bar.
pub fn demo_sensor(config: &EngineConfig) -> ScriptedInput {
    let block = config.block_frames.max(1) as u64;
    let start = config.sample_rate as u64 * 2;
    let blocks_per_swing = (config.sample_rate as u64 / 4 / block).max(1);
    let mut events = Vec::new();
    let mut angle = 0.0f32;
    for swing in 0..8u64 {
        let direction = if swing % 2 == 0 { 1.0 } else { -1.0 };
        for b in 0..blocks_per_swing {
            angle += direction * 180.0 / blocks_per_swing as f32;
            let at = start + (swing * blocks_per_swing + b) * block;
            let event = Event::ContinuousInput {
                axis: Axis::ScratchAngle,
                value: angle,
            };
            events.push(ScheduledEvent::new(at, event));
        }
    }
    let end = start + 8 * blocks_per_swing * block;
    let release = Event::ContinuousInput {
        axis: Axis::ScratchRate,
        value: 1.0,
    };
    events.push(ScheduledEvent::new(end, release));
    ScriptedInput::new(EventSource::Sensor, events)
}
