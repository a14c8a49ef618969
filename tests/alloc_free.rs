//! Allocation-free render path tests.
//!
//! These tests verify that `RenderScheduler::render_next_block()` does not
//! allocate. Setup (sample loading, queue creation) happens first; only
//! the render calls run under the allocation guard, with events flowing
//! through the queues, voices being stolen and the delay wrapping.
//!
//! Runs under plain `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use sb_engine::{RenderScheduler, SampleMemory};
use sb_ir::{Axis, EngineConfig, Event, EventSource, RawAudio};

fn scheduler(config: &EngineConfig) -> RenderScheduler {
    RenderScheduler::new(config, SampleMemory::new(&config.memory)).unwrap()
}

fn ramp(frames: usize) -> Vec<i16> {
    (0..frames).map(|i| ((i % 400) as i16 - 200) * 100).collect()
}

/// Render `blocks` blocks, aborting on any heap allocation.
fn assert_render_alloc_free(sched: &mut RenderScheduler, blocks: usize) {
    assert_no_alloc(|| {
        for _ in 0..blocks {
            sched.render_next_block();
        }
    });
}

#[test]
fn oscillator_voices_with_delay_alloc_free() {
    let config = EngineConfig::default();
    let mut sched = scheduler(&config);
    let mut serial = sched.connect(EventSource::Serial);
    for (i, pitch) in (48u8..60).enumerate() {
        let at = i as u64 * 500;
        serial.post(Event::NoteOn { pitch, velocity: 100 }, at);
        serial.post(Event::NoteOff { pitch }, at + 2_000);
    }
    serial.post(Event::ControlChange { param: 12, value: 120 }, 3_000);
    serial.post(Event::ControlChange { param: 14, value: 30 }, 4_000);
    // Several seconds so the delay ring wraps many times.
    assert_render_alloc_free(&mut sched, 44_100 * 3 / 64);
    assert!(sched.stats().snapshot().voices_stolen > 0);
}

#[test]
fn scratched_samples_alloc_free() {
    let config = EngineConfig { polyphony: 4, ..EngineConfig::default() };
    let mut sched = scheduler(&config);
    let one_shot = ramp(3_000);
    let looped = ramp(8_000);
    let hit = sched.samples_mut().load(&RawAudio::mono("hit", &one_shot, 22_050)).unwrap();
    let pad_raw = RawAudio::mono("pad", &looped, 44_100).looped(1_000, 7_000);
    let pad = sched.samples_mut().load(&pad_raw).unwrap();
    sched.map_sample(36..=47, hit, 36);
    sched.map_sample(48..=72, pad, 60);

    let mut serial = sched.connect(EventSource::Serial);
    let mut sensor = sched.connect(EventSource::Sensor);
    for pitch in [36u8, 60, 64, 40, 67] {
        serial.post(Event::NoteOn { pitch, velocity: 90 }, 0);
    }
    for k in 0..200u64 {
        let angle = if (k / 20) % 2 == 0 { k as f32 * 9.0 } else { -(k as f32) * 9.0 };
        sensor.post(Event::ContinuousInput { axis: Axis::ScratchAngle, value: angle }, k * 64);
    }
    serial.post(Event::ContinuousInput { axis: Axis::PitchBend, value: -3.5 }, 6_400);
    serial.post(Event::ControlChange { param: 123, value: 0 }, 12_800);
    assert_render_alloc_free(&mut sched, 300);
}

#[test]
fn malformed_and_unknown_events_alloc_free() {
    let config = EngineConfig::default();
    let mut sched = scheduler(&config);
    let mut usb = sched.connect(EventSource::Usb);
    usb.post(Event::NoteOn { pitch: 200, velocity: 10 }, 0);
    usb.post(Event::ControlChange { param: 99, value: 5 }, 0);
    usb.post(Event::ControlChange { param: 7, value: 255 }, 0);
    usb.post(Event::NoteOn { pitch: 60, velocity: 0 }, 64);
    assert_render_alloc_free(&mut sched, 10);
    assert_eq!(sched.stats().snapshot().events_malformed, 2);
}
