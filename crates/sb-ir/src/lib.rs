//! Core types for the scratchbox runtime.
//!
//! This crate defines the vocabulary shared by the engine, the I/O
//! variants and the host: the startup configuration, the event model
//! delivered by input sources, sample metadata and the planar mix buffer.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod audio_buffer;
mod config;
mod control;
mod event;
mod sample;

pub use audio_buffer::AudioBuffer;
pub use config::{
    ConfigError, DelayConfig, EngineConfig, EnvelopeConfig, MemoryConfig, TierPolicy,
    VelocityCurve, Waveform, DEFAULT_BLOCK_FRAMES, DEFAULT_SAMPLE_RATE, MAX_BLOCK_FRAMES,
    MAX_POLYPHONY,
};
pub use control::ControlParam;
pub use event::{Axis, Event, EventKind, EventSource, MalformedEvent, ScheduledEvent, TimedEvent};
pub use sample::{sample_name, LoopType, MemoryTier, RawAudio, SampleHandle, SampleInfo, SampleName};
