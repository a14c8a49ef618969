//! Real-time render core for the scratchbox instrument.
//!
//! Events from independent input sources are merged by the event router,
//! applied by the render scheduler at block boundaries, rendered by the
//! voice pool from oscillators or tiered sample memory, and passed through
//! a feedback delay before leaving as 16-bit stereo blocks.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod block;
mod delay;
mod envelope_state;
mod event_router;
mod frame;
mod frequency;
mod oscillator;
mod sample_memory;
pub mod scheduler;
mod stats;
mod voice;
mod voice_pool;

pub use block::AudioBlock;
pub use delay::{DelayLine, MAX_FEEDBACK};
pub use envelope_state::{EnvelopeStage, EnvelopeState};
pub use event_router::{
    DrainedEvents, EventPoster, EventRouter, MAX_EVENTS_PER_BLOCK, QUEUE_CAPACITY,
};
pub use frame::Frame;
pub use frequency::{pitch_to_hz, semitone_ratio};
pub use oscillator::Oscillator;
pub use sample_memory::{LoadError, MemoryUsage, SampleMemory, SampleView};
pub use scheduler::RenderScheduler;
pub use stats::{EngineStats, StatsSnapshot};
pub use voice::{RenderContext, Voice, VoiceId, VoiceSource};
pub use voice_pool::{KeyZone, VoicePool};
