//! Output sink and input source traits, and their error type.

use sb_engine::{AudioBlock, EventPoster};
use sb_ir::EventSource;
use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("no audio device available")]
    NoDevice,
}

/// Accepts rendered blocks.
pub trait AudioOutput {
    /// Rate the sink plays at.
    fn sample_rate(&self) -> u32;

    /// Hand over one block. Sinks backed by a device clock may wait for
    /// room, which is what paces the render loop.
    fn write_block(&mut self, block: &AudioBlock) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Delivers decoded events into the router.
pub trait EventInput {
    fn source(&self) -> EventSource;

    /// Post every event due at or before output frame `now`. Returns how
    /// many were posted.
    fn poll(&mut self, now: u64, poster: &mut EventPoster) -> usize;

    /// No further events will ever be produced.
    fn is_finished(&self) -> bool;
}
