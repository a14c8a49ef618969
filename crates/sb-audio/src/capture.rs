//! Sinks without a device: in-memory capture and a discard sink.

use sb_engine::{AudioBlock, Frame};

use crate::traits::{AudioError, AudioOutput};

/// Keeps every frame it is given, for offline renders and tests.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    sample_rate: u32,
    frames: Vec<Frame>,
    blocks: u64,
    running: bool,
}

impl CaptureOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, ..Self::default() }
    }

    /// Pre-size for `frames` frames so capture does not reallocate.
    pub fn with_capacity(sample_rate: u32, frames: usize) -> Self {
        Self { sample_rate, frames: Vec::with_capacity(frames), ..Self::default() }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl AudioOutput for CaptureOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write_block(&mut self, block: &AudioBlock) -> Result<(), AudioError> {
        self.frames.extend_from_slice(block.frames());
        self.blocks += 1;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running = false;
        Ok(())
    }
}

/// Drops everything; for boards with no output wired up and for timing runs.
#[derive(Debug)]
pub struct NullOutput {
    sample_rate: u32,
    blocks: u64,
}

impl NullOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, blocks: 0 }
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks
    }
}

impl AudioOutput for NullOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write_block(&mut self, _block: &AudioBlock) -> Result<(), AudioError> {
        self.blocks += 1;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_keeps_frames_in_order() {
        let mut out = CaptureOutput::new(44_100);
        out.start().unwrap();
        out.write_block(&AudioBlock::silent(0, 4)).unwrap();
        out.write_block(&AudioBlock::silent(1, 4)).unwrap();
        assert_eq!(out.frames().len(), 8);
        assert_eq!(out.blocks_written(), 2);
        assert!(out.is_running());
    }

    #[test]
    fn null_counts_blocks() {
        let mut out = NullOutput::new(48_000);
        out.write_block(&AudioBlock::silent(0, 64)).unwrap();
        assert_eq!(out.blocks_written(), 1);
        assert_eq!(out.sample_rate(), 48_000);
    }
}
