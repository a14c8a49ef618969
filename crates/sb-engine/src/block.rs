//! The unit handed from the render scheduler to the output transport.

use heapless::Vec;
use sb_ir::{AudioBuffer, MAX_BLOCK_FRAMES};

use crate::frame::Frame;

/// One rendered block of output frames.
///
/// Stored inline so producing a block never allocates. There is no mutable
/// access to the frames once the block exists.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    index: u64,
    frames: Vec<Frame, MAX_BLOCK_FRAMES>,
}

impl AudioBlock {
    /// A block of `len` silent frames (clamped to `MAX_BLOCK_FRAMES`).
    pub fn silent(index: u64, len: usize) -> Self {
        let mut frames = Vec::new();
        for _ in 0..len.min(MAX_BLOCK_FRAMES) {
            let _ = frames.push(Frame::silence());
        }
        Self { index, frames }
    }

    /// Clip and convert a mix buffer to output frames.
    pub(crate) fn from_mix(index: u64, mix: &AudioBuffer) -> Self {
        let mut frames = Vec::new();
        for (&l, &r) in mix.channel(0).iter().zip(mix.channel(1)) {
            if frames.push(Frame::from_f32(l, r)).is_err() {
                break;
            }
        }
        Self { index, frames }
    }

    /// Position of this block in the output stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.frames.iter().all(Frame::is_silent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_block_has_requested_length() {
        let block = AudioBlock::silent(3, 64);
        assert_eq!(block.len(), 64);
        assert_eq!(block.index(), 3);
        assert!(block.is_silent());
    }

    #[test]
    fn silent_block_is_capped() {
        assert_eq!(AudioBlock::silent(0, 10_000).len(), MAX_BLOCK_FRAMES);
    }

    #[test]
    fn from_mix_converts_both_channels() {
        let mut mix = AudioBuffer::new(2);
        {
            let (l, r) = mix.stereo_mut();
            l[0] = 1.0;
            r[1] = -1.0;
        }
        let block = AudioBlock::from_mix(0, &mix);
        assert_eq!(block.frames()[0], Frame { left: 32767, right: 0 });
        assert_eq!(block.frames()[1], Frame { left: 0, right: -32767 });
    }
}
