//! Sample asset metadata.

use arrayvec::ArrayString;

slotmap::new_key_type! {
    /// Key for referencing assets held by the sample memory manager.
    pub struct SampleHandle;
}

/// Fixed-capacity asset name.
pub type SampleName = ArrayString<26>;

/// Keep as much of `name` as fits, cutting on a char boundary.
pub fn sample_name(name: &str) -> SampleName {
    let mut out = SampleName::new();
    for ch in name.chars() {
        if out.try_push(ch).is_err() {
            break;
        }
    }
    out
}

/// Which memory pool backs an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryTier {
    /// Small, fast on-chip memory.
    Fast,
    /// Large, slow external memory.
    Bulk,
}

/// Sample loop type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    /// Play once and stop at the end.
    #[default]
    None,
    /// Wrap from `loop_end` back to `loop_start`.
    Forward,
}

/// Immutable description of a loaded asset.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleInfo {
    pub name: SampleName,
    pub tier: MemoryTier,
    /// Length in frames.
    pub frames: usize,
    pub channels: u16,
    pub sample_rate: u32,
    pub loop_type: LoopType,
    pub loop_start: usize,
    pub loop_end: usize,
}

impl SampleInfo {
    /// Bytes occupied by the 16-bit PCM data.
    pub fn byte_len(&self) -> usize {
        self.frames * self.channels as usize * 2
    }

    pub fn has_loop(&self) -> bool {
        self.loop_type != LoopType::None && self.loop_end > self.loop_start
    }
}

/// Borrowed PCM data handed to the sample memory manager for loading.
///
/// `pcm` is interleaved when `channels` is 2.
#[derive(Clone, Copy, Debug)]
pub struct RawAudio<'a> {
    pub name: &'a str,
    pub pcm: &'a [i16],
    pub channels: u16,
    pub sample_rate: u32,
    pub loop_type: LoopType,
    pub loop_start: usize,
    pub loop_end: usize,
}

impl<'a> RawAudio<'a> {
    /// One-shot mono audio.
    pub fn mono(name: &'a str, pcm: &'a [i16], sample_rate: u32) -> Self {
        Self {
            name,
            pcm,
            channels: 1,
            sample_rate,
            loop_type: LoopType::None,
            loop_start: 0,
            loop_end: 0,
        }
    }

    /// Same audio, looping over `start..end` frames.
    pub fn looped(mut self, start: usize, end: usize) -> Self {
        self.loop_type = LoopType::Forward;
        self.loop_start = start;
        self.loop_end = end;
        self
    }

    /// Length in frames.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.pcm.len() / self.channels as usize
    }
}
