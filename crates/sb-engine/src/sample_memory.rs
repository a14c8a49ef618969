//! Tiered sample storage.
//!
//! Two arenas are allocated once from the configuration: an optional large
//! "bulk" pool (external RAM on boards that have it) and a small "fast"
//! pool. Assets are carved out of the arenas with a first-fit free list,
//! are immutable once loaded, and are addressed by generational handles so
//! a voice holding a stale handle reads nothing rather than someone else's
//! audio.

use alloc::vec;
use alloc::vec::Vec;

use sb_ir::{
    sample_name, LoopType, MemoryConfig, MemoryTier, RawAudio, SampleHandle, SampleInfo,
    TierPolicy,
};
use slotmap::SlotMap;
use thiserror::Error;

use crate::frame::Frame;
use crate::frequency::CURSOR_FRAC_BITS;

/// Why an asset could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no memory pool can hold {requested_bytes} bytes")]
    OutOfMemory { requested_bytes: usize },
    #[error("sample has no frames")]
    Empty,
    #[error("{0} channels not supported (mono or stereo only)")]
    UnsupportedChannels(u16),
    #[error("loop {start}..{end} does not fit in {frames} frames")]
    InvalidLoop { start: usize, end: usize, frames: usize },
}

/// Pool occupancy, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub fast_used: usize,
    pub fast_capacity: usize,
    pub bulk_used: usize,
    pub bulk_capacity: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Span {
    offset: usize,
    len: usize,
}

/// One fixed arena of 16-bit words with a sorted free list.
struct Pool {
    arena: Vec<i16>,
    free: Vec<Span>,
}

impl Pool {
    fn new(bytes: usize) -> Self {
        let words = bytes / 2;
        let free = if words > 0 { vec![Span { offset: 0, len: words }] } else { Vec::new() };
        Self { arena: vec![0; words], free }
    }

    fn alloc(&mut self, len: usize) -> Option<usize> {
        let idx = self.free.iter().position(|s| s.len >= len)?;
        let span = &mut self.free[idx];
        let offset = span.offset;
        if span.len == len {
            self.free.remove(idx);
        } else {
            span.offset += len;
            span.len -= len;
        }
        Some(offset)
    }

    fn release(&mut self, offset: usize, len: usize) {
        let idx = self.free.iter().position(|s| s.offset > offset).unwrap_or(self.free.len());
        self.free.insert(idx, Span { offset, len });
        // Merge with the following span, then with the preceding one.
        let touches = |a: &Span, b: &Span| a.offset + a.len == b.offset;
        if idx + 1 < self.free.len() && touches(&self.free[idx], &self.free[idx + 1]) {
            self.free[idx].len += self.free[idx + 1].len;
            self.free.remove(idx + 1);
        }
        if idx > 0 && touches(&self.free[idx - 1], &self.free[idx]) {
            self.free[idx - 1].len += self.free[idx].len;
            self.free.remove(idx);
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.arena.len() * 2
    }

    fn used_bytes(&self) -> usize {
        let free: usize = self.free.iter().map(|s| s.len).sum();
        (self.arena.len() - free) * 2
    }
}

struct SampleAsset {
    info: SampleInfo,
    /// Word offset into the owning pool's arena.
    offset: usize,
}

impl SampleAsset {
    fn words(&self) -> usize {
        self.info.frames * self.info.channels as usize
    }
}

/// Read-only view of one resident asset.
#[derive(Clone, Copy)]
pub struct SampleView<'a> {
    info: &'a SampleInfo,
    data: &'a [i16],
}

impl<'a> SampleView<'a> {
    pub fn info(&self) -> &'a SampleInfo {
        self.info
    }

    /// Frame at `index`; silence outside the data.
    pub fn frame(&self, index: usize) -> Frame {
        if index >= self.info.frames {
            return Frame::silence();
        }
        match self.info.channels {
            1 => Frame::mono(self.data[index]),
            _ => Frame { left: self.data[index * 2], right: self.data[index * 2 + 1] },
        }
    }

    /// Linearly interpolated stereo value at a 48.16 fixed-point cursor.
    pub fn interpolated(&self, cursor: i64) -> (f32, f32) {
        if cursor < 0 {
            return (0.0, 0.0);
        }
        let index = (cursor >> CURSOR_FRAC_BITS) as usize;
        let frac = (cursor & ((1 << CURSOR_FRAC_BITS) - 1)) as f32 / (1 << CURSOR_FRAC_BITS) as f32;
        let (al, ar) = self.frame(index).to_f32();
        let next = if self.info.has_loop() && index + 1 >= self.info.loop_end {
            self.info.loop_start
        } else {
            index + 1
        };
        let (bl, br) = self.frame(next).to_f32();
        (al + (bl - al) * frac, ar + (br - ar) * frac)
    }
}

/// The sample memory manager.
pub struct SampleMemory {
    fast: Pool,
    bulk: Option<Pool>,
    policy: TierPolicy,
    assets: SlotMap<SampleHandle, SampleAsset>,
}

impl SampleMemory {
    /// Allocate both arenas up front.
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            fast: Pool::new(config.fast_bytes),
            bulk: config.bulk_bytes.filter(|&b| b > 0).map(Pool::new),
            policy: config.policy,
            assets: SlotMap::with_key(),
        }
    }

    /// Copy raw audio into a pool and return its handle.
    ///
    /// The bulk pool is tried first unless the policy is `FastOnly`. Either
    /// succeeds or fails immediately.
    pub fn load(&mut self, raw: &RawAudio<'_>) -> Result<SampleHandle, LoadError> {
        if raw.channels == 0 || raw.channels > 2 {
            return Err(LoadError::UnsupportedChannels(raw.channels));
        }
        let frames = raw.frames();
        if frames == 0 {
            return Err(LoadError::Empty);
        }
        let looped = raw.loop_type != LoopType::None;
        if looped && (raw.loop_start >= raw.loop_end || raw.loop_end > frames) {
            return Err(LoadError::InvalidLoop {
                start: raw.loop_start,
                end: raw.loop_end,
                frames,
            });
        }

        let words = frames * raw.channels as usize;
        let use_bulk = self.policy == TierPolicy::PreferBulk;
        let mut placed = None;
        if use_bulk {
            if let Some(bulk) = self.bulk.as_mut() {
                placed = bulk.alloc(words).map(|off| (MemoryTier::Bulk, off));
                if placed.is_none() {
                    tracing::debug!(name = raw.name, words, "bulk pool full, trying fast pool");
                }
            }
        }
        if placed.is_none() {
            placed = self.fast.alloc(words).map(|off| (MemoryTier::Fast, off));
        }
        let Some((tier, offset)) = placed else {
            tracing::warn!(name = raw.name, bytes = words * 2, "sample does not fit in any pool");
            return Err(LoadError::OutOfMemory { requested_bytes: words * 2 });
        };

        self.pool_mut(tier).arena[offset..offset + words].copy_from_slice(&raw.pcm[..words]);
        let info = SampleInfo {
            name: sample_name(raw.name),
            tier,
            frames,
            channels: raw.channels,
            sample_rate: raw.sample_rate,
            loop_type: raw.loop_type,
            loop_start: if looped { raw.loop_start } else { 0 },
            loop_end: if looped { raw.loop_end } else { 0 },
        };
        tracing::debug!(name = raw.name, ?tier, bytes = info.byte_len(), "sample loaded");
        Ok(self.assets.insert(SampleAsset { info, offset }))
    }

    /// Return an asset's memory to its pool. Voices still holding the
    /// handle render silence from then on.
    pub fn unload(&mut self, handle: SampleHandle) -> bool {
        let Some(asset) = self.assets.remove(handle) else {
            return false;
        };
        let words = asset.words();
        self.pool_mut(asset.info.tier).release(asset.offset, words);
        true
    }

    pub fn contains(&self, handle: SampleHandle) -> bool {
        self.assets.contains_key(handle)
    }

    pub fn info(&self, handle: SampleHandle) -> Option<&SampleInfo> {
        self.assets.get(handle).map(|a| &a.info)
    }

    /// Number of resident assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Borrow a resident asset for playback.
    pub fn view(&self, handle: SampleHandle) -> Option<SampleView<'_>> {
        let asset = self.assets.get(handle)?;
        let pool = self.pool(asset.info.tier);
        Some(SampleView {
            info: &asset.info,
            data: &pool.arena[asset.offset..asset.offset + asset.words()],
        })
    }

    /// Copy up to `out.len()` frames starting at `cursor`.
    ///
    /// Looped assets wrap from `loop_end` to `loop_start`; one-shot assets
    /// are zero-padded past their end. Returns the number of frames that
    /// came from real data (0 for an unknown handle). Never blocks.
    pub fn read(&self, handle: SampleHandle, cursor: usize, out: &mut [Frame]) -> usize {
        let Some(view) = self.view(handle) else {
            out.fill(Frame::silence());
            return 0;
        };
        let info = view.info();
        let fold = |pos: usize| {
            if info.has_loop() && pos >= info.loop_end {
                let loop_len = info.loop_end - info.loop_start;
                info.loop_start + (pos - info.loop_start) % loop_len
            } else {
                pos
            }
        };
        let start = fold(cursor);
        let mut copied = 0;
        for (i, slot) in out.iter_mut().enumerate() {
            match start.checked_add(i).map(fold) {
                Some(pos) if pos < info.frames => {
                    *slot = view.frame(pos);
                    copied += 1;
                }
                _ => *slot = Frame::silence(),
            }
        }
        copied
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            fast_used: self.fast.used_bytes(),
            fast_capacity: self.fast.capacity_bytes(),
            bulk_used: self.bulk.as_ref().map_or(0, Pool::used_bytes),
            bulk_capacity: self.bulk.as_ref().map_or(0, Pool::capacity_bytes),
        }
    }

    fn pool(&self, tier: MemoryTier) -> &Pool {
        match (tier, self.bulk.as_ref()) {
            (MemoryTier::Bulk, Some(bulk)) => bulk,
            _ => &self.fast,
        }
    }

    fn pool_mut(&mut self, tier: MemoryTier) -> &mut Pool {
        match (tier, self.bulk.as_mut()) {
            (MemoryTier::Bulk, Some(bulk)) => bulk,
            _ => &mut self.fast,
        }
    }
}
