//! Counters shared between the render context and status observers.
//!
//! Only 32-bit atomics are used so the same code runs on cores without
//! 64-bit atomic support.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use sb_ir::EventKind;

/// Engine counters. Written by the render context and the event posters,
/// read by anyone holding an `Arc<EngineStats>`.
#[derive(Debug, Default)]
pub struct EngineStats {
    blocks_rendered: AtomicU32,
    events_applied: AtomicU32,
    events_malformed: AtomicU32,
    events_overflowed: AtomicU32,
    voices_stolen: AtomicU32,
    missed_deadlines: AtomicU32,
    active_voices: AtomicU32,
    last_event: AtomicU8,
}

/// Plain copy of the counters at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocks_rendered: u32,
    pub events_applied: u32,
    pub events_malformed: u32,
    pub events_overflowed: u32,
    pub voices_stolen: u32,
    pub missed_deadlines: u32,
    pub active_voices: u32,
    pub last_event: EventKind,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_block(&self, active_voices: usize) {
        self.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        self.active_voices.store(active_voices as u32, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self, kind: EventKind) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        self.last_event.store(kind as u8, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.events_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.events_overflowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        self.voices_stolen.fetch_add(1, Ordering::Relaxed);
    }

    /// Reported by whoever times the render call against its quantum.
    pub fn record_missed_deadline(&self) {
        self.missed_deadlines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_rendered: self.blocks_rendered.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_malformed: self.events_malformed.load(Ordering::Relaxed),
            events_overflowed: self.events_overflowed.load(Ordering::Relaxed),
            voices_stolen: self.voices_stolen.load(Ordering::Relaxed),
            missed_deadlines: self.missed_deadlines.load(Ordering::Relaxed),
            active_voices: self.active_voices.load(Ordering::Relaxed),
            last_event: EventKind::from_u8(self.last_event.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = EngineStats::new();
        stats.record_block(3);
        stats.record_applied(EventKind::NoteOn);
        stats.record_malformed();
        stats.record_missed_deadline();
        let snap = stats.snapshot();
        assert_eq!(snap.blocks_rendered, 1);
        assert_eq!(snap.active_voices, 3);
        assert_eq!(snap.events_applied, 1);
        assert_eq!(snap.events_malformed, 1);
        assert_eq!(snap.missed_deadlines, 1);
        assert_eq!(snap.last_event, EventKind::NoteOn);
    }

    #[test]
    fn fresh_stats_report_no_event() {
        assert_eq!(EngineStats::new().snapshot().last_event, EventKind::None);
    }
}
