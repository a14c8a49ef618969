//! Render-time accounting against the block quantum.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sb_engine::EngineStats;

/// Times each render call and reports overruns to the engine counters.
pub struct DeadlineMonitor {
    quantum: Duration,
    stats: Arc<EngineStats>,
    worst: Duration,
    missed: u32,
}

impl DeadlineMonitor {
    pub fn new(quantum: Duration, stats: Arc<EngineStats>) -> Self {
        Self { quantum, stats, worst: Duration::ZERO, missed: 0 }
    }

    /// Run `render` and account for how long it took.
    pub fn time<T>(&mut self, render: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = render();
        self.observe(start.elapsed());
        out
    }

    /// Record one render duration. Returns `true` if it overran.
    pub fn observe(&mut self, elapsed: Duration) -> bool {
        self.worst = self.worst.max(elapsed);
        if elapsed > self.quantum {
            self.missed += 1;
            self.stats.record_missed_deadline();
            return true;
        }
        false
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    pub fn worst(&self) -> Duration {
        self.worst
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Log a one-line summary; quiet when nothing overran.
    pub fn report(&self) {
        if self.missed > 0 {
            tracing::warn!(
                missed = self.missed,
                worst_us = self.worst.as_micros() as u64,
                quantum_us = self.quantum.as_micros() as u64,
                "render calls overran the block quantum"
            );
        } else {
            tracing::debug!(
                worst_us = self.worst.as_micros() as u64,
                "all renders met the deadline"
            );
        }
    }
}
