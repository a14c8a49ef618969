//! Per-source event queues merged into one deterministic order per block.
//!
//! Every input transport gets its own single-producer/single-consumer ring.
//! Producers push from their own context and never wait; the render context
//! drains all rings at the start of each block, merging heads by arrival
//! time and breaking ties by source priority (serial, then USB, then
//! sensor).

use alloc::sync::Arc;

use heapless::Vec;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use sb_ir::{Event, EventSource, TimedEvent};

use crate::stats::EngineStats;

/// Slots in each per-source ring.
pub const QUEUE_CAPACITY: usize = 256;

/// Most events applied in one block. Any excess stays queued for the next
/// block so the drain cost is bounded.
pub const MAX_EVENTS_PER_BLOCK: usize = 64;

/// One block's worth of merged events, stored inline.
pub type DrainedEvents = Vec<TimedEvent, MAX_EVENTS_PER_BLOCK>;

/// Producer half handed to one input source.
pub struct EventPoster {
    source: EventSource,
    producer: HeapProd<TimedEvent>,
    last_arrival: u64,
    stats: Arc<EngineStats>,
}

impl EventPoster {
    pub fn source(&self) -> EventSource {
        self.source
    }

    /// Queue `event` as arriving at output frame `arrival`.
    ///
    /// Arrival times are made non-decreasing per source. Returns `false`
    /// (and counts the drop) when the ring is full.
    pub fn post(&mut self, event: Event, arrival: u64) -> bool {
        let arrival = arrival.max(self.last_arrival);
        self.last_arrival = arrival;
        if self.producer.try_push(TimedEvent::new(arrival, self.source, event)).is_err() {
            self.stats.record_overflow();
            return false;
        }
        true
    }
}

/// Consumer side of every source queue.
pub struct EventRouter {
    block_frames: u64,
    queues: [Option<HeapCons<TimedEvent>>; 3],
    stats: Arc<EngineStats>,
}

impl EventRouter {
    pub fn new(block_frames: usize, stats: Arc<EngineStats>) -> Self {
        Self {
            block_frames: block_frames.max(1) as u64,
            queues: [None, None, None],
            stats,
        }
    }

    /// Create the queue for `source` and return its producer.
    ///
    /// Allocates, so call it during setup. Connecting a source twice
    /// discards whatever the previous queue still held.
    pub fn connect(&mut self, source: EventSource) -> EventPoster {
        let (producer, consumer) = HeapRb::<TimedEvent>::new(QUEUE_CAPACITY).split();
        if self.queues[source.index()].replace(consumer).is_some() {
            tracing::warn!(?source, "event source reconnected, pending events dropped");
        }
        EventPoster {
            source,
            producer,
            last_arrival: 0,
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn is_connected(&self, source: EventSource) -> bool {
        self.queues[source.index()].is_some()
    }

    /// Events still queued across all sources.
    pub fn pending(&self) -> usize {
        self.queues.iter().flatten().map(|q| q.occupied_len()).sum()
    }

    /// Pop every event visible at `block` in merged order.
    ///
    /// An event is visible once its arrival frame falls inside or before
    /// the block, i.e. `arrival / block_frames <= block`. Never blocks or
    /// allocates; an empty result means nothing is due.
    pub fn drain_up_to(&mut self, block: u64) -> DrainedEvents {
        let mut drained = DrainedEvents::new();
        let limit = block.saturating_add(1).saturating_mul(self.block_frames);
        while !drained.is_full() {
            let mut next: Option<(usize, (u64, EventSource))> = None;
            for (slot, queue) in self.queues.iter().enumerate() {
                let Some(head) = queue.as_ref().and_then(|q| q.try_peek()) else {
                    continue;
                };
                if head.arrival >= limit {
                    continue;
                }
                let key = head.merge_key();
                if next.map_or(true, |(_, best)| key < best) {
                    next = Some((slot, key));
                }
            }
            let Some((slot, _)) = next else {
                break;
            };
            if let Some(event) = self.queues[slot].as_mut().and_then(|q| q.try_pop()) {
                let _ = drained.push(event);
            }
        }
        drained
    }
}
