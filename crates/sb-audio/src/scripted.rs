//! Replays a fixed list of events as one input source.

use sb_engine::EventPoster;
use sb_ir::{EventSource, ScheduledEvent};

use crate::traits::EventInput;

/// Posts pre-timed events once the output clock reaches them.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    source: EventSource,
    events: Vec<ScheduledEvent>,
    cursor: usize,
}

impl ScriptedInput {
    /// Events are sorted by time; equal times keep their given order.
    pub fn new(source: EventSource, mut events: Vec<ScheduledEvent>) -> Self {
        events.sort_by_key(|e| e.at);
        Self { source, events, cursor: 0 }
    }

    /// Frame of the last event, if any.
    pub fn last_frame(&self) -> Option<u64> {
        self.events.last().map(|e| e.at)
    }

    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }
}

impl EventInput for ScriptedInput {
    fn source(&self) -> EventSource {
        self.source
    }

    fn poll(&mut self, now: u64, poster: &mut EventPoster) -> usize {
        let mut posted = 0;
        while let Some(next) = self.events.get(self.cursor) {
            if next.at > now {
                break;
            }
            if !poster.post(next.event, next.at) {
                // Queue full; retry on the next poll.
                break;
            }
            self.cursor += 1;
            posted += 1;
        }
        posted
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.events.len()
    }
}
