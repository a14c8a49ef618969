//! Event types delivered by input sources.

use thiserror::Error;

/// A decoded control event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    /// Start a note. Velocity 0 is treated as a release.
    NoteOn { pitch: u8, velocity: u8 },
    /// Release a note.
    NoteOff { pitch: u8 },
    /// Set a controller (see [`crate::ControlParam`]).
    ControlChange { param: u8, value: u8 },
    /// A sample from a continuous sensor or wheel.
    ContinuousInput { axis: Axis, value: f32 },
}

/// Continuous input axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Signed playback speed factor (1.0 = normal, negative = reverse).
    ScratchRate,
    /// Absolute rotary sensor angle in degrees.
    ScratchAngle,
    /// Pitch offset in semitones for every voice.
    PitchBend,
}

/// Discriminant of an [`Event`], for status displays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    #[default]
    None = 0,
    NoteOn = 1,
    NoteOff = 2,
    ControlChange = 3,
    ContinuousInput = 4,
}

impl EventKind {
    /// Inverse of `kind as u8`; unknown values map to `None`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EventKind::NoteOn,
            2 => EventKind::NoteOff,
            3 => EventKind::ControlChange,
            4 => EventKind::ContinuousInput,
            _ => EventKind::None,
        }
    }
}

/// Why an event was rejected before reaching the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    #[error("pitch {0} is above 127")]
    Pitch(u8),
    #[error("velocity {0} is above 127")]
    Velocity(u8),
    #[error("controller {0} or its value is above 127")]
    Control(u8),
    #[error("continuous input value is not finite")]
    NotFinite,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NoteOn { .. } => EventKind::NoteOn,
            Event::NoteOff { .. } => EventKind::NoteOff,
            Event::ControlChange { .. } => EventKind::ControlChange,
            Event::ContinuousInput { .. } => EventKind::ContinuousInput,
        }
    }

    /// Check the 7-bit MIDI ranges and that sensor values are finite.
    pub fn validate(&self) -> Result<(), MalformedEvent> {
        match *self {
            Event::NoteOn { pitch, velocity } => {
                if pitch > 127 {
                    Err(MalformedEvent::Pitch(pitch))
                } else if velocity > 127 {
                    Err(MalformedEvent::Velocity(velocity))
                } else {
                    Ok(())
                }
            }
            Event::NoteOff { pitch } if pitch > 127 => Err(MalformedEvent::Pitch(pitch)),
            Event::NoteOff { .. } => Ok(()),
            Event::ControlChange { param, value } if param > 127 || value > 127 => {
                Err(MalformedEvent::Control(param))
            }
            Event::ControlChange { .. } => Ok(()),
            Event::ContinuousInput { value, .. } if !value.is_finite() => {
                Err(MalformedEvent::NotFinite)
            }
            Event::ContinuousInput { .. } => Ok(()),
        }
    }
}

/// The independent input transports, in tie-break priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventSource {
    Serial = 0,
    Usb = 1,
    Sensor = 2,
}

impl EventSource {
    /// Every source, highest priority first.
    pub const ALL: [EventSource; 3] = [EventSource::Serial, EventSource::Usb, EventSource::Sensor];

    /// Queue slot for this source.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// An event stamped with its arrival time (in output frames) and source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub arrival: u64,
    pub source: EventSource,
    pub event: Event,
}

impl TimedEvent {
    pub fn new(arrival: u64, source: EventSource, event: Event) -> Self {
        Self { arrival, source, event }
    }

    /// Ordering key used when merging sources: time first, then priority.
    pub fn merge_key(&self) -> (u64, EventSource) {
        (self.arrival, self.source)
    }
}

/// An event placed at an absolute frame position, for scripted inputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub at: u64,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(at: u64, event: Event) -> Self {
        Self { at, event }
    }
}
