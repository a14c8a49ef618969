//! Output sinks and input sources for scratchbox.
//!
//! Every hardware variant is one implementation of [`AudioOutput`] or
//! [`EventInput`]; the host picks among them at startup.

mod capture;
mod cpal_backend;
mod scripted;
mod traits;

pub use capture::{CaptureOutput, NullOutput};
pub use cpal_backend::CpalOutput;
pub use scripted::ScriptedInput;
pub use traits::{AudioError, AudioOutput, EventInput};
