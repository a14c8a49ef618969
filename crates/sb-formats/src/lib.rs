//! File formats for scratchbox.
//!
//! WAV files become raw audio for the sample memory manager, offline
//! renders are written back out as WAV, and Standard MIDI Files become a
//! timed event script.

mod midi_file;
mod wav_format;

use thiserror::Error;

pub use midi_file::{load_smf, SmfOptions};
pub use wav_format::{encode_wav, load_wav, write_wav, DecodedWav};

/// Error type for format parsing.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid file header or magic bytes")]
    InvalidHeader,
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("unsupported format: {0}")]
    Unsupported(String),
    #[error("MIDI file: {0}")]
    Midi(#[from] midly::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
