use std::path::PathBuf;

use sb_audio::AudioError;
use sb_engine::LoadError;
use sb_formats::FormatError;
use thiserror::Error;

/// Anything that can stop the host from starting or finishing a run.
#[derive(Debug, Error)]
pub enum MasterError {
    #[error("settings load/parse error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("invalid engine configuration: {0}")]
    Engine(#[from] sb_ir::ConfigError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("sample {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("audio thread exited before starting")]
    ThreadStart,
}
