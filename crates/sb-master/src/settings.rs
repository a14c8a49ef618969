//! Host settings.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! settings file (format picked from its extension), then `SCRATCHBOX__*`
//! environment variables, e.g. `SCRATCHBOX__ENGINE__POLYPHONY=16`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use sb_ir::EngineConfig;
use serde::Deserialize;

use crate::error::MasterError;

/// Everything the host needs to start.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub output: OutputKind,
    pub samples: Vec<SampleSpec>,
    /// Blocks buffered between the renderer and the device.
    pub latency_blocks: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            output: OutputKind::default(),
            samples: Vec::new(),
            latency_blocks: 4,
        }
    }
}

/// Where rendered blocks go.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    /// Default system output device.
    #[default]
    Cpal,
    /// Render and discard, paced by the wall clock. Quote it in YAML
    /// (`kind: "null"`), where a bare `null` means nothing.
    Null,
    /// Render in real time and write the take to a WAV file on stop.
    Wav { path: PathBuf },
}

/// One sample library entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SampleSpec {
    pub path: PathBuf,
    /// Lowest key the sample answers to.
    #[serde(default)]
    pub low: u8,
    #[serde(default = "default_high")]
    pub high: u8,
    /// Key that plays the sample at its recorded pitch.
    #[serde(default = "default_root")]
    pub root_note: u8,
    /// Overrides any loop embedded in the file. Both ends or neither.
    #[serde(default)]
    pub loop_start: Option<usize>,
    #[serde(default)]
    pub loop_end: Option<usize>,
}

fn default_high() -> u8 {
    127
}

fn default_root() -> u8 {
    60
}

impl SampleSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            low: 0,
            high: default_high(),
            root_note: default_root(),
            loop_start: None,
            loop_end: None,
        }
    }

    /// Label used in logs and the library report.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn loop_override(&self) -> Option<(usize, usize)> {
        self.loop_start.zip(self.loop_end)
    }
}

impl Settings {
    /// Load from `path` (if any) plus environment overrides, then validate.
    ///
    /// Relative sample paths are resolved against the settings file's
    /// directory.
    pub fn load(path: Option<&Path>) -> Result<Self, MasterError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let mut settings: Settings = builder
            .add_source(Environment::with_prefix("SCRATCHBOX").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        if let Some(dir) = path.and_then(Path::parent) {
            for spec in &mut settings.samples {
                if spec.path.is_relative() {
                    spec.path = dir.join(&spec.path);
                }
            }
        }
        settings.validate()?;
        tracing::debug!(
            ?path,
            samples = settings.samples.len(),
            output = ?settings.output,
            "settings loaded"
        );
        Ok(settings)
    }

    /// Parse an inline YAML document with no environment layer.
    pub fn from_yaml(yaml: &str) -> Result<Self, MasterError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), MasterError> {
        self.engine.validate()?;
        Ok(())
    }
}
