//! Sample library loading.
//!
//! A library loads as far as memory allows: any entry that cannot be read,
//! decoded or placed is skipped with a warning and its keys fall back to
//! the oscillator.

use std::fs;
use std::ops::RangeInclusive;

use sb_engine::{LoadError, RenderScheduler};
use sb_formats::load_wav;
use sb_ir::SampleHandle;

use crate::error::MasterError;
use crate::settings::SampleSpec;

/// A library entry that made it into sample memory.
#[derive(Debug, Clone)]
pub struct LoadedSample {
    pub name: String,
    pub handle: SampleHandle,
    pub keys: RangeInclusive<u8>,
    pub frames: usize,
}

/// A library entry that did not.
#[derive(Debug)]
pub struct SkippedSample {
    pub name: String,
    pub reason: MasterError,
}

/// Outcome of loading a whole library.
#[derive(Debug, Default)]
pub struct LibraryReport {
    pub loaded: Vec<LoadedSample>,
    pub skipped: Vec<SkippedSample>,
}

impl LibraryReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Entries skipped because a pool was full.
    pub fn out_of_memory(&self) -> usize {
        let full = |s: &&SkippedSample| {
            matches!(
                s.reason,
                MasterError::Load {
                    source: LoadError::OutOfMemory { .. },
                    ..
                }
            )
        };
        self.skipped.iter().filter(full).count()
    }
}

/// Load every entry of `specs` into the scheduler's sample memory and map
/// it onto its key range.
pub fn load_library(scheduler: &mut RenderScheduler, specs: &[SampleSpec]) -> LibraryReport {
    let mut report = LibraryReport::default();
    for spec in specs {
        let name = spec.name();
        match load_one(scheduler, spec) {
            Ok(sample) => {
                tracing::info!(
                    name = %sample.name,
                    keys = ?sample.keys,
                    frames = sample.frames,
                    "sample loaded"
                );
                report.loaded.push(sample);
            }
            Err(reason) => {
                tracing::warn!(%name, %reason, "sample skipped");
                report.skipped.push(SkippedSample { name, reason });
            }
        }
    }
    let usage = scheduler.samples().usage();
    tracing::info!(
        loaded = report.loaded.len(),
        skipped = report.skipped.len(),
        fast_used = usage.fast_used,
        bulk_used = usage.bulk_used,
        "sample library ready"
    );
    report
}

/// Load and map a single entry.
pub fn load_one(
    scheduler: &mut RenderScheduler,
    spec: &SampleSpec,
) -> Result<LoadedSample, MasterError> {
    let name = spec.name();
    let bytes = fs::read(&spec.path).map_err(|source| MasterError::Io {
        path: spec.path.clone(),
        source,
    })?;
    let wav = load_wav(&bytes, &name)?;

    let mut raw = wav.as_raw();
    if let Some((start, end)) = spec.loop_override() {
        raw = raw.looped(start, end);
    }
    let handle = scheduler
        .samples_mut()
        .load(&raw)
        .map_err(|source| MasterError::Load { name: name.clone(), source })?;

    let keys = spec.low.min(spec.high)..=spec.high.max(spec.low).min(127);
    scheduler.map_sample(keys.clone(), handle, spec.root_note.min(127));
    Ok(LoadedSample {
        name,
        handle,
        keys,
        frames: wav.frames(),
    })
}
