//! scratchbox CLI: live playback, offline render and settings check.
//!
//! Usage:
//!   scratchbox play [--config box.yaml] [--midi song.mid]
//!   scratchbox render --out take.wav [--config box.yaml] [--midi song.mid]
//!   scratchbox check [--config box.yaml]

mod status;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use sb_ir::EventSource;
use sb_master::{Controller, Input, LibraryReport, MasterError, ScriptedInput, Settings, SmfOptions};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "alloc_check")]
#[global_allocator]
static ALLOCATOR: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

#[derive(Parser)]
#[clap(
    version = crate_version!(),
    about = "Block-based sampler/synth with feedback delay and scratch input."
)]
struct Cli {
    /// Settings file (YAML, TOML or JSON). SCRATCHBOX__* variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays through the configured output until the input script ends.
    Play {
        /// Standard MIDI File replayed as the serial input. Without it a
        /// built-in demo plays.
        #[arg(short, long)]
        midi: Option<PathBuf>,
        /// Semitones at full pitch-wheel deflection.
        #[arg(long, default_value_t = 2.0)]
        bend_range: f32,
    },
    /// Renders offline to a WAV file.
    Render {
        #[arg(short, long)]
        out: PathBuf,
        #[arg(short, long)]
        midi: Option<PathBuf>,
        #[arg(long, default_value_t = 2.0)]
        bend_range: f32,
        /// Longest render, in seconds.
        #[arg(long, default_value_t = 300)]
        max_seconds: u32,
    },
    /// Validates settings and loads the sample library.
    Check {},
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "scratchbox failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MasterError> {
    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Play { midi, bend_range } => {
            let inputs = inputs(&settings, midi.as_deref(), bend_range)?;
            play(Controller::new(settings), inputs)
        }
        Commands::Render { out, midi, bend_range, max_seconds } => {
            let inputs = inputs(&settings, midi.as_deref(), bend_range)?;
            render(&Controller::new(settings), inputs, &out, max_seconds)
        }
        Commands::Check {} => {
            let (_, report) = Controller::new(settings).build_scheduler()?;
            print_report(&report);
            Ok(())
        }
    }
}

/// The MIDI file as the serial source, or the demo on serial and sensor.
fn inputs(
    settings: &Settings,
    midi: Option<&Path>,
    bend_range: f32,
) -> Result<Vec<Input>, MasterError> {
    let engine = &settings.engine;
    let Some(path) = midi else {
        return Ok(vec![
            Box::new(sb_master::demo_serial(engine)),
            Box::new(sb_master::demo_sensor(engine)),
        ]);
    };
    let data = std::fs::read(path).map_err(|source| MasterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let options = SmfOptions {
        bend_range,
        ..SmfOptions::new(engine.sample_rate)
    };
    let events = sb_master::load_smf(&data, &options)?;
    println!("MIDI:     {} ({} events)", path.display(), events.len());
    Ok(vec![Box::new(ScriptedInput::new(EventSource::Serial, events))])
}

fn play(mut ctrl: Controller, inputs: Vec<Input>) -> Result<(), MasterError> {
    let sample_rate = ctrl.settings().engine.sample_rate;
    let report = ctrl.play(inputs)?;
    print_report(&report);
    println!("Playing...");
    println!();

    while ctrl.is_playing() {
        if let (Some(stats), Some(frames)) = (ctrl.stats(), ctrl.frames_played()) {
            status::print_status(&stats, frames, sample_rate);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    ctrl.stop();
    println!();
    println!("Done.");
    Ok(())
}

fn render(
    ctrl: &Controller,
    inputs: Vec<Input>,
    out: &Path,
    max_seconds: u32,
) -> Result<(), MasterError> {
    let sample_rate = ctrl.settings().engine.sample_rate;
    println!("Rendering to {} at {} Hz...", out.display(), sample_rate);

    let wav = ctrl.render_to_wav(inputs, sample_rate as u64 * max_seconds as u64)?;
    println!("Rendered {} bytes", wav.len());
    std::fs::write(out, &wav).map_err(|source| MasterError::Io {
        path: out.to_path_buf(),
        source,
    })?;
    println!("Done.");
    Ok(())
}

fn print_report(report: &LibraryReport) {
    println!("Samples:  {} loaded, {} skipped", report.loaded.len(), report.skipped.len());
    for sample in &report.loaded {
        let (low, high) = (sample.keys.start(), sample.keys.end());
        println!("  {:<24} keys {:>3}-{:<3} {:>8} frames", sample.name, low, high, sample.frames);
    }
    for skipped in &report.skipped {
        println!("  {:<24} skipped: {}", skipped.name, skipped.reason);
    }
    println!();
}
