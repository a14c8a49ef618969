//! Headless host for scratchbox.
//!
//! Owns the settings, builds a render scheduler with its sample library,
//! and drives it either live (an audio thread paced by the output plus an
//! input thread feeding the event queues) or offline into memory.

mod deadline;
mod demo;
mod error;
mod library;
mod settings;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sb_audio::{AudioError, AudioOutput, CaptureOutput, CpalOutput, NullOutput};
use sb_engine::{AudioBlock, EngineStats, EventPoster, RenderScheduler, SampleMemory};

pub use deadline::DeadlineMonitor;
pub use demo::{demo_sensor, demo_serial};
pub use error::MasterError;
pub use library::{load_library, load_one, LibraryReport, LoadedSample, SkippedSample};
pub use settings::{OutputKind, SampleSpec, Settings};

// Re-export common types so callers don't need the engine crates directly.
pub use sb_audio::{EventInput, ScriptedInput};
pub use sb_engine::{Frame, StatsSnapshot};
pub use sb_formats::{encode_wav, load_smf, SmfOptions};

/// Silence rendered after the last input finishes and every voice has
/// stopped, so the delay tail rings out.
const TAIL_SECS: u32 = 1;

/// Any input source the input thread can own.
pub type Input = Box<dyn EventInput + Send>;

/// Headless controller: owns settings and manages playback.
pub struct Controller {
    settings: Settings,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
    audio: Option<JoinHandle<()>>,
    input: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(settings: Settings) -> Self {
        Self { settings, playback: None }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build a scheduler and load the sample library into it.
    pub fn build_scheduler(&self) -> Result<(RenderScheduler, LibraryReport), MasterError> {
        let engine = &self.settings.engine;
        let mut scheduler = RenderScheduler::new(engine, SampleMemory::new(&engine.memory))?;
        let report = load_library(&mut scheduler, &self.settings.samples);
        Ok((scheduler, report))
    }

    // --- Real-time playback ---

    /// Start the audio and input threads.
    ///
    /// Returns once the output has started, or with the error that kept it
    /// from starting. Playback finishes on its own when every input is
    /// finished and the engine has gone quiet, or when `stop` is called.
    pub fn play(&mut self, inputs: Vec<Input>) -> Result<LibraryReport, MasterError> {
        self.stop();

        let (mut scheduler, report) = self.build_scheduler()?;
        let posters: Vec<(Input, EventPoster)> = inputs
            .into_iter()
            .map(|input| {
                let poster = scheduler.connect(input.source());
                (input, poster)
            })
            .collect();

        let stats = Arc::clone(scheduler.stats());
        let stop_signal = Arc::new(AtomicBool::new(false));
        let frames_played = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let inputs_done = Arc::new(AtomicBool::new(posters.is_empty()));

        let (ready_tx, ready_rx) = mpsc::channel();
        let audio = {
            let job = AudioJob {
                output: self.settings.output.clone(),
                sample_rate: self.settings.engine.sample_rate,
                quantum: Duration::from_nanos(self.settings.engine.quantum_nanos()),
                latency_blocks: self.settings.latency_blocks,
                stop: Arc::clone(&stop_signal),
                frames_played: Arc::clone(&frames_played),
                finished: Arc::clone(&finished),
                inputs_done: Arc::clone(&inputs_done),
            };
            std::thread::Builder::new()
                .name("sb-audio".into())
                .spawn(move || audio_thread(scheduler, job, ready_tx))
                .map_err(|source| MasterError::ThreadSpawn { name: "audio", source })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = audio.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = audio.join();
                return Err(MasterError::ThreadStart);
            }
        }

        let lookahead =
            (self.settings.latency_blocks as u64 + 1) * self.settings.engine.block_frames as u64;
        let input = if posters.is_empty() {
            None
        } else {
            let stop = Arc::clone(&stop_signal);
            let clock = Arc::clone(&frames_played);
            let spawned = std::thread::Builder::new()
                .name("sb-input".into())
                .spawn(move || input_thread(posters, lookahead, stop, clock, inputs_done));
            match spawned {
                Ok(thread) => Some(thread),
                Err(source) => {
                    stop_signal.store(true, Ordering::Relaxed);
                    let _ = audio.join();
                    return Err(MasterError::ThreadSpawn { name: "input", source });
                }
            }
        };

        self.playback = Some(PlaybackHandle {
            stop_signal,
            frames_played,
            finished,
            stats,
            audio: Some(audio),
            input,
        });
        Ok(report)
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.input.take() {
                let _ = handle.join();
            }
            if let Some(handle) = pb.audio.take() {
                let _ = handle.join();
            }
            let stats = pb.stats.snapshot();
            tracing::info!(
                blocks = stats.blocks_rendered,
                events = stats.events_applied,
                malformed = stats.events_malformed,
                overflowed = stats.events_overflowed,
                stolen = stats.voices_stolen,
                missed_deadlines = stats.missed_deadlines,
                "playback stopped"
            );
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback.as_ref().is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    /// Output frames rendered so far in the current run.
    pub fn frames_played(&self) -> Option<u64> {
        self.playback.as_ref().map(|p| p.frames_played.load(Ordering::Relaxed))
    }

    /// Counter snapshot of the current run. Reading never disturbs it.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.playback.as_ref().map(|p| p.stats.snapshot())
    }

    // --- Offline rendering ---

    /// Render as fast as possible into memory.
    ///
    /// Each block polls the inputs with the clock at the block's last
    /// frame, so scripted events land in the same block they would live.
    /// Stops after `max_frames`, or earlier once the inputs are finished
    /// and the tail has rung out.
    pub fn render_offline(
        &self,
        inputs: Vec<Input>,
        max_frames: u64,
    ) -> Result<Vec<Frame>, MasterError> {
        let (mut scheduler, _) = self.build_scheduler()?;
        let mut inputs: Vec<(Input, EventPoster)> = inputs
            .into_iter()
            .map(|input| {
                let poster = scheduler.connect(input.source());
                (input, poster)
            })
            .collect();

        let engine = &self.settings.engine;
        let block_frames = engine.block_frames as u64;
        let mut output = CaptureOutput::with_capacity(engine.sample_rate, max_frames as usize);
        let mut tail = TailCounter::new(engine.sample_rate, engine.block_frames);
        output.start()?;

        let mut rendered = 0u64;
        while rendered < max_frames {
            let now = rendered + block_frames - 1;
            for (input, poster) in &mut inputs {
                input.poll(now, poster);
            }
            let block = scheduler.render_next_block();
            output.write_block(&block)?;
            rendered += block_frames;

            let inputs_done = inputs.iter().all(|(input, _)| input.is_finished());
            if tail.tick(inputs_done && is_idle(&scheduler)) {
                break;
            }
        }
        output.stop()?;

        let mut frames = output.into_frames();
        frames.truncate(max_frames as usize);
        tracing::info!(frames = frames.len(), "offline render complete");
        Ok(frames)
    }

    pub fn render_to_wav(
        &self,
        inputs: Vec<Input>,
        max_frames: u64,
    ) -> Result<Vec<u8>, MasterError> {
        let frames = self.render_offline(inputs, max_frames)?;
        Ok(encode_wav(&frames, self.settings.engine.sample_rate))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Nothing left to make sound except the delay tail.
fn is_idle(scheduler: &RenderScheduler) -> bool {
    scheduler.pending_events() == 0 && scheduler.voices().active_count() == 0
}

/// Counts idle blocks until the tail has been rendered.
struct TailCounter {
    tail_blocks: u32,
    idle_blocks: u32,
}

impl TailCounter {
    fn new(sample_rate: u32, block_frames: usize) -> Self {
        let tail_blocks = (sample_rate * TAIL_SECS).div_ceil(block_frames.max(1) as u32);
        Self { tail_blocks, idle_blocks: 0 }
    }

    /// Returns `true` once `idle` has held for the whole tail.
    fn tick(&mut self, idle: bool) -> bool {
        self.idle_blocks = if idle { self.idle_blocks + 1 } else { 0 };
        self.idle_blocks >= self.tail_blocks
    }
}

/// The output variant chosen by settings, created on the audio thread.
enum Sink {
    Device(CpalOutput),
    Null(NullOutput),
    Wav(CaptureOutput, PathBuf),
}

impl Sink {
    fn open(
        kind: &OutputKind,
        sample_rate: u32,
        block_frames: usize,
        latency_blocks: usize,
    ) -> Result<Self, AudioError> {
        Ok(match kind {
            OutputKind::Cpal => {
                Sink::Device(CpalOutput::new(sample_rate, block_frames, latency_blocks)?)
            }
            OutputKind::Null => Sink::Null(NullOutput::new(sample_rate)),
            OutputKind::Wav { path } => Sink::Wav(CaptureOutput::new(sample_rate), path.clone()),
        })
    }

    fn output(&mut self) -> &mut dyn AudioOutput {
        match self {
            Sink::Device(out) => out,
            Sink::Null(out) => out,
            Sink::Wav(out, _) => out,
        }
    }

    /// Sinks without a device clock are paced by sleeping.
    fn needs_pacing(&self) -> bool {
        !matches!(self, Sink::Device(_))
    }

    fn finish(self) {
        match self {
            Sink::Device(out) if out.underruns() > 0 => {
                tracing::warn!(
                    underruns = out.underruns(),
                    "output played silence while waiting for blocks"
                );
            }
            Sink::Wav(out, path) => {
                let sample_rate = out.sample_rate();
                let frames = out.into_frames();
                let shown = path.display();
                match std::fs::File::create(&path) {
                    Ok(mut file) => match sb_formats::write_wav(&mut file, &frames, sample_rate) {
                        Ok(()) => {
                            tracing::info!(path = %shown, frames = frames.len(), "take written")
                        }
                        Err(e) => {
                            tracing::error!(path = %shown, error = %e, "failed to write take")
                        }
                    },
                    Err(e) => {
                        tracing::error!(path = %shown, error = %e, "failed to create take file")
                    }
                }
            }
            _ => {}
        }
    }
}

struct AudioJob {
    output: OutputKind,
    sample_rate: u32,
    quantum: Duration,
    latency_blocks: usize,
    stop: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    inputs_done: Arc<AtomicBool>,
}

fn audio_thread(
    mut scheduler: RenderScheduler,
    job: AudioJob,
    ready: mpsc::Sender<Result<(), AudioError>>,
) {
    let block_frames = scheduler.block_frames();
    let opened = Sink::open(&job.output, job.sample_rate, block_frames, job.latency_blocks)
        .and_then(|mut sink| sink.output().start().map(|()| sink));
    let mut sink = match opened {
        Ok(sink) => {
            let _ = ready.send(Ok(()));
            sink
        }
        Err(e) => {
            job.finished.store(true, Ordering::Relaxed);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut monitor = DeadlineMonitor::new(job.quantum, Arc::clone(scheduler.stats()));
    let mut tail = TailCounter::new(job.sample_rate, block_frames);
    let paced = sink.needs_pacing();
    let mut next_deadline = Instant::now();

    while !job.stop.load(Ordering::Relaxed) {
        let block = monitor.time(|| render_block(&mut scheduler));
        if let Err(e) = sink.output().write_block(&block) {
            tracing::error!(error = %e, "output failed, stopping playback");
            break;
        }
        job.frames_played.store(scheduler.block_index() * block_frames as u64, Ordering::Relaxed);

        if tail.tick(job.inputs_done.load(Ordering::Relaxed) && is_idle(&scheduler)) {
            tracing::debug!("inputs finished and engine idle");
            break;
        }
        if paced {
            next_deadline += job.quantum;
            std::thread::sleep(next_deadline.saturating_duration_since(Instant::now()));
        }
    }

    if let Err(e) = sink.output().stop() {
        tracing::warn!(error = %e, "output did not stop cleanly");
    }
    sink.finish();
    monitor.report();
    job.finished.store(true, Ordering::Relaxed);
}

#[cfg(feature = "alloc_check")]
fn render_block(scheduler: &mut RenderScheduler) -> AudioBlock {
    assert_no_alloc::assert_no_alloc(|| scheduler.render_next_block())
}

#[cfg(not(feature = "alloc_check"))]
fn render_block(scheduler: &mut RenderScheduler) -> AudioBlock {
    scheduler.render_next_block()
}

/// Polls every input ahead of the output clock so events are queued
/// before the block they belong to is rendered.
fn input_thread(
    mut inputs: Vec<(Input, EventPoster)>,
    lookahead: u64,
    stop: Arc<AtomicBool>,
    clock: Arc<AtomicU64>,
    inputs_done: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let now = clock.load(Ordering::Relaxed) + lookahead;
        for (input, poster) in &mut inputs {
            input.poll(now, poster);
        }
        if inputs.iter().all(|(input, _)| input.is_finished()) {
            inputs_done.store(true, Ordering::Relaxed);
            tracing::debug!("all inputs finished");
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_ir::{Event, EventSource, ScheduledEvent};

    fn quiet_settings() -> Settings {
        let mut settings = Settings { output: OutputKind::Null, ..Settings::default() };
        settings.engine.delay.wet = 0.0;
        settings
    }

    fn script(events: Vec<ScheduledEvent>) -> Vec<Input> {
        vec![Box::new(ScriptedInput::new(EventSource::Serial, events))]
    }

    #[test]
    fn offline_render_without_inputs_is_silent() {
        let controller = Controller::new(quiet_settings());
        let frames = controller.render_offline(Vec::new(), 4096).unwrap();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(Frame::is_silent));
    }

    #[test]
    fn offline_render_starts_note_in_its_block() {
        let controller = Controller::new(quiet_settings());
        let inputs = script(vec![
            ScheduledEvent::new(640, Event::NoteOn { pitch: 69, velocity: 127 }),
            ScheduledEvent::new(4410, Event::NoteOff { pitch: 69 }),
        ]);
        let frames = controller.render_offline(inputs, 44_100).unwrap();
        assert!(frames[..640].iter().all(Frame::is_silent));
        assert!(frames[640..704].iter().any(|f| !f.is_silent()));
    }

    #[test]
    fn offline_render_stops_after_tail() {
        let controller = Controller::new(quiet_settings());
        let inputs = script(vec![
            ScheduledEvent::new(0, Event::NoteOn { pitch: 60, velocity: 100 }),
            ScheduledEvent::new(64, Event::NoteOff { pitch: 60 }),
        ]);
        let frames = controller.render_offline(inputs, 44_100 * 30).unwrap();
        // Release plus one second of tail, well short of the cap.
        assert!(frames.len() < 44_100 * 3);
        assert_eq!(frames.len() % 64, 0);
    }

    #[test]
    fn render_to_wav_has_riff_header() {
        let controller = Controller::new(quiet_settings());
        let bytes = controller.render_to_wav(Vec::new(), 640).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(bytes.len(), 44 + 640 * 4);
    }

    #[test]
    fn live_null_output_finishes_with_its_script() {
        let mut settings = quiet_settings();
        settings.engine.envelope.release_secs = 0.01;
        let mut controller = Controller::new(settings);
        let inputs = script(vec![
            ScheduledEvent::new(0, Event::NoteOn { pitch: 60, velocity: 100 }),
            ScheduledEvent::new(256, Event::NoteOff { pitch: 60 }),
        ]);
        controller.play(inputs).unwrap();
        assert!(controller.frames_played().is_some());

        let started = Instant::now();
        while controller.is_playing() && started.elapsed() < Duration::from_secs(10) {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(controller.is_finished());
        let stats = controller.stats().unwrap();
        assert_eq!(stats.events_applied, 2);
        assert!(stats.blocks_rendered > 0);
        controller.stop();
        assert!(controller.stats().is_none());
    }

    #[test]
    fn tail_counter_resets_on_activity() {
        let mut tail = TailCounter::new(640, 64);
        for _ in 0..9 {
            assert!(!tail.tick(true));
        }
        assert!(!tail.tick(false));
        for _ in 0..9 {
            assert!(!tail.tick(true));
        }
        assert!(tail.tick(true));
    }
}
