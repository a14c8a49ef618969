//! CPAL-based audio output.
//!
//! The render loop pushes blocks into a ring; the device callback pops one
//! frame per device frame and substitutes silence whenever the ring runs
//! dry, so the device never waits on the renderer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use sb_engine::{AudioBlock, Frame};

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    consumer: Option<HeapCons<Frame>>,
    running: Arc<AtomicBool>,
    underruns: Arc<AtomicU32>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`, buffering about
    /// `latency_blocks` blocks of `block_frames`.
    pub fn new(
        sample_rate: u32,
        block_frames: usize,
        latency_blocks: usize,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let default = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = default.into();
        // The callback assumes 2-channel interleaving
        config.channels = 2;
        config.sample_rate = SampleRate(sample_rate);

        let rb = HeapRb::<Frame>::new(block_frames.max(1) * latency_blocks.max(2));
        let (producer, consumer) = rb.split();
        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            ring_frames = block_frames * latency_blocks.max(2),
            "opened audio device"
        );

        Ok(Self {
            device,
            config,
            stream: None,
            producer,
            consumer: Some(consumer),
            running: Arc::new(AtomicBool::new(false)),
            underruns: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Callback frames that found the ring empty and played silence.
    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn build_stream(&mut self) -> Result<(), AudioError> {
        let Some(mut consumer) = self.consumer.take() else {
            return Ok(());
        };
        let running = self.running.clone();
        let underruns = self.underruns.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(channels) {
                        let (left, right) = match consumer.try_pop() {
                            Some(frame) => frame.to_f32(),
                            None => {
                                underruns.fetch_add(1, Ordering::Relaxed);
                                (0.0, 0.0)
                            }
                        };
                        for (i, sample) in chunk.iter_mut().enumerate() {
                            *sample = match i {
                                0 => left,
                                1 => right,
                                _ => 0.0,
                            };
                        }
                    }
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Waits for ring space, which paces the caller to the device clock.
    fn write_block(&mut self, block: &AudioBlock) -> Result<(), AudioError> {
        let frames = block.frames();
        let wait = Duration::from_micros(
            (frames.len() as u64 * 250_000 / self.config.sample_rate.0.max(1) as u64).max(50),
        );
        while self.producer.vacant_len() < frames.len() {
            if !self.running.load(Ordering::Relaxed) {
                return Ok(());
            }
            std::thread::sleep(wait);
        }
        self.producer.push_slice(frames);
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.build_stream()?;
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
