//! `cpal`-backed implementation of the [`AudioDevice`] contract. The
//! device owns a lock-free ring of pending frames; the realtime
//! callback drains it and the session thread refills it, mirroring the
//! `RealtimeOutputStream` split used by the signum-rs audio engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::contracts::AudioDevice;

struct SharedState {
    queue: Mutex<VecDeque<f32>>,
    played_frames: AtomicU64,
    underrun: AtomicBool,
    channels: u16,
}

/// A `cpal` output stream driven by the session's pump. Not `Sync` on
/// its own (the `cpal::Stream` handle isn't `Send`), so it's kept
/// behind the session's single-threaded pump loop rather than shared
/// across threads directly.
pub struct CpalAudioDevice {
    stream: Option<Stream>,
    shared: Arc<SharedState>,
    sample_rate: u32,
    channels: u16,
    anchor_us: AtomicI64,
}

unsafe impl Send for CpalAudioDevice {}
unsafe impl Sync for CpalAudioDevice {}

impl CpalAudioDevice {
    pub fn default_output() -> crate::core::error::CoreResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| crate::core::error::CoreError::SessionNotReady("no default audio output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| crate::core::error::CoreError::SessionNotReady(e.to_string()))?;
        let sample_format = config.sample_format();
        let stream_config: StreamConfig = config.into();
        let channels = stream_config.channels;
        let sample_rate = stream_config.sample_rate.0;

        let shared = Arc::new(SharedState {
            queue: Mutex::new(VecDeque::new()),
            played_frames: AtomicU64::new(0),
            underrun: AtomicBool::new(false),
            channels,
        });

        let stream = build_stream(&device, &stream_config, sample_format, shared.clone())
            .map_err(|e| crate::core::error::CoreError::SessionNotReady(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            shared,
            sample_rate,
            channels,
            anchor_us: AtomicI64::new(0),
        })
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    shared: Arc<SharedState>,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    let err_fn = |err| tracing::error!(%err, "audio output stream error");

    match format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _| fill(data, channels, &shared),
            err_fn,
            None,
        ),
        _ => device.build_output_stream(
            config,
            move |data: &mut [f32], _| fill(data, channels, &shared),
            err_fn,
            None,
        ),
    }
}

fn fill(out: &mut [f32], channels: usize, shared: &SharedState) {
    let mut queue = shared.queue.lock().unwrap();
    let mut produced = 0usize;
    for slot in out.iter_mut() {
        match queue.pop_front() {
            Some(sample) => {
                *slot = sample;
                produced += 1;
            }
            None => {
                *slot = 0.0;
            }
        }
    }
    if produced < out.len() {
        shared.underrun.store(true, Ordering::Relaxed);
    }
    shared
        .played_frames
        .fetch_add((produced / channels.max(1)) as u64, Ordering::Relaxed);
}

impl AudioDevice for CpalAudioDevice {
    fn start(&mut self) {
        if let Some(stream) = &self.stream {
            let _ = stream.play();
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.stream {
            let _ = stream.pause();
        }
    }

    fn flush(&mut self) {
        self.shared.queue.lock().unwrap().clear();
    }

    fn write_f32(&mut self, samples: &[f32]) {
        self.shared.queue.lock().unwrap().extend(samples.iter().copied());
    }

    fn buffered_frames(&self) -> usize {
        self.shared.queue.lock().unwrap().len() / self.channels.max(1) as usize
    }

    fn playhead_us(&self) -> i64 {
        let played = self.shared.played_frames.load(Ordering::Relaxed) as i64;
        super::contracts::frames_to_us(played, self.sample_rate) + self.anchor_us.load(Ordering::Relaxed)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn had_underrun(&self) -> bool {
        self.shared.underrun.load(Ordering::Relaxed)
    }

    fn clear_underrun(&mut self) {
        self.shared.underrun.store(false, Ordering::Relaxed);
    }
}
