//! `AudioSession`: the transport state machine, master clock, and
//! cooperative pump described in §4.5. One session owns exactly one
//! device, one stretch engine, and one decoder collaborator; the
//! engine never touches device or stretch internals directly, only
//! through the contracts in [`super::contracts`].

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::core::error::{CoreError, CoreResult};

use super::contracts::{frames_to_us, us_to_frames, AudioDevice, Decoder, QualityMode, ResolvedTrackMix, StretchEngine};
use super::stretch::build_for_quality;

/// Default device output latency compensated out of every clock read,
/// so the reported playhead reflects what's audibly playing rather
/// than what was last written to the device buffer.
pub const OUTPUT_LATENCY_US: i64 = 150_000;

/// Default target lookahead the pump keeps buffered ahead of the device.
pub const TARGET_BUFFER_MS: i64 = 100;

/// Default pump wake interval while the buffer is below target (tight loop).
pub const PUMP_INTERVAL_HOT_US: u64 = 2_000;
/// Default pump wake interval once the buffer is comfortably full (idle loop).
pub const PUMP_INTERVAL_IDLE_US: u64 = 15_000;

/// Tuning knobs for the audio engine (§10.3), passed in at construction
/// rather than held as bare constants — mirrors `CommandEngineConfig`'s
/// construction-time-config convention.
#[derive(Clone, Copy, Debug)]
pub struct AudioEngineConfig {
    pub output_latency_us: i64,
    pub target_buffer_ms: i64,
    pub pump_interval_hot_us: u64,
    pub pump_interval_idle_us: u64,
}

impl Default for AudioEngineConfig {
    fn default() -> Self {
        Self {
            output_latency_us: OUTPUT_LATENCY_US,
            target_buffer_ms: TARGET_BUFFER_MS,
            pump_interval_hot_us: PUMP_INTERVAL_HOT_US,
            pump_interval_idle_us: PUMP_INTERVAL_IDLE_US,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransportState {
    Stopped,
    Playing { speed: f64 },
}

/// A monotonic tag bumped on every transport event. Stop-timers and
/// burst timeouts capture the tag at schedule time and no-op if it has
/// since changed, which is how stale callbacks from a superseded burst
/// or jog gesture are discarded without an explicit cancellation
/// channel.
pub type Generation = u64;

struct Inner {
    state: TransportState,
    anchor_media_us: i64,
    anchor_wall_us: i64,
    /// Device playhead captured at the moment of the last reanchor
    /// (§4.5 "record `epoch` = current device playhead"). `get_time_us`
    /// subtracts this from the live device playhead so it measures time
    /// elapsed *since the anchor*, not the device's whole-session
    /// playhead (which is monotonic across stop/seek/start and would
    /// otherwise make every reanchor report a runaway media time).
    anchor_device_us: i64,
    mix: Vec<ResolvedTrackMix>,
    mix_rate: u32,
    mix_channels: u16,
    generation: Generation,
    burst_deadline_us: Option<i64>,
    /// Upper bound for `get_time_us` (§4.5: clamped to `[0, max_media_time]`).
    /// Defaults to unbounded until a caller knows the clip/sequence duration.
    max_media_time_us: i64,
}

/// Owns the device + stretch-engine pair and the transport state they
/// serve. `D` and `S` are generic so tests can substitute fakes; the
/// production session uses [`super::device::CpalAudioDevice`] and a
/// [`super::stretch`] engine chosen by [`QualityMode`].
pub struct AudioSession<D: AudioDevice> {
    device: Mutex<D>,
    stretch: Mutex<Box<dyn StretchEngine>>,
    decoder: Arc<dyn Decoder>,
    inner: Mutex<Inner>,
    epoch: Instant,
    config: AudioEngineConfig,
}

impl<D: AudioDevice> AudioSession<D> {
    pub fn new(device: D, decoder: Arc<dyn Decoder>) -> Self {
        Self::with_config(device, decoder, AudioEngineConfig::default())
    }

    pub fn with_config(device: D, decoder: Arc<dyn Decoder>, config: AudioEngineConfig) -> Self {
        let rate = device.sample_rate();
        let channels = device.channels();
        Self {
            device: Mutex::new(device),
            stretch: Mutex::new(build_for_quality(QualityMode::Q1Stretch, rate, channels)),
            decoder,
            inner: Mutex::new(Inner {
                state: TransportState::Stopped,
                anchor_media_us: 0,
                anchor_wall_us: 0,
                anchor_device_us: 0,
                mix: Vec::new(),
                mix_rate: rate,
                mix_channels: channels,
                generation: 0,
                burst_deadline_us: None,
                max_media_time_us: i64::MAX,
            }),
            epoch: Instant::now(),
            config,
        }
    }

    fn now_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    /// `TMB_SET_AUDIO_MIX_PARAMS` (§6): hot-swaps the resolved mix. If
    /// the track *set* is unchanged this never resets the stretch
    /// engine, so playback doesn't hiccup on a mid-playback volume tweak.
    pub fn apply_mix(&self, mix: Vec<ResolvedTrackMix>, rate: u32, channels: u16) {
        let mut inner = self.inner.lock().unwrap();
        let set_changed = {
            let mut old: Vec<u32> = inner.mix.iter().map(|m| m.track_index).collect();
            let mut new: Vec<u32> = mix.iter().map(|m| m.track_index).collect();
            old.sort_unstable();
            new.sort_unstable();
            old != new || inner.mix_rate != rate || inner.mix_channels != channels
        };
        inner.mix = mix.clone();
        inner.mix_rate = rate;
        inner.mix_channels = channels;
        self.decoder.set_audio_mix_params(&mix, rate, channels);
        if set_changed {
            if let TransportState::Playing { speed } = inner.state {
                let target = self.reanchor_target(&inner);
                self.stretch.lock().unwrap().set_target(target, speed, quality_for(speed));
            }
        }
    }

    fn reanchor_target(&self, inner: &Inner) -> i64 {
        match inner.state {
            TransportState::Stopped => inner.anchor_media_us,
            TransportState::Playing { .. } => {
                let elapsed_wall = self.now_us() - inner.anchor_wall_us;
                inner.anchor_media_us + elapsed_wall
            }
        }
    }

    fn reanchor_locked(&self, inner: &mut Inner, media_us: i64, speed: f64) {
        inner.generation += 1;
        inner.anchor_media_us = media_us;
        inner.anchor_wall_us = self.now_us();
        inner.state = TransportState::Playing { speed };
        inner.burst_deadline_us = None;
        let mut device = self.device.lock().unwrap();
        device.flush();
        // §4.5: "record epoch = current device playhead" — PLAYHEAD_US
        // is monotonic within the session, so every later `get_time_us`
        // call measures elapsed time since *this* reanchor by
        // subtracting it back out, not the whole session's playhead.
        inner.anchor_device_us = device.playhead_us();
        drop(device);
        let quality = quality_for(speed);
        self.stretch.lock().unwrap().set_target(media_us, speed, quality);
    }

    /// Sets the upper bound `get_time_us` clamps to (§4.5). Callers set
    /// this once the active sequence/clip's duration is known.
    pub fn set_max_media_time_us(&self, max_media_time_us: i64) {
        self.inner.lock().unwrap().max_media_time_us = max_media_time_us;
    }

    /// `start` (§4.5 transport): begins playback from `media_us` at the
    /// given signed speed. Reanchors the master clock and resets the
    /// stretch engine — this is one of the only places `SET_TARGET` is
    /// called.
    pub fn start(&self, media_us: i64, speed: f64) -> CoreResult<()> {
        if speed == 0.0 {
            return Err(CoreError::InvalidArgument("start speed must be non-zero".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        self.reanchor_locked(&mut inner, media_us, speed);
        drop(inner);
        self.device.lock().unwrap().start();
        Ok(())
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        let media_us = self.reanchor_target(&inner);
        inner.generation += 1;
        inner.anchor_media_us = media_us;
        inner.state = TransportState::Stopped;
        inner.burst_deadline_us = None;
        drop(inner);
        self.device.lock().unwrap().stop();
    }

    /// `seek` reanchors to a new media position without changing
    /// transport state (if playing, it keeps playing at the same speed).
    pub fn seek(&self, media_us: i64) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            TransportState::Playing { speed } => self.reanchor_locked(&mut inner, media_us, speed),
            TransportState::Stopped => {
                inner.anchor_media_us = media_us;
            }
        }
    }

    /// `set_speed` reanchors at the current media position with a new
    /// speed; a no-op at the stretch-engine level is avoided only when
    /// the speed is unchanged, since `SET_TARGET` must never fire
    /// during steady-state playback.
    pub fn set_speed(&self, speed: f64) -> CoreResult<()> {
        if speed == 0.0 {
            return Err(CoreError::InvalidArgument("speed must be non-zero".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        if let TransportState::Playing { speed: current } = inner.state {
            if (current - speed).abs() < f64::EPSILON {
                return Ok(());
            }
        }
        let media_us = self.reanchor_target(&inner);
        self.reanchor_locked(&mut inner, media_us, speed);
        Ok(())
    }

    /// `latch`: re-confirms the current anchor without changing media
    /// position or speed, bumping the generation so any in-flight burst
    /// timers become stale. Used when a caller wants a fresh generation
    /// tag without an audible reanchor glitch.
    pub fn latch(&self) -> Generation {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        inner.generation
    }

    /// `play_burst` (jog/scrub playback): plays for `duration_us` at
    /// `speed` then auto-stops, tagged with the generation active at
    /// schedule time so a superseded burst's delayed stop can't cut off
    /// a newer one.
    pub fn play_burst(&self, media_us: i64, speed: f64, duration_us: i64) -> CoreResult<Generation> {
        self.start(media_us, speed)?;
        let mut inner = self.inner.lock().unwrap();
        inner.burst_deadline_us = Some(self.now_us() + duration_us);
        Ok(inner.generation)
    }

    /// Called by the host's timer on every burst-duration tick; only
    /// stops playback if `generation` still matches and the deadline has
    /// passed. Returns true if it stopped the transport.
    pub fn try_stop_stale_burst(&self, generation: Generation) -> bool {
        let should_stop = {
            let inner = self.inner.lock().unwrap();
            inner.generation == generation
                && inner
                    .burst_deadline_us
                    .map(|deadline| self.now_us() >= deadline)
                    .unwrap_or(false)
        };
        if should_stop {
            self.stop();
        }
        should_stop
    }

    /// `get_time_us` (§4.5 master clock): `media_anchor + max(0,
    /// (device_playhead − epoch) − OUTPUT_LATENCY) × speed`, floored for
    /// positive speed and ceiled for negative speed to avoid rounding
    /// bias, then clamped to `[0, max_media_time_us]`.
    pub fn get_time_us(&self) -> i64 {
        let inner = self.inner.lock().unwrap();
        let raw = match inner.state {
            TransportState::Stopped => inner.anchor_media_us,
            TransportState::Playing { speed } => {
                let device_us = self.device.lock().unwrap().playhead_us();
                let since_anchor = device_us - inner.anchor_device_us;
                let compensated = since_anchor - self.config.output_latency_us;
                let device_elapsed = compensated.max(0);
                let elapsed = if device_elapsed > 0 {
                    device_elapsed
                } else {
                    (self.now_us() - inner.anchor_wall_us).max(0)
                };
                let scaled = elapsed as f64 * speed;
                let media_elapsed = if speed >= 0.0 { scaled.floor() } else { scaled.ceil() } as i64;
                inner.anchor_media_us + media_elapsed
            }
        };
        raw.clamp(0, inner.max_media_time_us)
    }

    pub fn generation(&self) -> Generation {
        self.inner.lock().unwrap().generation
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, TransportState::Playing { .. })
    }

    /// One pump tick (§4.5): refills the device buffer up to the
    /// `TARGET_BUFFER_MS` lookahead, pulling decoded PCM through the
    /// stretch engine as needed. Returns the interval the caller should
    /// wait before the next tick — tight while below target, relaxed
    /// once full.
    pub fn pump_tick(&self) -> std::time::Duration {
        let (speed, mix_rate, mix_channels) = {
            let inner = self.inner.lock().unwrap();
            match inner.state {
                TransportState::Stopped => {
                    return std::time::Duration::from_micros(self.config.pump_interval_idle_us)
                }
                TransportState::Playing { speed } => (speed, inner.mix_rate, inner.mix_channels),
            }
        };

        let mut device = self.device.lock().unwrap();
        let rate = device.sample_rate();
        let target_frames = us_to_frames(self.config.target_buffer_ms * 1_000, rate) as usize;
        let buffered = device.buffered_frames();
        if buffered >= target_frames {
            return std::time::Duration::from_micros(self.config.pump_interval_idle_us);
        }
        let deficit_frames = target_frames - buffered;

        let mut stretch = self.stretch.lock().unwrap();
        let current_media_us = stretch.current_time_us();
        let lookahead_us = frames_to_us(deficit_frames as i64, rate);
        if let Some(chunk) = self
            .decoder
            .get_mixed_audio(current_media_us, current_media_us + lookahead_us.max(1))
        {
            let _ = (mix_rate, mix_channels);
            stretch.push_pcm(&chunk.samples, chunk.frame_count(), chunk.start_time_us, 0, None);
        }

        let (rendered, frames) = stretch.render_alloc(deficit_frames);
        if frames > 0 {
            device.write_f32(&rendered);
        }

        if stretch.starved() || frames < deficit_frames {
            std::time::Duration::from_micros(self.config.pump_interval_hot_us)
        } else {
            std::time::Duration::from_micros(self.config.pump_interval_idle_us)
        }
    }
}

fn quality_for(speed: f64) -> QualityMode {
    super::contracts::quality_mode_for_speed(speed)
}
