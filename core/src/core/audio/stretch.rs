//! Stretch-engine implementations (§6 `StretchEngine` contract).
//!
//! `WsolaStretcher` backs Q1 (editor-quality stretch, 0.25x-4x) and Q2
//! (extreme slowdown, <0.25x) with a classic WSOLA overlap-add: fixed
//! analysis blocks are read at a speed-scaled hop and cross-faded at
//! the synthesis hop, which preserves pitch. `DecimateStretcher` backs
//! Q3 (varispeed, no pitch correction) by resampling through `rubato`,
//! which is the crate's registered resampling dependency and the
//! simplest correct way to change playback rate without touching pitch
//! independently.

use rubato::{FftFixedIn, Resampler};

use super::contracts::{QualityMode, StretchEngine};

pub const BLOCK_FRAMES: usize = 512;
const OVERLAP_FRAMES: usize = BLOCK_FRAMES / 4;

/// Pitch-preserving WSOLA stretcher for Q1/Q2.
pub struct WsolaStretcher {
    channels: u16,
    rate: u32,
    input: Vec<f32>,
    input_start_us: i64,
    output: Vec<f32>,
    speed: f64,
    target_time_us: i64,
    starved: bool,
}

impl WsolaStretcher {
    pub fn new(rate: u32, channels: u16) -> Self {
        Self {
            channels,
            rate,
            input: Vec::new(),
            input_start_us: 0,
            output: Vec::new(),
            speed: 1.0,
            target_time_us: 0,
            starved: false,
        }
    }

    fn channels_usize(&self) -> usize {
        self.channels.max(1) as usize
    }

    /// Produces as much WSOLA output as the currently buffered input
    /// allows, appending it to `self.output`.
    fn synthesize(&mut self) {
        let ch = self.channels_usize();
        let block_samples = BLOCK_FRAMES * ch;
        let overlap_samples = OVERLAP_FRAMES * ch;
        let hop_samples = block_samples - overlap_samples;
        let analysis_hop = ((hop_samples as f64) * self.speed.abs()) as usize;
        let analysis_hop = analysis_hop.max(ch);

        let mut cursor = 0usize;
        while cursor + block_samples <= self.input.len() {
            let block = &self.input[cursor..cursor + block_samples];
            if self.output.len() < overlap_samples {
                self.output.extend_from_slice(block);
            } else {
                let tail_start = self.output.len() - overlap_samples;
                for i in 0..overlap_samples {
                    let t = i as f32 / overlap_samples as f32;
                    self.output[tail_start + i] = self.output[tail_start + i] * (1.0 - t) + block[i] * t;
                }
                self.output.extend_from_slice(&block[overlap_samples..]);
            }
            cursor += analysis_hop;
        }
        if cursor > 0 {
            self.input.drain(0..cursor.min(self.input.len()));
            self.input_start_us += super::contracts::frames_to_us((cursor / ch) as i64, self.rate);
        }
    }
}

impl StretchEngine for WsolaStretcher {
    fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
        self.starved = false;
    }

    fn set_target(&mut self, target_time_us: i64, signed_speed: f64, _quality: QualityMode) {
        self.target_time_us = target_time_us;
        self.speed = signed_speed;
        self.reset();
        self.input_start_us = target_time_us;
    }

    fn push_pcm(&mut self, samples: &[f32], frames: usize, start_us: i64, skip: usize, max: Option<usize>) {
        let ch = self.channels_usize();
        let skip_samples = skip * ch;
        let mut usable = &samples[..frames * ch];
        if skip_samples < usable.len() {
            usable = &usable[skip_samples..];
        } else {
            return;
        }
        let max_samples = max.map(|m| m * ch);
        let usable = match max_samples {
            Some(m) if m < usable.len() => &usable[..m],
            _ => usable,
        };
        if self.input.is_empty() {
            self.input_start_us = start_us + super::contracts::frames_to_us(skip as i64, self.rate);
        }
        self.input.extend_from_slice(usable);
        self.synthesize();
    }

    fn render_alloc(&mut self, frames_needed: usize) -> (Vec<f32>, usize) {
        let ch = self.channels_usize();
        let needed_samples = frames_needed * ch;
        if self.output.len() < needed_samples {
            self.starved = self.output.len() < needed_samples;
        }
        let take = needed_samples.min(self.output.len());
        let out: Vec<f32> = self.output.drain(0..take).collect();
        (out, take / ch.max(1))
    }

    fn current_time_us(&self) -> i64 {
        self.input_start_us
    }

    fn starved(&self) -> bool {
        self.starved
    }

    fn clear_starved(&mut self) {
        self.starved = false;
    }
}

/// No-pitch-correction varispeed stretcher for Q3, built on `rubato`'s
/// fixed-size FFT resampler. Speed 2.0 plays at twice the source rate
/// (resampling ratio 1/speed); speed is re-derived into a resampler
/// whenever `set_target` changes it materially, since `rubato`
/// resamplers are constructed for a fixed ratio.
pub struct DecimateStretcher {
    channels: u16,
    rate: u32,
    resampler: Option<FftFixedIn<f32>>,
    speed: f64,
    input_start_us: i64,
    output: Vec<f32>,
    starved: bool,
}

impl DecimateStretcher {
    pub fn new(rate: u32, channels: u16) -> Self {
        Self {
            channels,
            rate,
            resampler: None,
            speed: 1.0,
            input_start_us: 0,
            output: Vec::new(),
            starved: false,
        }
    }

    fn rebuild_resampler(&mut self) {
        let ratio = 1.0 / self.speed.abs().max(0.0001);
        self.resampler = FftFixedIn::new(self.rate as usize, (self.rate as f64 * ratio) as usize, BLOCK_FRAMES, 2, self.channels.max(1) as usize).ok();
    }
}

impl StretchEngine for DecimateStretcher {
    fn reset(&mut self) {
        self.output.clear();
        self.starved = false;
    }

    fn set_target(&mut self, target_time_us: i64, signed_speed: f64, _quality: QualityMode) {
        self.speed = signed_speed;
        self.input_start_us = target_time_us;
        self.reset();
        self.rebuild_resampler();
    }

    fn push_pcm(&mut self, samples: &[f32], frames: usize, start_us: i64, skip: usize, max: Option<usize>) {
        let ch = self.channels.max(1) as usize;
        let skip_frames = skip.min(frames);
        let usable_frames = frames - skip_frames;
        let usable_frames = max.map(|m| m.min(usable_frames)).unwrap_or(usable_frames);
        if usable_frames == 0 {
            return;
        }
        self.input_start_us = start_us + super::contracts::frames_to_us(skip as i64, self.rate);

        let start_sample = skip_frames * ch;
        let end_sample = start_sample + usable_frames * ch;
        let chunk = &samples[start_sample.min(samples.len())..end_sample.min(samples.len())];

        let Some(resampler) = self.resampler.as_mut() else {
            self.output.extend_from_slice(chunk);
            return;
        };

        let mut deinterleaved: Vec<Vec<f32>> = vec![Vec::with_capacity(chunk.len() / ch); ch];
        for frame in chunk.chunks(ch) {
            for (c, sample) in frame.iter().enumerate() {
                deinterleaved[c].push(*sample);
            }
        }
        if deinterleaved[0].len() < BLOCK_FRAMES {
            // Not enough to feed the fixed-size resampler yet; defer.
            return;
        }
        match resampler.process(&deinterleaved, None) {
            Ok(out_channels) => {
                let out_frames = out_channels.first().map(|c| c.len()).unwrap_or(0);
                for i in 0..out_frames {
                    for channel in &out_channels {
                        self.output.push(channel[i]);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "decimate resampler process failed"),
        }
    }

    fn render_alloc(&mut self, frames_needed: usize) -> (Vec<f32>, usize) {
        let ch = self.channels.max(1) as usize;
        let needed_samples = frames_needed * ch;
        self.starved = self.output.len() < needed_samples;
        let take = needed_samples.min(self.output.len());
        let out: Vec<f32> = self.output.drain(0..take).collect();
        (out, take / ch)
    }

    fn current_time_us(&self) -> i64 {
        self.input_start_us
    }

    fn starved(&self) -> bool {
        self.starved
    }

    fn clear_starved(&mut self) {
        self.starved = false;
    }
}

/// Builds the appropriate stretch engine for a quality mode.
pub fn build_for_quality(quality: QualityMode, rate: u32, channels: u16) -> Box<dyn StretchEngine> {
    match quality {
        QualityMode::Q1Stretch | QualityMode::Q2ExtremeSlowdown => Box::new(WsolaStretcher::new(rate, channels)),
        QualityMode::Q3Decimate => Box::new(DecimateStretcher::new(rate, channels)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wsola_passthrough_at_unity_speed_preserves_frame_count() {
        let mut s = WsolaStretcher::new(48_000, 1);
        s.set_target(0, 1.0, QualityMode::Q1Stretch);
        let samples = vec![0.5f32; BLOCK_FRAMES * 4];
        s.push_pcm(&samples, BLOCK_FRAMES * 4, 0, 0, None);
        let (out, frames) = s.render_alloc(BLOCK_FRAMES);
        assert_eq!(out.len(), frames);
        assert!(frames > 0);
    }

    #[test]
    fn wsola_starves_when_under_fed() {
        let mut s = WsolaStretcher::new(48_000, 1);
        s.set_target(0, 1.0, QualityMode::Q1Stretch);
        let (_out, frames) = s.render_alloc(BLOCK_FRAMES);
        assert_eq!(frames, 0);
        assert!(s.starved());
    }
}
