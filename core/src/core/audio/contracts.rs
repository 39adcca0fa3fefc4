//! External collaborator contracts (§6): the decoder, stretch-engine,
//! and device boundaries the audio engine drives. These are traits
//! rather than concrete decoders/devices on purpose — media probing and
//! codec decode are explicitly out of scope (§1); the engine only needs
//! the synchronous, bounded-latency surface documented here.

/// Interleaved float32 PCM returned by a decoder, tagged with the
/// timestamp of its first frame. The decoder is allowed to return a
/// slightly later `start_time_us` than requested (codec delay); the
/// pump reconciles this after a reanchor (§4.5 "Codec-delay handling").
#[derive(Clone, Debug)]
pub struct PcmChunk {
    pub start_time_us: i64,
    /// Interleaved samples, `frames * channels` long.
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl PcmChunk {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn end_time_us(&self, rate: u32) -> i64 {
        self.start_time_us + frames_to_us(self.frame_count() as i64, rate)
    }
}

pub fn frames_to_us(frames: i64, rate: u32) -> i64 {
    (frames as i128 * 1_000_000 / rate as i128) as i64
}

pub fn us_to_frames(us: i64, rate: u32) -> i64 {
    (us as i128 * rate as i128 / 1_000_000) as i64
}

/// Per-track mix parameter after solo/mute resolution (§6
/// `TMB_SET_AUDIO_MIX_PARAMS`): soloing wins over muting, so a track
/// included here with `volume == 0.0` is distinct from one omitted
/// entirely (omitted tracks are not part of the mix at all).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedTrackMix {
    pub track_index: u32,
    pub volume: f32,
}

/// `TMB_SET_AUDIO_MIX_PARAMS` / `TMB_GET_MIXED_AUDIO` / `TMB_GET_TRACK_AUDIO`.
pub trait Decoder: Send + Sync {
    fn set_audio_mix_params(&self, resolved_mix: &[ResolvedTrackMix], rate: u32, channels: u16);
    fn get_mixed_audio(&self, start_us: i64, end_us: i64) -> Option<PcmChunk>;
    fn get_track_audio(
        &self,
        track_index: u32,
        start_us: i64,
        end_us: i64,
        rate: u32,
        channels: u16,
    ) -> Option<PcmChunk>;
}

/// Automatic quality-mode selection by `|speed|` (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityMode {
    /// `|s| < 0.25`: extreme slowdown, pitch-corrected.
    Q2ExtremeSlowdown,
    /// `1 <= |s| <= 4`: editor-quality pitch-preserving stretch.
    Q1Stretch,
    /// `0.25 <= |s| < 1` or `4 < |s| <= 16`: varispeed/sample-skipping,
    /// no pitch correction.
    Q3Decimate,
}

/// Picks the quality mode for a signed speed. Panics (an assertion
/// failure, per §4.5/§7) if `|speed| > 16`.
pub fn quality_mode_for_speed(speed: f64) -> QualityMode {
    let mag = speed.abs();
    assert!(mag <= 16.0, "speed magnitude {mag} exceeds the 16x ceiling");
    if mag < 0.25 {
        QualityMode::Q2ExtremeSlowdown
    } else if mag <= 4.0 {
        QualityMode::Q1Stretch
    } else {
        QualityMode::Q3Decimate
    }
}

/// `CREATE`/`RESET`/`SET_TARGET`/`PUSH_PCM`/`RENDER_ALLOC`/`CURRENT_TIME_US`/
/// `STARVED`/`CLEAR_STARVED` (§6). One instance is created per session at
/// a fixed rate/channel count/block size and lives for the session's
/// lifetime; `reset` clears internal state without recreating it.
pub trait StretchEngine: Send + Sync {
    fn reset(&mut self);
    /// Only called on transport events (start/seek/speed/latch), never
    /// during steady-state playback (§4.5 invariant).
    fn set_target(&mut self, target_time_us: i64, signed_speed: f64, quality: QualityMode);
    /// Feeds decoded PCM starting at `start_us`. `skip` discards leading
    /// frames already consumed by a previous push covering an
    /// overlapping range; `max` caps how many frames are accepted.
    fn push_pcm(&mut self, samples: &[f32], frames: usize, start_us: i64, skip: usize, max: Option<usize>);
    /// Renders up to `frames_needed` output frames; returns the
    /// produced interleaved samples and how many frames they cover.
    fn render_alloc(&mut self, frames_needed: usize) -> (Vec<f32>, usize);
    fn current_time_us(&self) -> i64;
    fn starved(&self) -> bool;
    fn clear_starved(&mut self);
}

/// `OPEN`/`CLOSE`/`START`/`STOP`/`FLUSH`/`WRITE_F32`/`BUFFERED_FRAMES`/
/// `PLAYHEAD_US`/`SAMPLE_RATE`/`CHANNELS`/`HAD_UNDERRUN`/`CLEAR_UNDERRUN` (§6).
pub trait AudioDevice: Send + Sync {
    fn start(&mut self);
    fn stop(&mut self);
    /// Discards buffered-but-unplayed audio without resetting the
    /// playhead counter (reanchor relies on this distinction, §4.5).
    fn flush(&mut self);
    fn write_f32(&mut self, samples: &[f32]);
    fn buffered_frames(&self) -> usize;
    /// Monotonic within a session; the basis of the master clock.
    fn playhead_us(&self) -> i64;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn had_underrun(&self) -> bool;
    fn clear_underrun(&mut self);
}

/// Resolves per-track `{track_index, volume, muted, soloed}` input into
/// the `[{track_index, volume}]` a decoder actually consumes. Soloing
/// wins over muting: if any track is soloed, every non-soloed track is
/// silenced outright (omitted from the resolved list).
pub fn resolve_mix(tracks: &[(u32, f32, bool, bool)]) -> Vec<ResolvedTrackMix> {
    let any_soloed = tracks.iter().any(|(_, _, _, soloed)| *soloed);
    tracks
        .iter()
        .filter_map(|&(track_index, volume, muted, soloed)| {
            if any_soloed && !soloed {
                return None;
            }
            if !any_soloed && muted {
                return None;
            }
            Some(ResolvedTrackMix { track_index, volume })
        })
        .collect()
}

/// Which track a mix entry identifies, ungrouped — used by `apply_mix`
/// to detect whether the track *set* changed (requiring a reset) versus
/// only volume/mute/solo (a hot swap).
pub fn track_set(tracks: &[(u32, f32, bool, bool)]) -> Vec<u32> {
    let mut set: Vec<u32> = tracks.iter().map(|t| t.0).collect();
    set.sort_unstable();
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_silences_non_soloed_tracks() {
        let tracks = vec![(1, 1.0, false, true), (2, 1.0, false, false)];
        let resolved = resolve_mix(&tracks);
        assert_eq!(resolved, vec![ResolvedTrackMix { track_index: 1, volume: 1.0 }]);
    }

    #[test]
    fn mute_silences_when_nothing_soloed() {
        let tracks = vec![(1, 1.0, true, false), (2, 0.8, false, false)];
        let resolved = resolve_mix(&tracks);
        assert_eq!(resolved, vec![ResolvedTrackMix { track_index: 2, volume: 0.8 }]);
    }

    #[test]
    fn quality_mode_thresholds() {
        assert_eq!(quality_mode_for_speed(0.1), QualityMode::Q2ExtremeSlowdown);
        assert_eq!(quality_mode_for_speed(0.5), QualityMode::Q3Decimate);
        assert_eq!(quality_mode_for_speed(1.0), QualityMode::Q1Stretch);
        assert_eq!(quality_mode_for_speed(4.0), QualityMode::Q1Stretch);
        assert_eq!(quality_mode_for_speed(8.0), QualityMode::Q3Decimate);
        assert_eq!(quality_mode_for_speed(-8.0), QualityMode::Q3Decimate);
    }

    #[test]
    #[should_panic]
    fn quality_mode_panics_past_sixteen() {
        quality_mode_for_speed(16.1);
    }

    #[test]
    fn frames_and_us_roundtrip_at_48k() {
        assert_eq!(us_to_frames(frames_to_us(480, 48_000), 48_000), 480);
    }
}
