//! Flexible time-input parsing (§4.6).
//!
//! Accepts the handful of shorthand forms an editor's transport bar and
//! "go to time" fields need to tolerate: full segmented timecode,
//! right-aligned bare digit runs, unit-suffixed durations, and
//! relative offsets from a base time. Never panics on malformed input —
//! every rejection path returns [`CoreError::InvalidArgument`].

use regex::Regex;
use std::sync::OnceLock;

use super::error::{CoreError, CoreResult};
use super::time::RationalTime;

/// Parses free-form user time input at the given frame rate.
///
/// `base` is required for relative forms (`+N`/`-N`); it is ignored for
/// every absolute form. Returns a [`RationalTime`] at `(rate_num,
/// rate_den)` or an error describing why the input couldn't be parsed.
pub fn parse_time_input(
    input: &str,
    rate_num: u32,
    rate_den: u32,
    base: Option<RationalTime>,
) -> CoreResult<RationalTime> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidArgument("empty time input".into()));
    }
    if rate_num == 0 || rate_den == 0 {
        return Err(CoreError::InvalidArgument("frame rate must be positive".into()));
    }
    let fps = nearest_integer_fps(rate_num, rate_den);

    if let Some(rest) = trimmed.strip_prefix('+').or_else(|| trimmed.strip_prefix('-')) {
        let sign: i64 = if trimmed.starts_with('-') { -1 } else { 1 };
        let base = base.ok_or_else(|| {
            CoreError::InvalidArgument("relative time input requires a base time".into())
        })?;
        return parse_relative(rest, sign, base, rate_num, rate_den, fps);
    }

    if let Some(caps) = segmented_regex().captures(trimmed) {
        return parse_segmented(&caps, rate_num, rate_den, fps);
    }
    if let Some(caps) = suffixed_regex().captures(trimmed) {
        return parse_suffixed(&caps, rate_num, rate_den, fps);
    }
    if digit_run_regex().is_match(trimmed) {
        return parse_digit_run(trimmed, rate_num, rate_den, fps);
    }

    Err(CoreError::InvalidArgument(format!("unrecognized time input: {trimmed:?}")))
}

/// Frame rates are rational (e.g. 30000/1001); segment math (hours,
/// minutes, seconds) always treats the rate as its nearest whole number
/// of frames per second, matching how editors display drop-ish rates on
/// the timecode bar without doing drop-frame bookkeeping.
fn nearest_integer_fps(rate_num: u32, rate_den: u32) -> i64 {
    ((rate_num as f64 / rate_den as f64).round() as i64).max(1)
}

fn segmented_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(\d{1,2})[:;.])?(?:(\d{1,2})[:;.])?(?:(\d{1,2})[:;.])?(\d{1,2})$").unwrap())
}

fn suffixed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*(h|m|s|f)$").unwrap())
}

fn digit_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,8}$").unwrap())
}

/// `HH:MM:SS:FF` (or `;`/`.` separators), right-aligned when fewer than
/// four segments are given — `"12:05"` means minutes:seconds, not
/// hours:minutes, matching how a transport field backfills missing
/// high-order segments as zero.
fn parse_segmented(caps: &regex::Captures, rate_num: u32, rate_den: u32, fps: i64) -> CoreResult<RationalTime> {
    let groups: Vec<Option<i64>> = (1..=4)
        .map(|i| caps.get(i).map(|m| m.as_str().parse::<i64>().unwrap_or(0)))
        .collect();
    // Right-align: drop leading `None`s, then backfill missing high-order
    // segments with zero.
    let present: Vec<i64> = groups.iter().filter_map(|g| *g).collect();
    let padded = match present.len() {
        1 => vec![0, 0, 0, present[0]],
        2 => vec![0, 0, present[0], present[1]],
        3 => vec![0, present[0], present[1], present[2]],
        4 => present,
        _ => return Err(CoreError::InvalidArgument("malformed timecode".into())),
    };
    let (hours, minutes, seconds, frames) = (padded[0], padded[1], padded[2], padded[3]);
    if minutes >= 60 || seconds >= 60 || frames >= fps {
        return Err(CoreError::InvalidArgument(format!(
            "timecode segment out of range for {fps}fps: {hours:02}:{minutes:02}:{seconds:02}:{frames:02}"
        )));
    }
    let total_frames = ((hours * 3600 + minutes * 60 + seconds) * fps) + frames;
    Ok(RationalTime::new(total_frames, rate_num, rate_den))
}

/// Right-aligned bare digit runs: `"130"` at 30fps means `00:00:01:10`
/// (the last two digits are frames, matching the segmented reading).
fn parse_digit_run(input: &str, rate_num: u32, rate_den: u32, fps: i64) -> CoreResult<RationalTime> {
    if input.len() > 8 {
        return Err(CoreError::InvalidArgument("digit run longer than 8 digits".into()));
    }
    // Split the run into FF, SS, MM, HH from the right, two digits each.
    let digits: Vec<u8> = input.bytes().rev().collect();
    let mut segment = |width: usize, offset: usize| -> i64 {
        let chunk: String = digits
            .iter()
            .skip(offset)
            .take(width)
            .rev()
            .map(|b| *b as char)
            .collect();
        if chunk.is_empty() {
            0
        } else {
            chunk.parse().unwrap_or(0)
        }
    };
    let frames = segment(2, 0);
    let seconds = segment(2, 2);
    let minutes = segment(2, 4);
    let hours = segment(2, 6);
    if frames >= fps {
        return Err(CoreError::InvalidArgument(format!("frame segment {frames} out of range for {fps}fps")));
    }
    if seconds >= 60 || minutes >= 60 {
        return Err(CoreError::InvalidArgument("seconds/minutes segment out of range".into()));
    }
    let total_frames = ((hours * 3600 + minutes * 60 + seconds) * fps) + frames;
    Ok(RationalTime::new(total_frames, rate_num, rate_den))
}

/// Unit-suffixed durations: `123f` (frames), `4s`/`3m`/`1h` (seconds,
/// minutes, hours — converted to whole frames at the given rate).
fn parse_suffixed(caps: &regex::Captures, rate_num: u32, rate_den: u32, fps: i64) -> CoreResult<RationalTime> {
    let value: f64 = caps[1].parse().map_err(|_| CoreError::InvalidArgument("malformed number".into()))?;
    let unit = caps[2].to_ascii_lowercase();
    let frames = match unit.as_str() {
        "f" => value.round() as i64,
        "s" => (value * fps as f64).round() as i64,
        "m" => (value * 60.0 * fps as f64).round() as i64,
        "h" => (value * 3600.0 * fps as f64).round() as i64,
        other => return Err(CoreError::InvalidArgument(format!("unknown duration suffix: {other}"))),
    };
    Ok(RationalTime::new(frames, rate_num, rate_den))
}

/// Relative offsets: `+N`/`-N` where the remainder is either a bare
/// frame count or a right-aligned segmented timecode, applied as a
/// delta against `base`.
fn parse_relative(
    rest: &str,
    sign: i64,
    base: RationalTime,
    rate_num: u32,
    rate_den: u32,
    fps: i64,
) -> CoreResult<RationalTime> {
    let rest = rest.trim();
    let delta_frames = if let Ok(n) = rest.parse::<i64>() {
        n
    } else if let Some(caps) = segmented_regex().captures(rest) {
        parse_segmented(&caps, rate_num, rate_den, fps)?.frames
    } else if digit_run_regex().is_match(rest) {
        parse_digit_run(rest, rate_num, rate_den, fps)?.frames
    } else if let Some(caps) = suffixed_regex().captures(rest) {
        parse_suffixed(&caps, rate_num, rate_den, fps)?.frames
    } else {
        return Err(CoreError::InvalidArgument(format!("unrecognized relative time input: {rest:?}")));
    };
    let base_rescaled = base.rescale(rate_num, rate_den);
    Ok(RationalTime::new(base_rescaled.frames + sign * delta_frames, rate_num, rate_den))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_timecode_parses_all_segments() {
        let t = parse_time_input("01:02:03:04", 30, 1, None).unwrap();
        assert_eq!(t.frames, (1 * 3600 + 2 * 60 + 3) * 30 + 4);
    }

    #[test]
    fn short_timecode_is_right_aligned() {
        let t = parse_time_input("12:05", 30, 1, None).unwrap();
        assert_eq!(t.frames, 12 * 30 + 5);
    }

    #[test]
    fn semicolon_and_dot_separators_accepted() {
        let a = parse_time_input("00;01;02;03", 30, 1, None).unwrap();
        let b = parse_time_input("00.01.02.03", 30, 1, None).unwrap();
        assert_eq!(a.frames, b.frames);
    }

    #[test]
    fn bare_digit_run_is_right_aligned() {
        let t = parse_time_input("130", 30, 1, None).unwrap();
        assert_eq!(t.frames, 1 * 30 + 10);
    }

    #[test]
    fn frame_suffix_is_literal_frame_count() {
        let t = parse_time_input("45f", 30, 1, None).unwrap();
        assert_eq!(t.frames, 45);
    }

    #[test]
    fn second_suffix_multiplies_by_fps() {
        let t = parse_time_input("2s", 30, 1, None).unwrap();
        assert_eq!(t.frames, 60);
    }

    #[test]
    fn relative_plus_applies_to_base() {
        let base = RationalTime::new(100, 30, 1);
        let t = parse_time_input("+50", 30, 1, Some(base)).unwrap();
        assert_eq!(t.frames, 150);
    }

    #[test]
    fn relative_minus_applies_to_base() {
        let base = RationalTime::new(100, 30, 1);
        let t = parse_time_input("-10", 30, 1, Some(base)).unwrap();
        assert_eq!(t.frames, 90);
    }

    #[test]
    fn relative_without_base_is_an_error_not_a_panic() {
        let err = parse_time_input("+10", 30, 1, None);
        assert!(err.is_err());
    }

    #[test]
    fn out_of_range_frame_segment_is_rejected() {
        let err = parse_time_input("00:00:00:40", 30, 1, None);
        assert!(err.is_err());
    }

    #[test]
    fn garbage_input_is_an_error_not_a_panic() {
        let err = parse_time_input("not a time", 30, 1, None);
        assert!(err.is_err());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_time_input("", 30, 1, None).is_err());
    }

    #[test]
    fn ntsc_rate_rounds_fps_for_segment_math() {
        // 30000/1001 rounds to 30 for segment bounds checking.
        let t = parse_time_input("00:00:01:29", 30000, 1001, None).unwrap();
        assert_eq!(t.frames, 29);
        assert!(parse_time_input("00:00:01:30", 30000, 1001, None).is_err());
    }
}
