//! Rational frame time.
//!
//! All timeline math happens in exact integer-frame arithmetic at a
//! rational rate (`num/den` frames per second). Floating point only
//! appears at the UI boundary (`to_seconds`/`from_seconds`).

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// An exact point (or duration) in frame time at a given rate.
///
/// `frames` is an integer frame count; `rate_num`/`rate_den` describe the
/// frame rate as frames-per-second (`rate_num / rate_den`). Both must be
/// positive; `new` panics otherwise, matching the "fail loudly" contract
/// for non-integer frames and non-positive rates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RationalTime {
    pub frames: i64,
    pub rate_num: u32,
    pub rate_den: u32,
}

impl RationalTime {
    /// Constructs a new rational time. Panics if the rate is not positive.
    pub fn new(frames: i64, rate_num: u32, rate_den: u32) -> Self {
        assert!(rate_num > 0, "rate numerator must be positive");
        assert!(rate_den > 0, "rate denominator must be positive");
        Self {
            frames,
            rate_num,
            rate_den,
        }
    }

    /// Zero at the given rate.
    pub fn zero(rate_num: u32, rate_den: u32) -> Self {
        Self::new(0, rate_num, rate_den)
    }

    /// Builds a rational time from a floating-point second value,
    /// rounding to the nearest frame. UI ingress only — never used
    /// internally for timeline math.
    pub fn from_seconds(seconds: f64, rate_num: u32, rate_den: u32) -> Self {
        assert!(rate_num > 0, "rate numerator must be positive");
        assert!(rate_den > 0, "rate denominator must be positive");
        let fps = rate_num as f64 / rate_den as f64;
        let frames = (seconds * fps).round() as i64;
        Self {
            frames,
            rate_num,
            rate_den,
        }
    }

    /// Converts to seconds. UI egress only.
    pub fn to_seconds(&self) -> f64 {
        let fps = self.rate_num as f64 / self.rate_den as f64;
        self.frames as f64 / fps
    }

    fn rate_as_f64(&self) -> f64 {
        self.rate_num as f64 / self.rate_den as f64
    }

    /// Rescales to a new rate, rounding the resulting frame count to the
    /// nearest integer (ties away from zero).
    pub fn rescale(&self, new_num: u32, new_den: u32) -> Self {
        self.rescale_with(new_num, new_den, |v| {
            if v >= 0.0 {
                (v + 0.5).floor()
            } else {
                (v - 0.5).ceil()
            }
        })
    }

    /// Rescales to a new rate, flooring the resulting frame count.
    pub fn rescale_floor(&self, new_num: u32, new_den: u32) -> Self {
        self.rescale_with(new_num, new_den, f64::floor)
    }

    /// Rescales to a new rate, ceiling the resulting frame count.
    pub fn rescale_ceil(&self, new_num: u32, new_den: u32) -> Self {
        self.rescale_with(new_num, new_den, f64::ceil)
    }

    fn rescale_with(&self, new_num: u32, new_den: u32, round: impl Fn(f64) -> f64) -> Self {
        assert!(new_num > 0, "rate numerator must be positive");
        assert!(new_den > 0, "rate denominator must be positive");
        if new_num == self.rate_num && new_den == self.rate_den {
            return *self;
        }
        // frames_new = frames * (new_rate / old_rate)
        //            = frames * (new_num * old_den) / (new_den * old_num)
        let numerator = self.frames as i128 * new_num as i128 * self.rate_den as i128;
        let denominator = new_den as i128 * self.rate_num as i128;
        let exact = numerator as f64 / denominator as f64;
        let frames = round(exact) as i64;
        Self {
            frames,
            rate_num: new_num,
            rate_den: new_den,
        }
    }

    /// Returns the larger of two rational times (comparison is exact,
    /// via cross-multiplication, regardless of differing rates).
    pub fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Multiplies a duration by a dimensionless scalar.
    pub fn mul_scalar(&self, scalar: f64) -> Self {
        Self {
            frames: (self.frames as f64 * scalar).round() as i64,
            rate_num: self.rate_num,
            rate_den: self.rate_den,
        }
    }

    /// Divides a duration by a dimensionless scalar. Panics on division
    /// by zero.
    pub fn div_scalar(&self, scalar: f64) -> Self {
        assert!(scalar != 0.0, "division by zero");
        Self {
            frames: (self.frames as f64 / scalar).round() as i64,
            rate_num: self.rate_num,
            rate_den: self.rate_den,
        }
    }

    /// Divides one rational time by another, yielding a dimensionless
    /// scalar duration ratio. Panics if `other` is zero-length.
    pub fn div_ratio(&self, other: &Self) -> f64 {
        assert!(other.frames != 0, "division by zero");
        self.to_seconds() / other.to_seconds()
    }

    /// Cross-multiplied comparison numerator for ordering/equality at
    /// potentially different rates: `frames * other_rate` vs
    /// `other.frames * self_rate`, expressed as seconds-per-unit ratios
    /// scaled up to avoid floating error for the integer case.
    fn cross_cmp(&self, other: &Self) -> Ordering {
        // self.frames / self.rate  vs  other.frames / other.rate
        // <=> self.frames * other.rate_num * self.rate_den
        //     vs other.frames * self.rate_num * other.rate_den
        let lhs = self.frames as i128 * other.rate_num as i128 * self.rate_den as i128;
        let rhs = other.frames as i128 * self.rate_num as i128 * other.rate_den as i128;
        lhs.cmp(&rhs)
    }
}

impl PartialEq for RationalTime {
    fn eq(&self, other: &Self) -> bool {
        self.cross_cmp(other) == Ordering::Equal
    }
}
impl Eq for RationalTime {}

impl PartialOrd for RationalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cross_cmp(other))
    }
}
impl Ord for RationalTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cross_cmp(other)
    }
}

impl Add for RationalTime {
    type Output = RationalTime;

    /// Rescales `rhs` to `self`'s rate, then adds frame counts.
    fn add(self, rhs: Self) -> Self::Output {
        let rescaled = rhs.rescale(self.rate_num, self.rate_den);
        Self {
            frames: self.frames + rescaled.frames,
            rate_num: self.rate_num,
            rate_den: self.rate_den,
        }
    }
}

impl Sub for RationalTime {
    type Output = RationalTime;

    fn sub(self, rhs: Self) -> Self::Output {
        let rescaled = rhs.rescale(self.rate_num, self.rate_den);
        Self {
            frames: self.frames - rescaled.frames,
            rate_num: self.rate_num,
            rate_den: self.rate_den,
        }
    }
}

impl Neg for RationalTime {
    type Output = RationalTime;

    fn neg(self) -> Self::Output {
        Self {
            frames: -self.frames,
            rate_num: self.rate_num,
            rate_den: self.rate_den,
        }
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}f@{}/{}",
            self.frames, self.rate_num, self.rate_den
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_positive_rate() {
        let t = RationalTime::new(10, 24, 1);
        assert_eq!(t.frames, 10);
    }

    #[test]
    #[should_panic]
    fn new_panics_on_zero_denominator() {
        RationalTime::new(10, 24, 0);
    }

    #[test]
    fn addition_is_commutative_same_rate() {
        let a = RationalTime::new(10, 30, 1);
        let b = RationalTime::new(5, 30, 1);
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn subtraction_self_is_zero() {
        let a = RationalTime::new(42, 24, 1);
        assert_eq!((a - a).frames, 0);
    }

    #[test]
    fn equality_is_transitive_across_rates() {
        let a = RationalTime::new(1, 1, 1); // 1 second
        let b = RationalTime::new(24, 24, 1); // 1 second
        let c = RationalTime::new(48, 48, 1); // 1 second
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, c);
    }

    #[test]
    fn ordering_cross_multiplies() {
        let a = RationalTime::new(1, 1, 1); // 1.0s
        let b = RationalTime::new(23, 24, 1); // ~0.958s
        assert!(a > b);
    }

    #[test]
    fn rescale_round_nearest() {
        // 1 frame at 24fps -> 30fps: 1 * 30/24 = 1.25 -> rounds to 1
        let t = RationalTime::new(1, 24, 1);
        assert_eq!(t.rescale(30, 1).frames, 1);
        // 3 frames at 24fps -> 30fps: 3 * 30/24 = 3.75 -> rounds to 4
        let t2 = RationalTime::new(3, 24, 1);
        assert_eq!(t2.rescale(30, 1).frames, 4);
    }

    #[test]
    fn rescale_floor_and_ceil_bracket_round() {
        let t = RationalTime::new(3, 24, 1); // 3.75 at 30fps
        assert_eq!(t.rescale_floor(30, 1).frames, 3);
        assert_eq!(t.rescale_ceil(30, 1).frames, 4);
    }

    #[test]
    fn distributivity_modulo_rounding_holds_for_exact_rates() {
        let a = RationalTime::new(10, 48, 1);
        let b = RationalTime::new(20, 48, 1);
        let rescaled_sum = (a + b).rescale(24, 1);
        let sum_rescaled = a.rescale(24, 1) + b.rescale(24, 1);
        assert_eq!(rescaled_sum, sum_rescaled);
    }

    #[test]
    fn to_seconds_roundtrip() {
        let t = RationalTime::new(48, 24, 1);
        assert_eq!(t.to_seconds(), 2.0);
        let back = RationalTime::from_seconds(2.0, 24, 1);
        assert_eq!(back.frames, 48);
    }

    #[test]
    fn max_picks_larger_value_across_rates() {
        let a = RationalTime::new(1, 1, 1);
        let b = RationalTime::new(23, 24, 1);
        assert_eq!(a.max(b), a);
        assert_eq!(b.max(a), a);
    }

    #[test]
    fn div_ratio_is_dimensionless() {
        let a = RationalTime::new(48, 24, 1); // 2s
        let b = RationalTime::new(24, 24, 1); // 1s
        assert_eq!(a.div_ratio(&b), 2.0);
    }

    #[test]
    #[should_panic]
    fn div_ratio_panics_on_zero_length() {
        let a = RationalTime::new(48, 24, 1);
        let zero = RationalTime::new(0, 24, 1);
        a.div_ratio(&zero);
    }

    #[test]
    fn display_format() {
        let t = RationalTime::new(10, 24, 1);
        assert_eq!(t.to_string(), "10f@24/1");
    }
}
