//! Time representation for frame-accurate playback and export.
//!
//! Interactive playback runs on `f64` seconds, but every frame index that
//! ends up in an export goes through rational arithmetic so that
//! `start + i / fps` never accumulates floating-point drift.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Microsecond precision used when importing float seconds.
const SECONDS_PRECISION: i64 = 1_000_000;

/// A rational time value in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RationalTime {
    value: Rational64,
}

impl RationalTime {
    /// Zero time constant.
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };

    /// `numerator / denominator` seconds.
    #[inline]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            value: Rational64::new(numerator, denominator),
        }
    }

    /// Time of frame `frames` at `rate`.
    #[inline]
    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self {
            value: Rational64::new(frames * rate.denominator as i64, rate.numerator as i64),
        }
    }

    /// Import float seconds, rounded to the microsecond.
    pub fn from_seconds_f64(seconds: f64) -> Self {
        Self {
            value: Rational64::new(
                (seconds * SECONDS_PRECISION as f64).round() as i64,
                SECONDS_PRECISION,
            ),
        }
    }

    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.value.numer() as f64 / *self.value.denom() as f64
    }

    /// Frame number containing this time (floor).
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        let frames = self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames.floor().to_integer()
    }

    /// Number of frames needed to cover this duration (ceil).
    #[inline]
    pub fn ceil_frames(self, rate: FrameRate) -> i64 {
        let frames = self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames.ceil().to_integer()
    }
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

/// Frame rate as a rational number (e.g., 30000/1001 for 29.97 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Frames needed to cover `seconds`, i.e. `ceil(seconds * fps)`.
    pub fn frame_count(self, seconds: f64) -> u64 {
        RationalTime::from_seconds_f64(seconds.max(0.0))
            .ceil_frames(self)
            .max(0) as u64
    }

    /// Timestamp of frame `index` relative to `start` seconds.
    pub fn frame_time(self, start: f64, index: u64) -> f64 {
        (RationalTime::from_seconds_f64(start) + RationalTime::from_frames(index as i64, self))
            .to_seconds_f64()
    }

    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_time_frames() {
        let rate = FrameRate::FPS_24;
        let time = RationalTime::from_frames(48, rate);
        assert_eq!(time.to_seconds_f64(), 2.0);
        assert_eq!(time.to_frames(rate), 48);
    }

    #[test]
    fn test_frame_count_is_ceiling() {
        let rate = FrameRate::FPS_30;
        assert_eq!(rate.frame_count(10.0), 300);
        assert_eq!(rate.frame_count(10.01), 301);
        // 0.1 * 30 is 3.0000000000000004 in f64; rational math keeps it exact.
        assert_eq!(rate.frame_count(0.1), 3);
        assert_eq!(rate.frame_count(0.0), 0);
    }

    #[test]
    fn test_frame_time_has_no_drift() {
        let rate = FrameRate::FPS_30;
        assert_eq!(rate.frame_time(0.0, 300), 10.0);
        assert_eq!(rate.frame_time(2.0, 15), 2.5);
    }

    #[test]
    fn test_time_arithmetic() {
        let a = RationalTime::new(1, 2);
        let b = RationalTime::new(1, 4);
        assert_eq!((a + b).to_seconds_f64(), 0.75);
    }
}
