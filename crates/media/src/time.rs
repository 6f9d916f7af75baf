//! Rational media timestamps.
//!
//! Sample presentation times are carried as `value / timescale` seconds so
//! that container timebases (90 kHz video, 48 kHz audio, 600 for legacy
//! QuickTime) survive a round trip through the pipeline without drift.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Nanosecond timescale used when converting from clock-based sources.
pub const NANOSECOND_TIMESCALE: i32 = 1_000_000_000;

/// A rational timestamp: `value / timescale` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    /// Tick count.
    pub value: i64,

    /// Ticks per second. Always positive for valid times.
    pub timescale: i32,
}

impl MediaTime {
    /// Time zero.
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// An invalid time (timescale zero), used when a source reports none.
    pub const INVALID: MediaTime = MediaTime {
        value: 0,
        timescale: 0,
    };

    pub fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    /// Build a time from seconds at the given timescale, rounding to the
    /// nearest tick.
    pub fn from_secs(secs: f64, timescale: i32) -> Self {
        Self {
            value: (secs * timescale as f64).round() as i64,
            timescale,
        }
    }

    /// Build a time from a nanosecond count.
    pub fn from_nanos(ns: u64) -> Self {
        Self {
            value: ns as i64,
            timescale: NANOSECOND_TIMESCALE,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.timescale > 0
    }

    /// Seconds as a float. Invalid times report zero.
    pub fn as_secs_f64(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    /// Nanoseconds, saturating at zero for negative times.
    pub fn as_nanos(&self) -> u64 {
        if !self.is_valid() || self.value <= 0 {
            return 0;
        }
        (self.value as i128 * NANOSECOND_TIMESCALE as i128 / self.timescale as i128) as u64
    }

    /// Re-express this time at another timescale, rounding to the nearest tick.
    pub fn convert_scale(&self, timescale: i32) -> Self {
        if !self.is_valid() || timescale <= 0 {
            return Self::INVALID;
        }
        let scaled = (self.value as i128 * timescale as i128 * 2 + self.timescale as i128)
            .div_euclid(self.timescale as i128 * 2);
        Self {
            value: scaled as i64,
            timescale,
        }
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    /// Invalid times sort before every valid time.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (true, true) => {
                let lhs = self.value as i128 * other.timescale as i128;
                let rhs = other.value as i128 * self.timescale as i128;
                lhs.cmp(&rhs)
            }
        }
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{:.3}s", self.as_secs_f64())
        } else {
            write!(f, "invalid")
        }
    }
}
