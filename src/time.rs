//! Tick/slot arithmetic.
//!
//! All protocol timing is expressed in a monotonic tick unit supplied by
//! the platform via [`crate::timer::Timer`]; this module only converts
//! between ticks, milliseconds and microseconds and derives the handful of
//! durations the slot scheduler needs.

use core::ops::{Add, Sub};

/// One platform-defined monotonic time unit.
///
/// The original firmware calls these `osticks`; the conversion factor
/// between ticks and wall-clock time is a platform concern, so this wraps
/// a plain `i64` rather than assuming a particular tick rate, exactly as
/// the platform's `ms2osticks`/`us2osticks` macros would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks(pub i64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    /// Convert a millisecond duration to ticks at the default 1 tick/us
    /// rate used throughout this crate's tests and examples.
    ///
    /// A platform with a different tick rate should convert via its own
    /// `Timer` implementation rather than relying on this helper for
    /// production timing.
    pub fn from_ms(ms: u32) -> Ticks {
        Ticks(ms as i64 * 1_000)
    }

    /// Convert a microsecond duration to ticks (1 tick == 1 us).
    pub fn from_us(us: u32) -> Ticks {
        Ticks(us as i64)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Absolute difference between two tick values.
    pub fn abs_diff(self, other: Ticks) -> Ticks {
        Ticks((self.0 - other.0).abs())
    }
}

impl Add for Ticks {
    type Output = Ticks;
    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0 + rhs.0)
    }
}

impl Sub for Ticks {
    type Output = Ticks;
    fn sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0 - rhs.0)
    }
}
