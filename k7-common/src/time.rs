//! Kernel Time Types
//!
//! A tick is one increment of the per-core architectural counter. All
//! scheduling arithmetic (budgets, periods, refill times) is carried out in
//! ticks; conversion to and from microseconds happens only at configuration
//! boundaries.
//!
//! # Design
//!
//! [`Ticks`] is an intentionally simple `#[repr(transparent)]` wrapper
//! around `u64`:
//! - Zero runtime overhead
//! - Safe to transmute to/from `u64` for FFI
//! - Compatible with `#[repr(C)]` structs
//!
//! Arithmetic uses the plain operators; the kernel never runs long enough
//! for a 64-bit tick counter to wrap.

use core::fmt;
use core::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// A count of timer ticks.
///
/// Used both as an instant (ticks since boot on the owning core's counter)
/// and as a duration (a span of ticks), matching how the hardware counter
/// is consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Ticks(pub u64);

impl Ticks {
    /// The zero tick count.
    pub const ZERO: Ticks = Ticks(0);

    /// Create a new tick count.
    #[inline]
    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Get the raw tick value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the zero tick count.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert a duration in microseconds to ticks at the given counter
    /// frequency.
    #[inline]
    #[must_use]
    pub const fn from_us(us: u64, freq_hz: u64) -> Self {
        Self((us * freq_hz) / 1_000_000)
    }

    /// Convert this tick count to microseconds at the given counter
    /// frequency.
    #[inline]
    #[must_use]
    pub const fn to_us(self, freq_hz: u64) -> u64 {
        if freq_hz == 0 {
            return 0;
        }
        (self.0 * 1_000_000) / freq_hz
    }

    /// Subtract, clamping at zero.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Ticks {
    type Output = Ticks;

    #[inline]
    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0 + rhs.0)
    }
}

impl Sub for Ticks {
    type Output = Ticks;

    #[inline]
    fn sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0 - rhs.0)
    }
}

impl AddAssign for Ticks {
    #[inline]
    fn add_assign(&mut self, rhs: Ticks) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Ticks {
    #[inline]
    fn sub_assign(&mut self, rhs: Ticks) {
        self.0 -= rhs.0;
    }
}

impl Mul<u64> for Ticks {
    type Output = Ticks;

    #[inline]
    fn mul(self, rhs: u64) -> Ticks {
        Ticks(self.0 * rhs)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Ticks {
    #[inline]
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl From<Ticks> for u64 {
    #[inline]
    fn from(ticks: Ticks) -> Self {
        ticks.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_arithmetic() {
        let a = Ticks::new(100);
        let b = Ticks::new(30);
        assert_eq!(a + b, Ticks::new(130));
        assert_eq!(a - b, Ticks::new(70));
        assert_eq!(b * 2, Ticks::new(60));

        let mut c = a;
        c += b;
        assert_eq!(c, Ticks::new(130));
        c -= Ticks::new(130);
        assert!(c.is_zero());
    }

    #[test]
    fn test_saturating_sub() {
        let a = Ticks::new(10);
        let b = Ticks::new(30);
        assert_eq!(b.saturating_sub(a), Ticks::new(20));
        assert_eq!(a.saturating_sub(b), Ticks::ZERO);
    }

    #[test]
    fn test_us_conversion() {
        // 62.5 MHz counter: 1 us = 62.5 ticks
        let freq = 62_500_000;
        assert_eq!(Ticks::from_us(10, freq), Ticks::new(625));
        assert_eq!(Ticks::new(625).to_us(freq), 10);
        assert_eq!(Ticks::new(100).to_us(0), 0);
    }

    #[test]
    fn test_ordering() {
        assert!(Ticks::new(5) < Ticks::new(6));
        assert!(Ticks::new(6) <= Ticks::new(6));
    }
}
