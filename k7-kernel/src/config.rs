//! Kernel timing configuration
//!
//! Budget arithmetic is done in ticks of the per-core architectural
//! counter. The constants here tie the scheduler to the platform: the
//! counter frequency and the worst-case time for one kernel entry plus
//! exit (WCET). Everything else is derived.
//!
//! A scheduling context must always hold enough budget for a thread to
//! enter and leave the kernel, so the smallest refill the engine will
//! create is `2 * WCET` (scaled), and the smallest total budget is twice
//! that again so a budget can always be split into two viable refills.

use k7_common::Ticks;

/// Architectural counter frequency in Hz.
pub const TIMER_HZ: u64 = 62_500_000;

/// Worst-case kernel entry plus exit time, in microseconds.
pub const KERNEL_WCET_US: u64 = 10;

/// Platform fudge factor applied on top of the measured WCET.
pub const WCET_SCALE: u64 = 1;

/// Worst-case kernel entry plus exit time, in ticks.
#[inline]
#[must_use]
pub const fn kernel_wcet_ticks() -> Ticks {
    Ticks::from_us(KERNEL_WCET_US, TIMER_HZ)
}

/// Smallest refill the engine will create, in microseconds.
#[inline]
#[must_use]
pub const fn min_budget_us() -> u64 {
    2 * KERNEL_WCET_US * WCET_SCALE
}

/// Smallest total budget a scheduling context may be configured with, in
/// microseconds.
#[inline]
#[must_use]
pub const fn min_sc_budget_us() -> u64 {
    2 * min_budget_us()
}

/// Smallest refill the engine will create, in ticks.
#[inline]
#[must_use]
pub const fn min_budget_ticks() -> Ticks {
    Ticks::new(2 * kernel_wcet_ticks().as_u64() * WCET_SCALE)
}

/// Smallest total budget a scheduling context may be configured with, in
/// ticks.
#[inline]
#[must_use]
pub const fn min_sc_budget_ticks() -> Ticks {
    Ticks::new(2 * min_budget_ticks().as_u64())
}
