//! Sporadic-Server Refill Engine
//!
//! This module implements the replenishment algorithms behind the
//! bandwidth guarantee "at most `budget` ticks of execution per sliding
//! window of `period` ticks":
//!
//! - [`refill_new`]: give a fresh scheduling context its full budget
//! - [`refill_update`]: reconfigure a live scheduling context without ever
//!   exceeding the new bandwidth, even transiently
//! - [`refill_budget_check`]: charge consumed time and schedule it for
//!   reuse one period later
//! - [`refill_unblock_check`]: on wake-up, slide eligible budget forward
//!   and merge refills that have become contiguous
//!
//! The sum of all refill amounts in the queue always equals the budget of
//! the scheduling context; it never changes except under
//! [`refill_update`]. Every refill holds at least the minimum budget (two
//! kernel WCETs), every pair of neighbours is disjoint in time, and the
//! whole queue spans at most one period. Debug builds verify all of this
//! on entry and exit of every mutating operation.
//!
//! All operations are straight-line code with loops bounded by the queue
//! capacity; they neither allocate nor fail. A bandwidth overrun is not an
//! error: it is absorbed by rescheduling the full budget far enough in the
//! future to restore the sliding-window bound.

use k7_cap::{Refill, SchedContext};
use k7_common::Ticks;

use super::SchedClock;

// -- Queries

/// Whether the head refill is eligible to be used.
///
/// This indicates whether the thread bound to the SC can be placed into
/// the scheduler; otherwise it has to wait in the release queue. The one
/// WCET of slack lets a thread enter the kernel just before its refill
/// begins.
#[inline]
#[must_use]
pub fn refill_ready(sc: &SchedContext, clock: &SchedClock) -> bool {
    debug_assert!(!sc.is_empty());
    sc.head().time <= clock.horizon()
}

/// The budget this scheduling context has available if `usage` is charged
/// to it.
#[must_use]
pub fn refill_capacity(sc: &SchedContext, usage: Ticks) -> Ticks {
    debug_assert!(!sc.is_empty());

    if usage > sc.head().amount {
        return Ticks::ZERO;
    }
    sc.head().amount - usage
}

/// Whether the head refill has enough capacity left to enter and exit the
/// kernel after `usage` is charged to it.
#[inline]
#[must_use]
pub fn refill_sufficient(sc: &SchedContext, usage: Ticks, clock: &SchedClock) -> bool {
    refill_capacity(sc, usage) >= clock.min_budget()
}

/// Sum of all refill amounts in the queue.
///
/// Equal to the configured budget at every operation boundary.
#[must_use]
pub fn refill_sum(sc: &SchedContext) -> Ticks {
    sc.iter().fold(Ticks::ZERO, |sum, refill| sum + refill.amount)
}

// -- Operations

/// Configure a fresh scheduling context: the full budget, usable from now.
pub fn refill_new(
    sc: &mut SchedContext,
    max_refills: usize,
    budget: Ticks,
    period: Ticks,
    clock: &SchedClock,
) {
    debug_assert!(!sc.is_active());
    debug_assert!(budget >= clock.min_sc_budget());
    debug_assert!(budget <= period);

    sc.period = period;
    sc.budget = budget;
    sc.activate(max_refills);
    sc.push_tail(Refill::new(clock.now(), budget));

    #[cfg(debug_assertions)]
    sanity::exit(sc, budget, clock);
}

/// Reconfigure a live scheduling context.
///
/// The thread bound to this SC may be running, so over any window of
/// `new_period` no more than `new_budget` may become consumable, even
/// while the switch happens. The queue is collapsed to its head refill
/// (the only budget that may already have been handed out), which is then
/// either trimmed to the new budget or topped up with a second refill one
/// new period out.
pub fn refill_update(
    sc: &mut SchedContext,
    new_period: Ticks,
    new_budget: Ticks,
    new_max_refills: usize,
    clock: &SchedClock,
) {
    // An inactive SC has nothing to preserve and must go through
    // refill_new instead.
    debug_assert!(sc.is_active());
    debug_assert!(new_budget >= clock.min_sc_budget());
    debug_assert!(new_budget <= new_period);

    sc.truncate_to_head(new_max_refills);
    sc.period = new_period;
    sc.budget = new_budget;

    if refill_ready(sc, clock) {
        // The remaining budget cannot start any later than necessary.
        sc.head_mut().time = clock.now();
    }

    if sc.head().amount >= new_budget {
        // The surviving refill exceeds the new budget; the excess is
        // forfeited.
        sc.head_mut().amount = new_budget;
    } else {
        // Schedule the rest where the sliding window first permits it:
        // one new period after the head, minus its own length.
        let unused = new_budget - sc.head().amount;
        let refill = Refill::new(sc.head().time + new_period - unused, unused);
        schedule_used(sc, refill, clock);
    }

    log::debug!(
        "sc reconfigured on core {}: budget {} period {} refills {}",
        clock.core(),
        new_budget,
        new_period,
        new_max_refills
    );

    #[cfg(debug_assertions)]
    sanity::exit(sc, new_budget, clock);
}

/// Charge `usage` ticks of execution to this scheduling context.
///
/// `refill_unblock_check` runs on every kernel exit, so the head refill
/// started at the last kernel entry; the charged time is scheduled for
/// reuse exactly one period after that. Using more than the head refill
/// held (or running while the head was not yet eligible) is a bandwidth
/// overrun: the queue is emptied and a single refill of the full budget is
/// scheduled far enough out to restore the bandwidth bound.
pub fn refill_budget_check(sc: &mut SchedContext, usage: Ticks, clock: &SchedClock) {
    debug_assert!(sc.is_active());

    #[cfg(debug_assertions)]
    let entry_sum = sanity::enter(sc, clock);

    // A zero charge leaves the queue untouched.
    if usage.is_zero() {
        return;
    }

    let last_entry = sc.head().time;
    let mut used = Refill::new(last_entry + sc.period, usage);

    if !refill_ready(sc, clock) || sc.head().amount < usage {
        log::trace!(
            "budget overrun on core {}: usage {} against head ({}, {})",
            clock.core(),
            usage,
            sc.head().time,
            sc.head().amount
        );
        sc.clear();
        used.time = last_entry + sc.period + usage;
        used.amount = sc.budget;
    } else if usage == sc.head().amount {
        sc.pop_head();
    } else {
        let remnant = sc.head().amount - usage;
        if remnant >= clock.min_budget() {
            // Leave the head refill with all that was left over.
            let head = sc.head_mut();
            head.amount = remnant;
            head.time += usage;
        } else {
            // The remnant is too small to stand alone; donate it to
            // whatever becomes the new head.
            sc.pop_head();
            if sc.is_empty() {
                used.time -= remnant;
                used.amount += remnant;
            } else {
                let head = sc.head_mut();
                head.time -= remnant;
                head.amount += remnant;
            }
        }
    }

    // Schedule all of the used time as a single refill.
    schedule_used(sc, used, clock);

    #[cfg(debug_assertions)]
    sanity::exit(sc, entry_sum, clock);
}

/// Process a wake-up of the thread bound to this scheduling context.
///
/// If the head refill is already eligible, its start is advanced to
/// `now + wcet`, and every following refill the advanced head now reaches
/// is folded into it. Returns whether the timer interrupt must be
/// reprogrammed for the new head.
pub fn refill_unblock_check(sc: &mut SchedContext, clock: &SchedClock) -> bool {
    debug_assert!(sc.is_active());

    #[cfg(debug_assertions)]
    let entry_sum = sanity::enter(sc, clock);

    let mut reprogram = false;
    if refill_ready(sc, clock) {
        reprogram = true;
        sc.head_mut().time = clock.horizon();

        // Merge refills the advanced head has caught up with.
        while sc.len() > 1 {
            let amount = sc.head().amount;
            let head_end = sc.head().time + amount;
            let next_start = match sc.iter().nth(1) {
                Some(refill) => refill.time,
                None => break,
            };
            if next_start <= head_end {
                sc.pop_head();
                let head = sc.head_mut();
                head.amount += amount;
                head.time = clock.horizon();
            } else {
                break;
            }
        }

        debug_assert!(refill_ready(sc, clock));
        debug_assert!(refill_sufficient(sc, Ticks::ZERO, clock));
    }

    #[cfg(debug_assertions)]
    sanity::exit(sc, entry_sum, clock);

    reprogram
}

// -- Merging and splitting

/// Append a just-consumed refill at the tail, preserving the queue
/// invariants.
///
/// The caller guarantees `new` is disjoint from the current tail. When
/// `new` is under the minimum budget, ticks are borrowed from the end of
/// the tail if it can spare them (keeping refills as small as allowed
/// maximises how soon the thread can be dispatched again); otherwise, or
/// when the queue is full, `new` is merged into the tail.
fn schedule_used(sc: &mut SchedContext, mut new: Refill, clock: &SchedClock) {
    let min_budget = clock.min_budget();

    if sc.is_empty() {
        debug_assert!(new.amount >= min_budget);
        sc.push_tail(new);
        return;
    }

    // The refills being disjoint is what allows merging to move the
    // merged refill earlier.
    debug_assert!(new.time >= sc.tail().end());

    if new.amount < min_budget && !sc.is_full() && sc.tail().amount + new.amount >= min_budget * 2
    {
        // Split the tail: move just enough of its end into `new` that
        // both chunks hold the minimum budget.
        let remainder = min_budget - new.amount;
        new.amount += remainder;
        new.time -= remainder;
        sc.tail_mut().amount -= remainder;
        sc.push_tail(new);
    } else if new.amount < min_budget || sc.is_full() {
        // Merge into the tail; the merged refill still ends at the end
        // of `new`.
        let tail = sc.tail_mut();
        tail.time = new.time - tail.amount;
        tail.amount += new.amount;
    } else {
        sc.push_tail(new);
    }

    debug_assert!(!sc.is_empty());
}

// -- Invariants

/// Debug-only queue invariant checks, wrapped around every mutating
/// operation.
#[cfg(debug_assertions)]
mod sanity {
    use super::{refill_sum, SchedClock, SchedContext, Ticks};

    /// Check the invariants on entry to an operation and snapshot the
    /// refill sum for the exit check.
    pub(super) fn enter(sc: &SchedContext, clock: &SchedClock) -> Ticks {
        check(sc, clock);
        refill_sum(sc)
    }

    /// Check the invariants on exit from an operation, including that the
    /// refill sum matches `expected` (the entry snapshot, or the new
    /// budget after a reconfiguration).
    pub(super) fn exit(sc: &SchedContext, expected: Ticks, clock: &SchedClock) {
        check(sc, clock);
        assert!(
            refill_sum(sc) == expected,
            "refill sum {} != {} in {:?}",
            refill_sum(sc),
            expected,
            sc
        );
    }

    fn check(sc: &SchedContext, clock: &SchedClock) {
        assert!(!sc.is_empty(), "refill queue empty: {:?}", sc);
        assert!(sc.len() <= sc.max_refills(), "queue overflow: {:?}", sc);
        assert!(
            sc.budget >= clock.min_sc_budget(),
            "budget below minimum: {:?}",
            sc
        );

        // Refills are ordered, disjoint, and each at least the minimum.
        let mut prev: Option<Ticks> = None;
        for refill in sc.iter() {
            assert!(
                refill.amount >= clock.min_budget(),
                "refill below min budget: {:?}",
                sc
            );
            if let Some(prev_end) = prev {
                assert!(prev_end <= refill.time, "refills overlap: {:?}", sc);
            }
            prev = Some(refill.end());
        }

        // The whole queue fits in a single period.
        assert!(
            sc.tail().end() - sc.head().time <= sc.period,
            "queue spans more than one period: {:?}",
            sc
        );

        assert!(
            refill_sum(sc) == sc.budget,
            "refill sum {} != budget {}: {:?}",
            refill_sum(sc),
            sc.budget,
            sc
        );
    }
}
