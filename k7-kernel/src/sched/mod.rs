//! Sporadic-Server Scheduler
//!
//! Implements the CPU time accounting side of the K7 scheduler: every
//! thread runs against a scheduling context whose circular refill queue
//! bounds it to `budget` ticks of execution per sliding window of `period`
//! ticks (a sporadic server in the sense of Stankovic et al.).
//!
//! # Key Concepts
//!
//! - **Refill**: a `(time, amount)` chunk of budget that becomes eligible
//!   at `time`.
//! - **Charging**: after a thread runs, the consumed time is charged to the
//!   head refill and rescheduled one period later ([`refill`]).
//! - **Round-robin siblings**: scheduling contexts configured with
//!   `period == budget` are handled by the round-robin policy and bypass
//!   the refill engine entirely; the check lives here at the call boundary.
//! - **Timer reprogramming**: waking a thread can make its head refill
//!   eligible earlier than the programmed timer interrupt, which is
//!   signalled through a per-core flag.
//!
//! Mutual exclusion is the call sites' responsibility: a scheduling
//! context is only ever touched from the core it is affine to, with
//! interrupts disabled. The engine itself takes no locks.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use k7_cap::SchedContext;
use k7_common::Ticks;
use spin::{Mutex, Once};

use crate::config;

pub mod refill;
pub mod sc_storage;

pub use sc_storage::{create_sc, destroy_sc};

// -- Constants

/// Maximum number of CPUs supported.
pub const MAX_CPUS: usize = 8;

// -- Timer Reprogram Flags

/// Per-core flag indicating the next timer interrupt must be reprogrammed
/// (set when an unblocked thread becomes eligible before the programmed
/// deadline).
static REPROGRAM: [AtomicBool; MAX_CPUS] = [const { AtomicBool::new(false) }; MAX_CPUS];

/// Request timer reprogramming on `core` before the next kernel exit.
#[inline]
pub fn request_reprogram(core: usize) {
    REPROGRAM[core].store(true, AtomicOrdering::Release);
}

/// Check and clear the reprogram flag (called on the kernel exit path).
#[inline]
pub fn take_reprogram(core: usize) -> bool {
    REPROGRAM[core].swap(false, AtomicOrdering::AcqRel)
}

/// Check if reprogramming is pending without clearing.
#[inline]
pub fn reprogram_pending(core: usize) -> bool {
    REPROGRAM[core].load(AtomicOrdering::Acquire)
}

// -- Per-Core Scheduler State

/// Per-core scheduler state.
pub struct CoreSched {
    /// Tick count sampled at the last kernel entry on this core.
    cur_time: Ticks,
    /// Scheduling context of the thread currently running on this core.
    cur_sc: Option<NonNull<SchedContext>>,
}

impl CoreSched {
    /// Create new per-core scheduler state.
    pub const fn new() -> Self {
        Self {
            cur_time: Ticks::ZERO,
            cur_sc: None,
        }
    }
}

impl Default for CoreSched {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: CoreSched is only accessed through the per-core mutex, and the
// raw SC pointer it holds is only dereferenced on the owning core.
unsafe impl Send for CoreSched {}

/// Per-core scheduler state array.
///
/// Initialised lazily on first access.
static SCHED_STATE: Once<[Mutex<CoreSched>; MAX_CPUS]> = Once::new();

/// Get the per-core scheduler state array, initialising if necessary.
fn get_sched_state() -> &'static [Mutex<CoreSched>; MAX_CPUS] {
    SCHED_STATE.call_once(|| core::array::from_fn(|_| Mutex::new(CoreSched::new())))
}

// -- Public API

/// Initialise the scheduler.
///
/// This should be called once during kernel initialisation.
pub fn init() {
    let _ = get_sched_state();
    log::debug!("Scheduler initialised with {} CPUs", MAX_CPUS);
}

/// Record the current tick count for `core`.
///
/// Called on every kernel entry, before any scheduling decision reads the
/// clock.
pub fn update_time(core: usize, now: Ticks) {
    get_sched_state()[core].lock().cur_time = now;
}

/// Tick count sampled at the last kernel entry on `core`.
pub fn current_time(core: usize) -> Ticks {
    get_sched_state()[core].lock().cur_time
}

/// Install the scheduling context of the thread now running on `core`.
///
/// # Safety contract
///
/// The pointer must stay valid until it is replaced; the dispatcher
/// guarantees this by unbinding the SC before its capability is destroyed.
pub fn set_current_sc(core: usize, sc: Option<NonNull<SchedContext>>) {
    get_sched_state()[core].lock().cur_sc = sc;
}

/// Whether this SC belongs to the round-robin policy rather than the
/// sporadic-server engine.
#[inline]
#[must_use]
pub fn is_round_robin(sc: &SchedContext) -> bool {
    sc.period == sc.budget
}

/// Charge `usage` ticks of execution to the scheduling context currently
/// running on `core`.
///
/// Called after the running thread has been preempted or has yielded, with
/// the consumed time measured by the timer path. Round-robin contexts are
/// charged by their own policy and skipped here.
pub fn charge_current(core: usize, usage: Ticks) {
    let state = get_sched_state()[core].lock();
    let now = state.cur_time;
    let mut ptr = state
        .cur_sc
        .expect("charging with no current scheduling context");

    // SAFETY: the current SC pointer was installed by the dispatcher for
    // this core, and per-core exclusion keeps it alive and unaliased for
    // the duration of the call.
    let sc = unsafe { ptr.as_mut() };
    if is_round_robin(sc) {
        return;
    }

    let clock = SchedClock::new(now, config::kernel_wcet_ticks(), core);
    refill::refill_budget_check(sc, usage, &clock);
}

/// Process a thread waking up against `sc`.
///
/// Slides eligible budget up to the present and requests timer
/// reprogramming when the wake changes the next relevant deadline.
pub fn unblock(sc: &mut SchedContext) {
    debug_assert!(sc.is_active());

    if is_round_robin(sc) {
        return;
    }

    let clock = SchedClock::for_sc(sc);
    if refill::refill_unblock_check(sc, &clock) {
        request_reprogram(sc.core);
    }
}

/// Whether `sc`'s head refill is eligible now, from the dispatcher's view.
#[must_use]
pub fn ready(sc: &SchedContext) -> bool {
    refill::refill_ready(sc, &SchedClock::for_sc(sc))
}

/// Whether `sc` could absorb a charge of `usage` and still hold a viable
/// refill, from the dispatcher's view.
#[must_use]
pub fn sufficient(sc: &SchedContext, usage: Ticks) -> bool {
    refill::refill_sufficient(sc, usage, &SchedClock::for_sc(sc))
}

// -- Clock Context

/// Snapshot of the per-core clock handed to the refill engine for one
/// operation.
///
/// The engine never caches time across operations; the dispatch path
/// builds a fresh snapshot (from the time recorded at kernel entry) for
/// every call.
#[derive(Clone, Copy, Debug)]
pub struct SchedClock {
    now: Ticks,
    wcet: Ticks,
    core: usize,
}

impl SchedClock {
    /// Create a clock snapshot from explicit values.
    #[inline]
    #[must_use]
    pub const fn new(now: Ticks, wcet: Ticks, core: usize) -> Self {
        Self { now, wcet, core }
    }

    /// Snapshot the clock of `core`.
    #[must_use]
    pub fn for_core(core: usize) -> Self {
        Self::new(current_time(core), config::kernel_wcet_ticks(), core)
    }

    /// Snapshot the clock of the core `sc` is affine to.
    #[must_use]
    pub fn for_sc(sc: &SchedContext) -> Self {
        Self::for_core(sc.core)
    }

    /// The tick count at the last kernel entry.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Ticks {
        self.now
    }

    /// The core this snapshot was taken on.
    #[inline]
    #[must_use]
    pub const fn core(&self) -> usize {
        self.core
    }

    /// Latest start time a refill may have and still let a thread enter
    /// the kernel before the refill begins: `now + wcet`.
    #[inline]
    #[must_use]
    pub const fn horizon(&self) -> Ticks {
        Ticks::new(self.now.as_u64() + self.wcet.as_u64())
    }

    /// Smallest refill the engine may create under this clock:
    /// `2 * wcet`, scaled.
    #[inline]
    #[must_use]
    pub const fn min_budget(&self) -> Ticks {
        Ticks::new(2 * self.wcet.as_u64() * config::WCET_SCALE)
    }

    /// Smallest admissible total budget: twice [`min_budget`](Self::min_budget),
    /// so any budget can be split into two viable refills.
    #[inline]
    #[must_use]
    pub const fn min_sc_budget(&self) -> Ticks {
        Ticks::new(2 * self.min_budget().as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::refill::{refill_new, refill_sum};
    use super::sc_storage::TestSc;

    #[test]
    fn test_reprogram_flag() {
        assert!(!reprogram_pending(1));
        request_reprogram(1);
        assert!(reprogram_pending(1));
        assert!(take_reprogram(1));
        assert!(!take_reprogram(1));
    }

    #[test]
    fn test_time_tracking() {
        update_time(2, Ticks::new(12345));
        assert_eq!(current_time(2), Ticks::new(12345));
        let clock = SchedClock::for_core(2);
        assert_eq!(clock.now(), Ticks::new(12345));
        assert_eq!(clock.horizon(), Ticks::new(12345) + config::kernel_wcet_ticks());
    }

    #[test]
    fn test_round_robin_detection() {
        let mut sc = TestSc::new(8);
        sc.period = Ticks::new(1000);
        sc.budget = Ticks::new(1000);
        assert!(is_round_robin(&sc));
        sc.budget = Ticks::new(400);
        assert!(!is_round_robin(&sc));
    }

    #[test]
    fn test_charge_current_flows_to_current_sc() {
        let budget = config::min_sc_budget_ticks() * 2;
        let period = budget * 10;

        let mut sc = TestSc::new(8);
        sc.core = 3;
        update_time(3, Ticks::new(1000));
        refill_new(&mut sc, 4, budget, period, &SchedClock::for_core(3));

        set_current_sc(3, Some(sc.as_ptr()));
        charge_current(3, config::min_budget_ticks());
        set_current_sc(3, None);

        assert_eq!(refill_sum(&sc), budget);
        assert_eq!(sc.len(), 2);
        assert_eq!(sc.head().time, Ticks::new(1000) + config::min_budget_ticks());
    }

    #[test]
    fn test_charge_current_skips_round_robin() {
        let budget = config::min_sc_budget_ticks();

        let mut sc = TestSc::new(8);
        sc.core = 4;
        update_time(4, Ticks::ZERO);
        refill_new(&mut sc, 4, budget, budget, &SchedClock::for_core(4));

        set_current_sc(4, Some(sc.as_ptr()));
        charge_current(4, config::min_budget_ticks());
        set_current_sc(4, None);

        // Round-robin contexts are left to their own policy.
        assert_eq!(sc.len(), 1);
        assert_eq!(*sc.head(), k7_cap::Refill::new(Ticks::ZERO, budget));
    }

    #[test]
    fn test_dispatcher_queries() {
        let budget = config::min_sc_budget_ticks() * 4;
        let period = budget * 8;

        let mut sc = TestSc::new(8);
        sc.core = 5;
        update_time(5, Ticks::new(500));
        refill_new(&mut sc, 4, budget, period, &SchedClock::for_core(5));

        assert!(ready(&sc));
        assert!(sufficient(&sc, Ticks::ZERO));
        assert!(!sufficient(&sc, budget));
    }

    #[test]
    fn test_unblock_requests_reprogram() {
        let min = config::min_budget_ticks();
        let budget = min * 4;
        let period = budget * 8;

        let mut sc = TestSc::new(8);
        sc.core = 6;
        update_time(6, Ticks::ZERO);
        refill_new(&mut sc, 4, budget, period, &SchedClock::for_core(6));

        // Consume part of the budget so the queue holds a future refill,
        // then advance time past it and wake the thread.
        set_current_sc(6, Some(sc.as_ptr()));
        charge_current(6, min);
        set_current_sc(6, None);
        assert_eq!(sc.len(), 2);

        update_time(6, period);
        assert!(!take_reprogram(6));
        unblock(&mut sc);
        assert!(take_reprogram(6));
        assert_eq!(sc.len(), 1);
        assert_eq!(refill_sum(&sc), budget);
    }

    #[test]
    fn test_unblock_skips_round_robin() {
        let budget = config::min_sc_budget_ticks();

        let mut sc = TestSc::new(8);
        sc.core = 7;
        update_time(7, Ticks::ZERO);
        refill_new(&mut sc, 4, budget, budget, &SchedClock::for_core(7));

        unblock(&mut sc);
        assert!(!reprogram_pending(7));
    }
}
