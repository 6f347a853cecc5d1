//! Scheduling context objects
//!
//! A scheduling context (SC) grants a thread CPU time under a sporadic-server
//! bandwidth guarantee: at most `budget` ticks of execution per sliding
//! window of `period` ticks. The guarantee is enforced with a circular
//! buffer of **refills**, where a refill `(time, amount)` means "`amount`
//! ticks of execution become eligible at time `time`".
//!
//! The buffer always has at least one item in it while the SC is active.
//! Items are appended at the tail (the back) and removed from the head (the
//! front). Below is an example of a queue with 4 items (h = head, t = tail,
//! x = item, [] = slot) and max size 8:
//!
//! ```text
//! [][h][x][x][t][][][]
//! ```
//!
//! and another example of a queue with 5 items:
//!
//! ```text
//! [x][t][][][][h][x][x]
//! ```
//!
//! # Storage
//!
//! Scheduling context objects consist of a [`SchedContext`] header at the
//! start, followed in the same allocation by a circular buffer of refill
//! slots. As the objects are of variable size, the number of refills that
//! fit is also variable and is derived from the allocation's size class
//! (see [`refill_absolute_max`]). The header is placed with
//! [`SchedContext::init_at`]; everything else in this module is safe code
//! that relies on that placement contract.
//!
//! This module provides the object layout, the ring-buffer primitives, and
//! the pure structural queries. The replenishment algorithms that maintain
//! the bandwidth guarantee live in the kernel's scheduling subsystem.

use core::fmt;
use core::mem::{align_of, size_of};

use k7_common::Ticks;

// -- Size classes

/// Minimum SC size class: one header plus at least one refill slot.
pub const MIN_SC_SIZE_BITS: u8 = 7;

/// Bytes required for a scheduling context with `slots` refill slots.
#[inline]
#[must_use]
pub const fn sc_object_size(slots: usize) -> usize {
    size_of::<SchedContext>() + slots * size_of::<Refill>()
}

/// The maximum number of refills that fit into a scheduling context
/// object of the given size class.
#[inline]
#[must_use]
pub const fn refill_absolute_max(size_bits: u8) -> usize {
    let size = 1usize << size_bits;
    if size <= size_of::<SchedContext>() {
        return 0;
    }
    (size - size_of::<SchedContext>()) / size_of::<Refill>()
}

// -- Refill

/// One chunk of budget: `amount` ticks of execution become eligible at
/// time `time`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Refill {
    /// Instant at which this chunk becomes eligible.
    pub time: Ticks,
    /// Size of the chunk.
    pub amount: Ticks,
}

impl Refill {
    /// Create a new refill.
    #[inline]
    #[must_use]
    pub const fn new(time: Ticks, amount: Ticks) -> Self {
        Self { time, amount }
    }

    /// The instant at which this chunk stops being the frontier, i.e.
    /// `time + amount`.
    #[inline]
    #[must_use]
    pub fn end(&self) -> Ticks {
        self.time + self.amount
    }
}

// -- Scheduling context header

/// Scheduling context object header.
///
/// The refill slots live in the same allocation immediately after this
/// header. The queue has a minimum size of 1 while the SC is active, so it
/// is possible that head and tail are the same slot.
///
/// `period`, `budget` and `core` are plain configuration data; the ring
/// fields are private because the slot accessors rely on them staying
/// within the bounds established at placement time.
#[repr(C, align(64))]
pub struct SchedContext {
    /// Length of the sliding window.
    pub period: Ticks,
    /// Total eligible execution per window.
    pub budget: Ticks,
    /// Index of the front refill.
    refill_head: usize,
    /// Number of valid refills.
    refill_count: usize,
    /// Configured queue bound, `0` while the SC is inactive.
    refill_max: usize,
    /// Physical slots in the allocation, fixed at placement time.
    slot_capacity: usize,
    /// The core this SC is affine to.
    pub core: usize,
}

impl SchedContext {
    /// Initialise the header of a freshly allocated scheduling context
    /// object. The resulting SC is inactive until it is configured.
    ///
    /// # Safety
    ///
    /// `ptr` must point to writable memory of at least
    /// [`sc_object_size`]`(slot_capacity)` bytes, aligned for
    /// `SchedContext`, that stays valid for the life of the object.
    pub unsafe fn init_at(ptr: *mut SchedContext, slot_capacity: usize) {
        debug_assert!(!ptr.is_null());
        debug_assert!(ptr as usize % align_of::<SchedContext>() == 0);

        // SAFETY: the caller guarantees `ptr` addresses enough writable,
        // aligned memory for the header and `slot_capacity` refill slots.
        unsafe {
            ptr.write(SchedContext {
                period: Ticks::ZERO,
                budget: Ticks::ZERO,
                refill_head: 0,
                refill_count: 0,
                refill_max: 0,
                slot_capacity,
                core: 0,
            });
        }
    }

    // -- Pure queries

    /// Whether this SC has been configured with parameters that allow a
    /// thread to run.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.refill_max > 0
    }

    /// Number of refills currently in the queue.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.refill_count
    }

    /// Whether the refill queue is empty.
    ///
    /// This only happens on an inactive SC or transiently inside a charge
    /// operation; an active SC is otherwise never empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.refill_count == 0
    }

    /// Whether all configured slots are in use.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.refill_count == self.refill_max
    }

    /// The configured queue bound.
    #[inline]
    #[must_use]
    pub const fn max_refills(&self) -> usize {
        self.refill_max
    }

    /// Physical refill slots in the backing allocation.
    #[inline]
    #[must_use]
    pub const fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    // -- Ring arithmetic
    //
    // `refill_max` is not known to be a power of two, so wrap with a
    // conditional subtract rather than `%`.

    /// Index of the slot after `index` in ring order.
    #[inline]
    fn next_index(&self, index: usize) -> usize {
        if index == self.refill_max - 1 { 0 } else { index + 1 }
    }

    /// Index of the back refill.
    #[inline]
    fn tail_index(&self) -> usize {
        debug_assert!(self.refill_head < self.refill_max);
        debug_assert!(self.refill_count >= 1);
        debug_assert!(self.refill_count <= self.refill_max);

        let mut index = self.refill_head + self.refill_count - 1;
        if index >= self.refill_max {
            index -= self.refill_max;
        }
        index
    }

    /// Whether `index` lies in the occupied arc of the ring.
    fn index_valid(&self, index: usize) -> bool {
        let head = self.refill_head;
        let end = head + self.refill_count;
        if end > self.refill_max {
            // Occupied arc wraps around the end of the slot array
            index >= head || index < end - self.refill_max
        } else {
            index >= head && index < end
        }
    }

    // -- Slot access

    /// The refill slot array.
    fn slots(&self) -> &[Refill] {
        // SAFETY: `init_at`'s contract guarantees the allocation extends
        // `slot_capacity` refill slots beyond the header, and
        // `slot_capacity` is only ever written there.
        unsafe {
            let base = (self as *const SchedContext).add(1).cast::<Refill>();
            core::slice::from_raw_parts(base, self.slot_capacity)
        }
    }

    /// The refill slot array, mutably.
    fn slots_mut(&mut self) -> &mut [Refill] {
        // SAFETY: as for `slots`; `&mut self` gives exclusive access to
        // the whole object including its trailing slots.
        unsafe {
            let base = (self as *mut SchedContext).add(1).cast::<Refill>();
            core::slice::from_raw_parts_mut(base, self.slot_capacity)
        }
    }

    fn slot(&self, index: usize) -> &Refill {
        debug_assert!(!self.is_empty());
        debug_assert!(index < self.refill_max);
        debug_assert!(self.index_valid(index));
        &self.slots()[index]
    }

    fn slot_mut(&mut self, index: usize) -> &mut Refill {
        debug_assert!(!self.is_empty());
        debug_assert!(index < self.refill_max);
        debug_assert!(self.index_valid(index));
        &mut self.slots_mut()[index]
    }

    /// The front refill.
    #[inline]
    pub fn head(&self) -> &Refill {
        self.slot(self.refill_head)
    }

    /// The front refill, mutably.
    #[inline]
    pub fn head_mut(&mut self) -> &mut Refill {
        self.slot_mut(self.refill_head)
    }

    /// The back refill.
    #[inline]
    pub fn tail(&self) -> &Refill {
        self.slot(self.tail_index())
    }

    /// The back refill, mutably.
    #[inline]
    pub fn tail_mut(&mut self) -> &mut Refill {
        self.slot_mut(self.tail_index())
    }

    /// Iterate over the occupied refills in queue order, head first.
    pub fn iter(&self) -> Refills<'_> {
        Refills {
            sc: self,
            index: self.refill_head,
            remaining: self.refill_count,
        }
    }

    // -- Queue mutation

    /// Remove and return the front refill.
    pub fn pop_head(&mut self) -> Refill {
        debug_assert!(!self.is_empty());

        let refill = *self.head();
        self.refill_head = self.next_index(self.refill_head);
        self.refill_count -= 1;
        refill
    }

    /// Append a refill at the tail.
    pub fn push_tail(&mut self, refill: Refill) {
        debug_assert!(self.refill_count < self.refill_max);

        self.refill_count += 1;
        let index = self.tail_index();
        *self.slot_mut(index) = refill;
    }

    /// Drop every refill. The head index is left in place, so a subsequent
    /// [`push_tail`](Self::push_tail) reuses the same slot.
    #[inline]
    pub fn clear(&mut self) {
        self.refill_count = 0;
    }

    /// Bring an inactive SC up with an empty queue bounded at
    /// `max_refills` slots.
    pub fn activate(&mut self, max_refills: usize) {
        debug_assert!(!self.is_active());
        debug_assert!(max_refills >= 1);
        debug_assert!(max_refills <= self.slot_capacity);

        self.refill_max = max_refills;
        self.refill_head = 0;
        self.refill_count = 0;
    }

    /// Collapse the queue to just its head refill, moved to slot 0, under a
    /// new queue bound.
    ///
    /// Moving the head to slot 0 first means the queue cannot be left in an
    /// invalid slot position when the bound shrinks below the old head
    /// index.
    pub fn truncate_to_head(&mut self, new_max: usize) {
        debug_assert!(!self.is_empty());
        debug_assert!(new_max >= 1);
        debug_assert!(new_max <= self.slot_capacity);

        let head = *self.head();
        self.slots_mut()[0] = head;
        self.refill_head = 0;
        self.refill_count = 1;
        self.refill_max = new_max;
    }
}

impl fmt::Debug for SchedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SchedContext {{ budget: {}, period: {}, core: {}, head: {}, refills {}/{}:",
            self.budget, self.period, self.core, self.refill_head, self.refill_count,
            self.refill_max,
        )?;
        for refill in self.iter() {
            write!(f, " ({}, {})", refill.time, refill.amount)?;
        }
        write!(f, " }}")
    }
}

/// Iterator over the occupied refills of a [`SchedContext`], head first.
pub struct Refills<'a> {
    sc: &'a SchedContext,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for Refills<'a> {
    type Item = &'a Refill;

    fn next(&mut self) -> Option<&'a Refill> {
        if self.remaining == 0 {
            return None;
        }
        let refill = self.sc.slot(self.index);
        self.index = self.sc.next_index(self.index);
        self.remaining -= 1;
        Some(refill)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Refills<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stack-backed scheduling context object for one 256-byte size class.
    #[repr(C, align(64))]
    struct ScBuffer([u8; 256]);

    fn make_sc(buf: &mut ScBuffer) -> &mut SchedContext {
        let slots = refill_absolute_max(8);
        let ptr = buf.0.as_mut_ptr().cast::<SchedContext>();
        // SAFETY: the buffer is 256 aligned-64 bytes, enough for the header
        // plus `slots` refills by construction of `refill_absolute_max`.
        unsafe {
            SchedContext::init_at(ptr, slots);
            &mut *ptr
        }
    }

    fn r(time: u64, amount: u64) -> Refill {
        Refill::new(Ticks::new(time), Ticks::new(amount))
    }

    #[test]
    fn test_size_class_arithmetic() {
        assert_eq!(size_of::<SchedContext>(), 64);
        assert_eq!(size_of::<Refill>(), 16);
        assert_eq!(refill_absolute_max(MIN_SC_SIZE_BITS), 4);
        assert_eq!(refill_absolute_max(8), 12);
        assert_eq!(refill_absolute_max(6), 0);
        assert_eq!(sc_object_size(4), 128);
    }

    #[test]
    fn test_placed_sc_is_inactive() {
        let mut buf = ScBuffer([0; 256]);
        let sc = make_sc(&mut buf);
        assert!(!sc.is_active());
        assert!(sc.is_empty());
        assert_eq!(sc.slot_capacity(), 12);
        assert_eq!(sc.max_refills(), 0);
    }

    #[test]
    fn test_push_pop_order() {
        let mut buf = ScBuffer([0; 256]);
        let sc = make_sc(&mut buf);
        sc.activate(4);

        sc.push_tail(r(0, 10));
        sc.push_tail(r(20, 10));
        sc.push_tail(r(40, 10));
        assert_eq!(sc.len(), 3);
        assert_eq!(*sc.head(), r(0, 10));
        assert_eq!(*sc.tail(), r(40, 10));

        assert_eq!(sc.pop_head(), r(0, 10));
        assert_eq!(sc.pop_head(), r(20, 10));
        assert_eq!(*sc.head(), r(40, 10));
        assert_eq!(sc.len(), 1);
    }

    #[test]
    fn test_ring_wraps_around() {
        let mut buf = ScBuffer([0; 256]);
        let sc = make_sc(&mut buf);
        sc.activate(3);

        // Advance the head into the middle of the slot array, then fill up
        // so the tail wraps past the end.
        sc.push_tail(r(0, 10));
        sc.push_tail(r(20, 10));
        sc.pop_head();
        sc.pop_head();
        sc.push_tail(r(40, 10));
        sc.push_tail(r(60, 10));
        sc.push_tail(r(80, 10));
        assert!(sc.is_full());
        assert_eq!(*sc.head(), r(40, 10));
        assert_eq!(*sc.tail(), r(80, 10));

        let times: [u64; 3] = {
            let mut out = [0; 3];
            for (slot, refill) in out.iter_mut().zip(sc.iter()) {
                *slot = refill.time.as_u64();
            }
            out
        };
        assert_eq!(times, [40, 60, 80]);
    }

    #[test]
    fn test_clear_reuses_head_slot() {
        let mut buf = ScBuffer([0; 256]);
        let sc = make_sc(&mut buf);
        sc.activate(3);

        sc.push_tail(r(0, 10));
        sc.push_tail(r(20, 10));
        sc.pop_head();
        let head_before = *sc.head();
        sc.clear();
        assert!(sc.is_empty());

        sc.push_tail(r(100, 50));
        assert_eq!(sc.len(), 1);
        assert_eq!(*sc.head(), r(100, 50));
        assert_ne!(*sc.head(), head_before);
    }

    #[test]
    fn test_truncate_to_head() {
        let mut buf = ScBuffer([0; 256]);
        let sc = make_sc(&mut buf);
        sc.activate(4);

        sc.push_tail(r(0, 10));
        sc.push_tail(r(20, 10));
        sc.push_tail(r(40, 10));
        sc.pop_head();

        sc.truncate_to_head(2);
        assert_eq!(sc.len(), 1);
        assert_eq!(sc.max_refills(), 2);
        assert_eq!(*sc.head(), r(20, 10));
    }

    #[test]
    fn test_iter_matches_len() {
        let mut buf = ScBuffer([0; 256]);
        let sc = make_sc(&mut buf);
        sc.activate(4);
        sc.push_tail(r(0, 10));
        sc.push_tail(r(20, 10));

        let iter = sc.iter();
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_refill_end() {
        assert_eq!(r(30, 70).end(), Ticks::new(100));
    }
}
